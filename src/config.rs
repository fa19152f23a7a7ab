//! Tunables governing chunk size limits, reader cache size, and metrics
//! collection (see `SPEC_FULL.md` §4.I).

/// Configuration shared by every buffer and node in a graph.
///
/// A `Config` is supplied when a graph is created (or `Config::default()`
/// is used) and is fixed for the graph's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Maximum payload bytes per circular-buffer chunk. Defaults to the
    /// wire format's ceiling, `0xFFFF` (65 535). Lowering this trades
    /// larger per-byte header overhead for finer-grained release
    /// accounting (a release-scan can free a chunk as soon as all readers
    /// have passed it, so smaller chunks unblock a backpressured writer
    /// sooner).
    pub chunk_payload_limit: u16,

    /// Size in bytes of each circular input slot's opportunistic
    /// read-ahead cache (see `SPEC_FULL.md` §4.C step 3).
    pub reader_cache_size: usize,

    /// Whether per-buffer/per-scheduler counters are maintained. Off by
    /// default: the counters exist for diagnosing backpressure and
    /// rendezvous behavior in tests and tools, not for steady-state
    /// production overhead.
    pub enable_metrics: bool,
}

impl Config {
    /// Maximum payload bytes a single chunk may carry, per the wire
    /// format (`SPEC_FULL.md` §6).
    pub const MAX_CHUNK_PAYLOAD: u16 = u16::MAX;

    /// Size of a chunk header: a `count: u16` followed by a `size: u16`.
    pub const CHUNK_HEADER_SIZE: usize = 4;

    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_payload_limit` is 0, or if `reader_cache_size` is
    /// 0.
    #[must_use]
    pub const fn new(chunk_payload_limit: u16, reader_cache_size: usize, enable_metrics: bool) -> Self {
        assert!(chunk_payload_limit > 0, "chunk_payload_limit must be non-zero");
        assert!(reader_cache_size > 0, "reader_cache_size must be non-zero");

        Self {
            chunk_payload_limit,
            reader_cache_size,
            enable_metrics,
        }
    }

    /// Maximum size in bytes of a single chunk (header + payload) under
    /// this configuration.
    #[inline]
    #[must_use]
    pub const fn max_chunk_size(&self) -> usize {
        Self::CHUNK_HEADER_SIZE + self.chunk_payload_limit as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_payload_limit: Self::MAX_CHUNK_PAYLOAD,
            reader_cache_size: 128,
            enable_metrics: false,
        }
    }
}

impl Config {
    /// Preset used by test and benchmark harnesses: metrics on, a
    /// smaller read-ahead cache so backpressure scenarios are easier to
    /// provoke with small payloads.
    pub const DIAGNOSTIC: Config = Config::new(Self::MAX_CHUNK_PAYLOAD, 16, true);
}

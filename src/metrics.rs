//! Observability counters (see `SPEC_FULL.md` §4.J).
//!
//! Collection is gated by `Config::enable_metrics`; when disabled the
//! atomic increments are skipped entirely rather than merely discarded,
//! so there is no steady-state cost for graphs that don't opt in.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live, atomic-backed counters for one graph.
///
/// Cheap to share: every counter is an independent `AtomicU64`, so
/// concurrent nodes increment without contending on a shared lock.
#[derive(Debug, Default)]
pub struct Metrics {
    enabled: bool,
    nodes_started: AtomicU64,
    nodes_terminated: AtomicU64,
    nodes_joined: AtomicU64,
    writer_blocked: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl Metrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    #[inline]
    pub(crate) fn node_started(&self) {
        if self.enabled {
            self.nodes_started.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn node_terminated(&self) {
        if self.enabled {
            self.nodes_terminated.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn node_joined(&self) {
        if self.enabled {
            self.nodes_joined.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Incremented each time a circular-buffer writer actually suspends
    /// waiting for free space (scenario S4's observable hook).
    #[inline]
    pub(crate) fn writer_blocked(&self) {
        if self.enabled {
            self.writer_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn bytes_written(&self, n: u64) {
        if self.enabled {
            self.bytes_written.fetch_add(n, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn bytes_read(&self, n: u64) {
        if self.enabled {
            self.bytes_read.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_started: self.nodes_started.load(Ordering::Relaxed),
            nodes_terminated: self.nodes_terminated.load(Ordering::Relaxed),
            nodes_joined: self.nodes_joined.load(Ordering::Relaxed),
            writer_blocked: self.writer_blocked.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// A `Copy`able point-in-time read of a graph's `Metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub nodes_started: u64,
    pub nodes_terminated: u64,
    pub nodes_joined: u64,
    pub writer_blocked: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

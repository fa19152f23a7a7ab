//! Output buffers backing I/O edges: the linear buffer (component B) and
//! the circular buffer (component C), plus the status shared by both.

pub(crate) mod circular;
pub(crate) mod linear;

use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) use circular::CircularBuffer;
pub(crate) use linear::LinearBuffer;

/// Lifecycle of an output buffer, shared by both variants
/// (`SPEC_FULL.md` §3, "Lifecycles").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    /// Just created, or rewound: no data, not yet receiving.
    Ready,
    /// The owning node is executing; the buffer may be receiving writes.
    Active,
    /// The owning node has terminated; no further bytes will ever arrive,
    /// but bytes already written remain readable.
    Inactive,
}

/// The two buffer variants an output slot may hold.
pub(crate) enum OutputBuffer {
    Linear(LinearBuffer),
    Circular(CircularBuffer),
}

impl OutputBuffer {
    /// Writes `buf` to this buffer, dispatching on variant
    /// (`SPEC_FULL.md` §4.E).
    pub(crate) fn write(&self, buf: &[u8]) -> usize {
        match self {
            OutputBuffer::Linear(lb) => lb.write(buf),
            OutputBuffer::Circular(cb) => cb.write(buf),
        }
    }

    /// Marks this buffer Active/Inactive/Ready, dispatching on variant.
    pub(crate) fn set_status(&self, status: BufferStatus) {
        match self {
            OutputBuffer::Linear(lb) => lb.set_status(status),
            OutputBuffer::Circular(cb) => cb.set_status(status),
        }
    }

    /// Marks this buffer Active, additionally fixing a circular buffer's
    /// reader count at `reader_count` for the run (`SPEC_FULL.md` §3: "R
    /// ... fixed at start of run"). A linear buffer has no reader-count
    /// concept, so this is the same as `set_status(Active)` for it.
    pub(crate) fn activate(&self, reader_count: usize) {
        match self {
            OutputBuffer::Linear(lb) => lb.set_status(BufferStatus::Active),
            OutputBuffer::Circular(cb) => cb.activate(reader_count),
        }
    }

    /// Registers a new reader against this buffer, returning the chunk
    /// sequence number (meaningless for a linear buffer) it should begin
    /// consuming from. A linear buffer has no reader bookkeeping: every
    /// reader simply starts its own byte cursor at zero.
    pub(crate) fn register_reader(&self) -> u64 {
        match self {
            OutputBuffer::Linear(_) => 0,
            OutputBuffer::Circular(cb) => cb.register_reader(),
        }
    }

    /// Withdraws a reader that had been at sequence number `next_seq`,
    /// releasing any credit it still held against unread chunks.
    pub(crate) fn unregister_reader(&self, next_seq: u64) {
        if let OutputBuffer::Circular(cb) = self {
            cb.unregister_reader(next_seq);
        }
    }
}

/// The backing store for one output slot: the buffer itself plus the
/// number of I/O edges ("flows") currently reading from it
/// (`SPEC_FULL.md` §3: "reader-count \[...\] fixed at start of run").
///
/// Wrapping the reader count here rather than on the owning `Node`'s
/// slot entry means `add_flow` can decrement a *previous* binding's
/// count given only the `Arc<Output>` it already held, without needing
/// to know which node originally owned that slot.
pub(crate) struct Output {
    buffer: OutputBuffer,
    reader_count: AtomicUsize,
}

impl Output {
    pub(crate) fn new(buffer: OutputBuffer) -> Self {
        Self {
            buffer,
            reader_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn as_buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    pub(crate) fn write(&self, buf: &[u8]) -> usize {
        self.buffer.write(buf)
    }

    pub(crate) fn set_status(&self, status: BufferStatus) {
        self.buffer.set_status(status);
    }

    /// Activates this buffer, passing through this run's fixed reader
    /// count (read from `reader_count` at the moment of activation, not
    /// tracked live afterward).
    pub(crate) fn activate(&self) {
        let readers = self.reader_count.load(Ordering::Acquire);
        self.buffer.activate(readers);
    }

    pub(crate) fn register_reader(&self) -> u64 {
        self.buffer.register_reader()
    }

    pub(crate) fn unregister_reader(&self, next_seq: u64) {
        self.buffer.unregister_reader(next_seq);
    }

    pub(crate) fn incr_readers(&self) -> usize {
        self.reader_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn decr_readers(&self) -> usize {
        self.reader_count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    #[cfg(test)]
    pub(crate) fn reader_count(&self) -> usize {
        self.reader_count.load(Ordering::Acquire)
    }
}

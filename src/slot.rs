//! Input slot bindings: how a node's input is connected to an upstream
//! output (component D, `SPEC_FULL.md` §4.D and §9's design note).
//!
//! The original C source overloads a single raw-pointer field for
//! "unbound", "bound but not yet reading", and "bound with an active
//! cursor". Here those are three distinct states of one sum type, so a
//! caller can never read through a binding that was never made.

use std::sync::Arc;

use crate::buffer::{Output, OutputBuffer};

/// A cursor into a linear output: a simple monotonic byte offset.
#[derive(Debug, Default)]
pub(crate) struct LinearCursor {
    pub(crate) r: usize,
}

/// A cursor into a circular output: the next chunk sequence number this
/// reader must consume, plus a small read-ahead cache of the most
/// recently fetched chunk's payload and how much of it has already
/// been handed to the caller.
pub(crate) struct CircularCursor {
    pub(crate) next_seq: u64,
    cache: Vec<u8>,
    cache_pos: usize,
}

impl CircularCursor {
    fn new(next_seq: u64, cache_hint: usize) -> Self {
        Self {
            next_seq,
            cache: Vec::with_capacity(cache_hint),
            cache_pos: 0,
        }
    }

    fn has_cached_bytes(&self) -> bool {
        self.cache_pos < self.cache.len()
    }

    fn drain_cache(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.cache.len() - self.cache_pos);
        out[..n].copy_from_slice(&self.cache[self.cache_pos..self.cache_pos + n]);
        self.cache_pos += n;
        n
    }
}

/// How a node's input is wired up. Starts `Unbound`; `link` moves it to
/// `Bound`; the first read promotes it to `Cursor`, pinning it to
/// whichever buffer variant the upstream output turned out to be.
pub(crate) enum InputBinding {
    Unbound,
    Bound(Arc<Output>),
    Cursor(BoundCursor),
}

pub(crate) enum BoundCursor {
    Linear(Arc<Output>, LinearCursor),
    Circular(Arc<Output>, CircularCursor),
}

impl Default for InputBinding {
    fn default() -> Self {
        InputBinding::Unbound
    }
}

impl InputBinding {
    pub(crate) fn is_bound(&self) -> bool {
        !matches!(self, InputBinding::Unbound)
    }

    /// Binds this input to `output`, returning whichever `Output` it was
    /// previously bound to (if any) so the caller can decrement that
    /// prior binding's reader count. A slot is normally wired once, at
    /// graph-assembly time, but `add_flow` may legally repoint an
    /// already-bound slot before the node next activates.
    pub(crate) fn bind(&mut self, output: Arc<Output>) -> Option<Arc<Output>> {
        match std::mem::replace(self, InputBinding::Bound(output)) {
            InputBinding::Unbound => None,
            InputBinding::Bound(prev) => Some(prev),
            InputBinding::Cursor(BoundCursor::Linear(prev, _)) => Some(prev),
            InputBinding::Cursor(BoundCursor::Circular(prev, cursor)) => {
                prev.unregister_reader(cursor.next_seq);
                Some(prev)
            }
        }
    }

    /// Reads up to `buf.len()` bytes, promoting `Bound` to `Cursor` on
    /// first use (registering with the buffer if it is circular).
    /// Returns `0` for an `Unbound` slot — indistinguishable from EOF,
    /// matching the original's "reading an unconnected input yields
    /// nothing" behavior.
    pub(crate) fn read(&mut self, buf: &mut [u8], reader_cache_size: usize) -> usize {
        if buf.is_empty() {
            return 0;
        }

        self.ensure_cursor(reader_cache_size);

        match self {
            InputBinding::Unbound | InputBinding::Bound(_) => 0,
            InputBinding::Cursor(BoundCursor::Linear(buffer, cursor)) => {
                let OutputBuffer::Linear(lb) = buffer.as_buffer() else {
                    unreachable!("a Linear cursor always pairs with a Linear buffer")
                };
                lb.read(&mut cursor.r, buf)
            }
            InputBinding::Cursor(BoundCursor::Circular(buffer, cursor)) => {
                let OutputBuffer::Circular(cb) = buffer.as_buffer() else {
                    unreachable!("a Circular cursor always pairs with a Circular buffer")
                };
                let mut copied = 0;
                while copied < buf.len() {
                    if !cursor.has_cached_bytes() {
                        if !cb.next_chunk(&mut cursor.next_seq, &mut cursor.cache) {
                            break;
                        }
                        cursor.cache_pos = 0;
                    }
                    let n = cursor.drain_cache(&mut buf[copied..]);
                    if n == 0 {
                        break;
                    }
                    copied += n;
                }
                copied
            }
        }
    }

    /// Promotes `Bound` to `Cursor` if not already there. Called
    /// explicitly by bring-up (`SPEC_FULL.md` §4.F step 1, "for every
    /// non-empty input slot ... allocate the matching cursor"); `read`
    /// also calls it so a slot read before its node's bring-up runs
    /// (which should never happen in a well-formed graph) still behaves
    /// rather than panicking.
    pub(crate) fn ensure_cursor(&mut self, reader_cache_size: usize) {
        if let InputBinding::Bound(buffer) = self {
            let buffer = Arc::clone(buffer);
            *self = match buffer.as_buffer() {
                OutputBuffer::Linear(_) => InputBinding::Cursor(BoundCursor::Linear(buffer, LinearCursor::default())),
                OutputBuffer::Circular(_) => {
                    let seq = buffer.register_reader();
                    InputBinding::Cursor(BoundCursor::Circular(buffer, CircularCursor::new(seq, reader_cache_size)))
                }
            };
        }
    }

    /// Tears the cursor back down to `Bound`, withdrawing any
    /// circular-reader registration. Called at bring-down, when the
    /// owning node terminates (`SPEC_FULL.md` §4.D): "the wrapping slot
    /// is freed and the plain buffer reference is restored in place".
    pub(crate) fn deactivate(&mut self) {
        let prior = std::mem::replace(self, InputBinding::Unbound);
        *self = match prior {
            InputBinding::Unbound => InputBinding::Unbound,
            InputBinding::Bound(buffer) => InputBinding::Bound(buffer),
            InputBinding::Cursor(BoundCursor::Linear(buffer, _)) => InputBinding::Bound(buffer),
            InputBinding::Cursor(BoundCursor::Circular(buffer, cursor)) => {
                buffer.unregister_reader(cursor.next_seq);
                InputBinding::Bound(buffer)
            }
        };
    }
}

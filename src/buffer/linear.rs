//! Linear buffer: a bounded, single-writer/multi-reader byte stream with
//! no wraparound (component B, `SPEC_FULL.md` §4.B).
//!
//! Grounded on `st_lbwrite` / `st_readlb` / `st_bufstatlb` in the
//! original `node_io.c`: the write offset `w` is the single piece of
//! shared state, a reader blocks while the bytes it wants haven't been
//! written yet, and the writer's own view of `w` never needs the lock
//! because it is the only thread that ever advances it.
//!
//! # Synchronization protocol
//!
//! `local_w` is the writer's private, unsynchronized running offset —
//! safe because a buffer has exactly one writer for its entire
//! lifetime. `shared.w` is the copy readers observe; the writer
//! publishes into it, and out of it, only while holding `shared`'s
//! mutex. Once a reader has observed `shared.w == n` under the lock, it
//! may safely read bytes `[0, n)` from `data` *after* releasing the
//! lock: the mutex's release/acquire pair is what makes the writer's
//! earlier, lock-free byte copy visible.

use std::cell::UnsafeCell;
use std::sync::{Condvar, Mutex};

use super::BufferStatus;

struct LinearShared {
    w: usize,
    status: BufferStatus,
}

/// A bounded byte buffer written once, start to end, by a single
/// producer and read by any number of readers holding independent
/// cursors (see `crate::slot::LinearCursor`).
pub(crate) struct LinearBuffer {
    cap: usize,
    data: UnsafeCell<Box<[u8]>>,
    local_w: UnsafeCell<usize>,
    shared: Mutex<LinearShared>,
    cond: Condvar,
}

// SAFETY: `data` is written only by the single writer thread, and only
// at offsets past the one other threads can observe under `shared`'s
// lock; `local_w` is touched only by that same writer thread. Neither
// invariant depends on which thread happens to drop the buffer.
unsafe impl Send for LinearBuffer {}
unsafe impl Sync for LinearBuffer {}

impl LinearBuffer {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            data: UnsafeCell::new(vec![0u8; cap].into_boxed_slice()),
            local_w: UnsafeCell::new(0),
            shared: Mutex::new(LinearShared {
                w: 0,
                status: BufferStatus::Ready,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    /// Appends `buf` to the stream, dropping any bytes past `cap`.
    ///
    /// Always reports `buf.len()`: writing past capacity is a
    /// deliberate, silent policy rather than an error (`SPEC_FULL.md`
    /// §4.B).
    pub(crate) fn write(&self, buf: &[u8]) -> usize {
        let n = buf.len();

        // SAFETY: only the writer thread ever reads or writes `local_w`.
        let w = unsafe { *self.local_w.get() };
        let write_size = (self.cap - w).min(n);
        if write_size == 0 {
            return n;
        }

        // SAFETY: bytes `[0, w)` are already published; no reader can
        // reach `[w, w + write_size)` until `shared.w` is advanced below,
        // so this store cannot race a reader's copy.
        unsafe {
            let base = (*self.data.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(buf.as_ptr(), base.add(w), write_size);
        }

        let new_w = w + write_size;
        // SAFETY: see above; still the writer's exclusive field.
        unsafe {
            *self.local_w.get() = new_w;
        }

        let mut shared = self.shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        shared.w = new_w;
        drop(shared);
        self.cond.notify_all();

        n
    }

    /// Reads up to `buf.len()` bytes starting at cursor `*r`, blocking
    /// until that many bytes exist or the buffer goes `Inactive`.
    ///
    /// Returns the number of bytes actually copied and advances `*r` by
    /// that amount. A return less than `buf.len()` (including zero)
    /// after the buffer is `Inactive` is the stream's end-of-data
    /// signal; it is never reported as an error.
    pub(crate) fn read(&self, r: &mut usize, buf: &mut [u8]) -> usize {
        let mut nbyte = buf.len().min(self.cap.saturating_sub(*r));
        if nbyte == 0 {
            return 0;
        }

        let mut shared = self.shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while shared.w.saturating_sub(*r) < nbyte && shared.status != BufferStatus::Inactive {
            shared = self
                .cond
                .wait(shared)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        if shared.status == BufferStatus::Inactive {
            nbyte = nbyte.min(shared.w.saturating_sub(*r));
        }
        drop(shared);

        if nbyte == 0 {
            return 0;
        }

        // SAFETY: we just observed, under the lock, that at least `*r +
        // nbyte` bytes have been published by the writer.
        unsafe {
            let base = (*self.data.get()).as_ptr();
            std::ptr::copy_nonoverlapping(base.add(*r), buf.as_mut_ptr(), nbyte);
        }
        *r += nbyte;
        nbyte
    }

    /// Sets status, dispatching the Ready transition's extra duty: a
    /// rewind must reset the write cursor, not just the flag, or a
    /// replayed run would resume writing (and reading) from wherever the
    /// previous run left off instead of byte zero (`SPEC_FULL.md` §8
    /// property 6, "Rewind idempotence"). Safe to zero `local_w`
    /// unsynchronized here: Ready is only ever reached after `join` has
    /// already reclaimed the writer thread that owned it.
    pub(crate) fn set_status(&self, status: BufferStatus) {
        let mut shared = self.shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if status == BufferStatus::Ready {
            shared.w = 0;
            // SAFETY: see doc comment above.
            unsafe {
                *self.local_w.get() = 0;
            }
        }
        shared.status = status;
        drop(shared);
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> BufferStatus {
        self.shared.lock().unwrap().status
    }
}

//! Circular buffer: bounded in space, unbounded in time (component C,
//! `SPEC_FULL.md` §4.C).
//!
//! Grounded on the original `node_io.c`: `cb_writechunk` and
//! `cb_genfreespace`/`cb_realfreespace` for the writer's backpressure
//! loop, `cb_acquire`/`cb_release` for how a reader borrows and returns
//! a chunk, and `cb_dowrite`/`inc_cacheread` for the release-scan that
//! reclaims space once every live reader has passed a chunk.
//!
//! Data is framed on the wire as `<count: u16><size: u16><payload>`
//! (`SPEC_FULL.md` §6): `count` is the number of readers that have
//! already passed the chunk, `size` its payload length. Both fields are
//! written into the ring itself (via the same wraparound-safe
//! `copy_in`/`copy_out` helpers used for payload bytes, so a header may
//! straddle the wrap point exactly like a payload can); `ChunkMeta`
//! below is just the writer/reader-side index into that framing, not a
//! substitute for it.
//!
//! # Synchronization protocol
//!
//! Two independent locks, matching the two independent conditions a
//! caller can block on:
//!
//! - `space` (+ `space_cond`) guards the write cursor and reclaimed
//!   count (`written`, `transferred`). A writer blocks on `space_cond`
//!   when the ring has no room for the next chunk; `release_scan` wakes
//!   it once enough trailing chunks are fully read.
//! - `refs` (+ `data_cond`) guards the live reader count and the
//!   metadata queue for chunks not yet fully read. A reader blocks on
//!   `data_cond` waiting for the chunk at its cursor to exist; `write`
//!   wakes it once that chunk is published.
//!
//! Each lock is wrapped in a [`CachePadded`] so the writer spinning on
//! `space` and a reader spinning on `refs` never ping-pong the same
//! cache line.
//!
//! A chunk's header and payload bytes are copied into the ring without
//! holding either lock: by the time a reader can see a `ChunkMeta` for
//! it (under `refs`), `write` has already finished both copies, and the
//! ring region it occupies cannot be reused until `transferred` passes
//! it, which only happens after every credited reader calls `release`.
//!
//! # Writer backpressure
//!
//! A single logical `write` call may carry far more payload than `cap`
//! bytes of ring space (`SPEC_FULL.md` §4.C: the CB is "unbounded in
//! time even though bounded in space"). `write` never waits for room
//! for the whole call at once — it repeatedly asks for whatever the
//! ring can currently hold (`reserve_pass`, mirroring
//! `cb_genfreespace`/`cb_realfreespace`), publishes that much as one or
//! more chunks, and loops, blocking on `space_cond` between passes when
//! the ring is momentarily full. `real_free` subtracts the 4-byte header
//! every full-size chunk would need, the same accounting the original's
//! `cb_realfreespace` performs, so a pass never promises more usable
//! payload room than the ring can actually back.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crossbeam_utils::CachePadded;

use super::BufferStatus;
use crate::config::Config;
use crate::invariants::{
    debug_assert_chunk_within_limit, debug_assert_release_has_credit,
    debug_assert_scan_stops_at_live_chunk, debug_assert_transferred_not_past_written,
};
use crate::metrics::Metrics;

struct ChunkMeta {
    /// Ring offset of the chunk's 4-byte header (payload starts 4 bytes
    /// past this, mod `cap`).
    offset: usize,
    size: u16,
    /// Readers that have passed this chunk so far; reclaimed once it
    /// reaches `expected_readers` (`SPEC_FULL.md` §6's wire `count`).
    count: u16,
}

struct SpaceState {
    written: u64,
    transferred: u64,
}

struct RefsState {
    status: BufferStatus,
    /// The reader count `R` this run's chunks are credited against,
    /// fixed once at activation (`SPEC_FULL.md` §3: "reader count ...
    /// fixed at start of run") rather than tracked as readers happen to
    /// register. Using a live count here instead would race the
    /// scheduler: a writer's thread can start producing chunks before a
    /// sibling `Par` reader's own bring-up has run, and a chunk credited
    /// against however many readers had registered *at that instant*
    /// could be reclaimed before a not-yet-activated reader ever sees it.
    expected_readers: usize,
    /// How many of `expected_readers` have registered so far; purely
    /// diagnostic (`debug_assert`ed against `expected_readers`).
    registered_readers: usize,
    /// Sequence number of `chunks.front()`; chunks already scanned out
    /// are simply gone, never retained as tombstones.
    base_seq: u64,
    chunks: VecDeque<ChunkMeta>,
}

/// A bounded-space, chunk-framed byte stream with multiple independent
/// readers, each advancing through the same chunk sequence at its own
/// pace.
pub(crate) struct CircularBuffer {
    cap: usize,
    chunk_limit: u16,
    data: UnsafeCell<Box<[u8]>>,
    space: CachePadded<Mutex<SpaceState>>,
    space_cond: Condvar,
    refs: CachePadded<Mutex<RefsState>>,
    data_cond: Condvar,
    metrics: Arc<Metrics>,
}

// SAFETY: `data` is only ever touched through `copy_in`/`copy_out`. A
// byte range is exclusively owned by the writer from the moment `space`
// advances `written` past it until a `ChunkMeta` naming it is published
// under `refs`; after that it is read-only until `transferred` passes
// it, which cannot happen before every credited reader calls `release`.
unsafe impl Send for CircularBuffer {}
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    pub(crate) fn new(cap: usize, chunk_limit: u16, metrics: Arc<Metrics>) -> Self {
        Self {
            cap,
            chunk_limit,
            data: UnsafeCell::new(vec![0u8; cap].into_boxed_slice()),
            space: CachePadded::new(Mutex::new(SpaceState {
                written: 0,
                transferred: 0,
            })),
            space_cond: Condvar::new(),
            refs: CachePadded::new(Mutex::new(RefsState {
                status: BufferStatus::Ready,
                expected_readers: 0,
                registered_readers: 0,
                base_seq: 0,
                chunks: VecDeque::new(),
            })),
            data_cond: Condvar::new(),
            metrics,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    /// Writes `buf`, looping a pass at a time until every byte is
    /// published. Unlike the linear buffer, a circular buffer never
    /// drops bytes: it is unbounded in time even though its backing
    /// storage is bounded in space (`SPEC_FULL.md` §4.C). A single call
    /// may carry far more than `cap` bytes; each pass is bounded only by
    /// whatever room the ring currently has, so the writer always makes
    /// progress as readers drain rather than ever waiting for room that
    /// can never exist all at once.
    pub(crate) fn write(&self, buf: &[u8]) -> usize {
        let mut done = 0;
        while done < buf.len() {
            let take = self.reserve_pass(buf.len() - done);
            let mut offset = 0;
            while offset < take {
                let chunk_len = (take - offset).min(self.chunk_limit as usize);
                self.write_one_chunk(&buf[done + offset..done + offset + chunk_len]);
                offset += chunk_len;
            }
            done += take;
        }
        done
    }

    /// How many raw ring bytes `free_total` bytes of space can actually
    /// carry as payload once every full-size chunk's 4-byte header is
    /// accounted for (`cb_realfreespace`): `free_total` split into
    /// chunks of at most `max_chunk_size` each still needs one header
    /// per chunk, so that many headers come out of the total before any
    /// of it can be promised to a writer.
    fn real_free(&self, free_total: u64) -> u64 {
        let max_chunk = self.chunk_limit as u64 + Config::CHUNK_HEADER_SIZE as u64;
        if free_total <= Config::CHUNK_HEADER_SIZE as u64 {
            0
        } else {
            let chunks = free_total.div_ceil(max_chunk);
            free_total.saturating_sub(Config::CHUNK_HEADER_SIZE as u64 * chunks)
        }
    }

    /// Blocks until the ring has room for at least one payload byte,
    /// then returns how many of `want` bytes this pass may publish.
    /// Never promises more than `real_free` lets the ring actually back.
    fn reserve_pass(&self, want: usize) -> usize {
        // Opportunistic, non-blocking: chunks already fully read by
        // every credited reader may not have been scanned out yet.
        self.release_scan();

        let mut space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
        let mut blocked = false;
        loop {
            let free_total = self.cap as u64 - (space.written - space.transferred);
            let real_free = self.real_free(free_total);
            if real_free > 0 {
                return (real_free as usize).min(want);
            }
            if !blocked {
                blocked = true;
                self.metrics.writer_blocked();
                tracing::debug!(requested = want, "circular buffer writer waiting for free space");
            }
            space = self.space_cond.wait(space).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn write_one_chunk(&self, payload: &[u8]) {
        debug_assert_chunk_within_limit!(payload.len(), self.chunk_limit as usize);

        let total_len = Config::CHUNK_HEADER_SIZE as u64 + payload.len() as u64;
        let mut space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert_transferred_not_past_written!(space.transferred, space.written);
        let header_offset = (space.written % self.cap as u64) as usize;
        space.written += total_len;
        drop(space);

        // SAFETY: see module-level synchronization protocol note.
        unsafe {
            let mut header = [0u8; Config::CHUNK_HEADER_SIZE];
            header[0..2].copy_from_slice(&0u16.to_le_bytes());
            header[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
            self.copy_in(header_offset, &header);
            let payload_offset = (header_offset + Config::CHUNK_HEADER_SIZE) % self.cap;
            self.copy_in(payload_offset, payload);
        }

        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.chunks.push_back(ChunkMeta {
            offset: header_offset,
            size: payload.len() as u16,
            count: 0,
        });
        let reclaim_now = refs.expected_readers == 0;
        drop(refs);
        self.data_cond.notify_all();
        if reclaim_now {
            self.release_scan();
        }
    }

    /// Marks this buffer `Active` and fixes `expected_readers` at `R`,
    /// the reader count captured from the owning output slot's flows at
    /// the moment the writer's node activates — before its thread is
    /// spawned (`SPEC_FULL.md` §4.F "Bring-up" step 2 precedes step 4),
    /// so every chunk this run ever writes is credited against the full
    /// `R` regardless of how many of those readers have themselves
    /// reached bring-up yet.
    pub(crate) fn activate(&self, reader_count: usize) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.status = BufferStatus::Active;
        refs.expected_readers = reader_count;
        drop(refs);
        self.data_cond.notify_all();
    }

    /// Registers a new reader, returning the sequence number of the
    /// oldest chunk still queued. Since `expected_readers` is fixed
    /// before any chunk is written, no queued chunk can have been
    /// reclaimed without this reader's credit, regardless of how late
    /// its own bring-up runs relative to the writer's — there are no
    /// "late joiners" once a run has started, only readers whose
    /// registration call happens to land after a few chunks exist.
    pub(crate) fn register_reader(&self) -> u64 {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.registered_readers += 1;
        debug_assert!(
            refs.registered_readers <= refs.expected_readers,
            "more readers registered ({}) than the fixed reader count ({})",
            refs.registered_readers,
            refs.expected_readers
        );
        refs.base_seq
    }

    /// Withdraws a reader that had advanced through chunks up to (but
    /// not including) `next_seq`, crediting it against every chunk at or
    /// after that point as if it had read them, so a reader that
    /// terminates without draining to EOF can never starve the release
    /// scan.
    pub(crate) fn unregister_reader(&self, next_seq: u64) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        refs.registered_readers = refs.registered_readers.saturating_sub(1);
        let start = next_seq.saturating_sub(refs.base_seq) as usize;
        let expected = refs.expected_readers as u16;
        for meta in refs.chunks.iter_mut().skip(start) {
            if meta.count < expected {
                meta.count += 1;
            }
        }
        drop(refs);
        self.release_scan();
    }

    /// Blocks until the chunk at `*next_seq` is available, copies its
    /// payload into `out` (cleared first), advances `*next_seq`, and
    /// releases the reader's credit against it. Returns `false` once the
    /// buffer has gone `Inactive` and every chunk has been consumed —
    /// the stream's end-of-data signal.
    pub(crate) fn next_chunk(&self, next_seq: &mut u64, out: &mut Vec<u8>) -> bool {
        let (offset, size) = {
            let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                let idx = next_seq.saturating_sub(refs.base_seq) as usize;
                if let Some(meta) = refs.chunks.get(idx) {
                    break (meta.offset, meta.size);
                }
                if refs.status == BufferStatus::Inactive {
                    return false;
                }
                refs = self.data_cond.wait(refs).unwrap_or_else(PoisonError::into_inner);
            }
        };

        out.clear();
        out.resize(size as usize, 0);
        // SAFETY: a `ChunkMeta` for this chunk is only visible under
        // `refs` once `write_one_chunk`'s `copy_in` calls have completed.
        unsafe {
            let payload_offset = (offset + Config::CHUNK_HEADER_SIZE) % self.cap;
            self.copy_out(payload_offset, out);
        }

        self.release(*next_seq);
        *next_seq += 1;
        true
    }

    fn release(&self, seq: u64) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        let expected = refs.expected_readers as u16;
        if let Some(meta) = refs.chunks.get_mut(seq.saturating_sub(refs.base_seq) as usize) {
            debug_assert_release_has_credit!(meta.count, expected);
            meta.count = meta.count.saturating_add(1).min(expected);
        }
        drop(refs);
        self.release_scan();
    }

    fn release_scan(&self) {
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        let expected = refs.expected_readers as u16;
        let mut freed = 0u64;
        while let Some(front) = refs.chunks.front() {
            if front.count < expected {
                debug_assert_scan_stops_at_live_chunk!(front.count, expected);
                break;
            }
            let meta = refs.chunks.pop_front().expect("front just checked Some");
            refs.base_seq += 1;
            freed += Config::CHUNK_HEADER_SIZE as u64 + meta.size as u64;
        }
        drop(refs);
        if freed > 0 {
            let mut space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
            space.transferred += freed;
            debug_assert_transferred_not_past_written!(space.transferred, space.written);
            drop(space);
            self.space_cond.notify_all();
        }
    }

    /// Sets status directly. `Active` should normally be reached through
    /// [`CircularBuffer::activate`] instead, which also fixes
    /// `expected_readers`; this remains for the rare direct
    /// `set_buffer_status` call and for tests. `Ready` resets every
    /// byte-level counter so a replayed run starts exactly as a fresh
    /// buffer would (`SPEC_FULL.md` §8 property 6).
    pub(crate) fn set_status(&self, status: BufferStatus) {
        if status == BufferStatus::Ready {
            let mut space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
            space.written = 0;
            space.transferred = 0;
            drop(space);
        }
        let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        if status == BufferStatus::Ready {
            refs.base_seq = 0;
            refs.chunks.clear();
            refs.expected_readers = 0;
            refs.registered_readers = 0;
        }
        refs.status = status;
        drop(refs);
        self.data_cond.notify_all();
        self.space_cond.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> BufferStatus {
        self.refs.lock().unwrap().status
    }

    unsafe fn copy_in(&self, offset: usize, payload: &[u8]) {
        let data = (*self.data.get()).as_mut_ptr();
        let first = (self.cap - offset).min(payload.len());
        std::ptr::copy_nonoverlapping(payload.as_ptr(), data.add(offset), first);
        if first < payload.len() {
            std::ptr::copy_nonoverlapping(payload.as_ptr().add(first), data, payload.len() - first);
        }
    }

    unsafe fn copy_out(&self, offset: usize, out: &mut [u8]) {
        let data = (*self.data.get()).as_ptr();
        let first = (self.cap - offset).min(out.len());
        std::ptr::copy_nonoverlapping(data.add(offset), out.as_mut_ptr(), first);
        if first < out.len() {
            std::ptr::copy_nonoverlapping(data, out.as_mut_ptr().add(first), out.len() - first);
        }
    }
}

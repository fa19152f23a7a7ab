//! Debug assertion macros for buffer and scheduler invariants.
//!
//! Active only under `#[cfg(debug_assertions)]`, so release builds pay
//! nothing for them. Modeled on `ringmpsc`'s own invariant macros: one
//! macro per named invariant, each citing the tag used in `DESIGN.md`.

// =============================================================================
// INV-CB-01: Chunk Fits The Configured Limit
// =============================================================================

/// A single chunk's payload never exceeds `chunk_payload_limit`.
///
/// Used in: `CircularBuffer::write_one_chunk`
macro_rules! debug_assert_chunk_within_limit {
    ($len:expr, $limit:expr) => {
        debug_assert!(
            $len <= $limit,
            "INV-CB-01 violated: chunk payload {} exceeds configured limit {}",
            $len,
            $limit
        )
    };
}

// =============================================================================
// INV-CB-02: Space Accounting Never Goes Negative
// =============================================================================

/// `transferred` never runs ahead of `written`.
///
/// Used in: `CircularBuffer::write_one_chunk`, `release_scan`
macro_rules! debug_assert_transferred_not_past_written {
    ($transferred:expr, $written:expr) => {
        debug_assert!(
            $transferred <= $written,
            "INV-CB-02 violated: transferred {} exceeds written {}",
            $transferred,
            $written
        )
    };
}

// =============================================================================
// INV-CB-03: Release Has A Matching Acquire Credit
// =============================================================================

/// A reader never releases a chunk already credited by every reader the
/// run expects.
///
/// Used in: `CircularBuffer::release`
macro_rules! debug_assert_release_has_credit {
    ($count:expr, $expected:expr) => {
        debug_assert!(
            $count < $expected,
            "INV-CB-03 violated: release called on a chunk already credited by all {} expected readers",
            $expected
        )
    };
}

// =============================================================================
// INV-CB-04: Release Scan Only Frees A Contiguous Prefix
// =============================================================================

/// `release_scan` must stop at the first chunk still awaiting a reader;
/// it never frees out of order.
///
/// Used in: `CircularBuffer::release_scan`
macro_rules! debug_assert_scan_stops_at_live_chunk {
    ($count:expr, $expected:expr) => {
        debug_assert!(
            $count < $expected,
            "INV-CB-04 violated: release_scan continued past a chunk still awaiting readers ({} of {} credited)",
            $count,
            $expected
        )
    };
}

// =============================================================================
// INV-SCHED-01: Start Requests Never Exceed Registered Parents
// =============================================================================

/// A node's rendezvous counter never counts more arrivals than it has
/// incoming edges.
///
/// Used in: `Scheduler::try_start`
macro_rules! debug_assert_start_requests_bounded {
    ($requests:expr, $parents:expr) => {
        debug_assert!(
            $requests <= $parents,
            "INV-SCHED-01 violated: start_requests {} exceeds parents {}",
            $requests,
            $parents
        )
    };
}

pub(crate) use debug_assert_chunk_within_limit;
pub(crate) use debug_assert_release_has_credit;
pub(crate) use debug_assert_scan_stops_at_live_chunk;
pub(crate) use debug_assert_start_requests_bounded;
pub(crate) use debug_assert_transferred_not_past_written;

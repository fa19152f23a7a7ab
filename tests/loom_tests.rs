//! Loom-based concurrency tests for the rendezvous counter and circular
//! buffer release/acquire handoff (`SPEC_FULL.md` §4.K).
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings rather than relying
//! on chance scheduling to surface a race. The models here are
//! simplified, self-contained reimplementations of the same
//! synchronization protocol as [`crate::node::Node::register_arrival`]
//! and the circular buffer's space/refs handoff — loom requires its own
//! `loom::sync` primitives in place of `std::sync`, so the production
//! types (built on real `Mutex`/`Condvar`) cannot be exercised directly
//! under the model checker.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

/// Mirrors `Rendezvous::start_requests`/`parents` and
/// `Node::register_arrival`'s compare-then-flip: a node must activate
/// on exactly the `parents`-th arrival, never earlier, never twice.
struct Rendezvous {
    parents: usize,
    start_requests: AtomicUsize,
    started: AtomicUsize,
}

impl Rendezvous {
    fn new(parents: usize) -> Self {
        Self {
            parents,
            start_requests: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Returns `true` exactly once across however many times it is
    /// called concurrently with `parents` total arrivals.
    fn arrive(&self) -> bool {
        let seen = self.start_requests.fetch_add(1, Ordering::AcqRel) + 1;
        if seen == self.parents {
            self.started.fetch_add(1, Ordering::AcqRel) == 0
        } else {
            false
        }
    }
}

/// INV-SCHED-01: two concurrent arrivals at a two-parent node fire the
/// downstream exactly once, regardless of which arrival is "last".
#[test]
fn loom_rendezvous_fires_exactly_once_for_two_parents() {
    loom::model(|| {
        let rendezvous = Arc::new(Rendezvous::new(2));
        let r1 = Arc::clone(&rendezvous);
        let r2 = Arc::clone(&rendezvous);

        let t1 = thread::spawn(move || r1.arrive());
        let t2 = thread::spawn(move || r2.arrive());

        let fired_a = t1.join().unwrap();
        let fired_b = t2.join().unwrap();

        assert_eq!(
            rendezvous.started.load(Ordering::SeqCst),
            1,
            "exactly one arrival must observe the rendezvous as satisfied"
        );
        assert!(fired_a ^ fired_b, "exactly one of the two arrivals reports having fired it");
    });
}

/// INV-SCHED-01 generalized: three concurrent arrivals at a
/// three-parent node still fire exactly once.
#[test]
fn loom_rendezvous_fires_exactly_once_for_three_parents() {
    loom::model(|| {
        let rendezvous = Arc::new(Rendezvous::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let r = Arc::clone(&rendezvous);
                thread::spawn(move || r.arrive())
            })
            .collect();

        let fired_count = handles.into_iter().filter(|h| h.join().unwrap()).count();

        assert_eq!(fired_count, 1, "exactly one of the three arrivals must report having fired it");
        assert_eq!(rendezvous.started.load(Ordering::SeqCst), 1);
    });
}

/// Simplified model of the circular buffer's two-domain handoff: a
/// writer publishes `written` bytes (space domain) while a reader
/// tracks `transferred` bytes it has consumed, and a release scan may
/// only reclaim space up to `transferred`, never past `written`. Models
/// `CircularBuffer`'s invariant that `transferred <= written` always
/// holds regardless of how interleaved the two sides run.
struct SpaceDomain {
    written: AtomicUsize,
    transferred: AtomicUsize,
}

impl SpaceDomain {
    fn new() -> Self {
        Self {
            written: AtomicUsize::new(0),
            transferred: AtomicUsize::new(0),
        }
    }

    fn write(&self, n: usize) {
        self.written.fetch_add(n, Ordering::Release);
    }

    /// A reader may only advance `transferred` up to what it has
    /// observed as `written`; this is the invariant the scheduler's
    /// release-scan recomputation depends on.
    fn consume(&self, n: usize) {
        let written = self.written.load(Ordering::Acquire);
        let transferred = self.transferred.load(Ordering::Acquire);
        let take = n.min(written.saturating_sub(transferred));
        self.transferred.fetch_add(take, Ordering::Release);
    }
}

/// INV-CB-02/03: `transferred` never exceeds `written`, under any
/// interleaving of one writer and one reader.
#[test]
fn loom_cb_transferred_never_exceeds_written() {
    loom::model(|| {
        let domain = Arc::new(SpaceDomain::new());
        let writer_domain = Arc::clone(&domain);
        let reader_domain = Arc::clone(&domain);

        let writer = thread::spawn(move || {
            writer_domain.write(3);
        });
        let reader = thread::spawn(move || {
            reader_domain.consume(5);
        });

        writer.join().unwrap();
        reader.join().unwrap();

        let written = domain.written.load(Ordering::SeqCst);
        let transferred = domain.transferred.load(Ordering::SeqCst);
        assert!(transferred <= written, "transferred {transferred} must never exceed written {written}");
    });
}

//! Property-based tests for the testable invariants of `SPEC_FULL.md` §8,
//! fuzzing randomized write/read interleavings the way
//! `crates/ringmpsc/tests/property_tests.rs` fuzzes its ring invariants.

use proptest::prelude::*;
use std::sync::Arc;

use straph::{Graph, Mode, SlotBuffer};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// INV-LB-01 (§8 property 1): a linear buffer never delivers more
    /// bytes to a reader than were written, and once the writer has gone
    /// Inactive a reader's cumulative read converges on `min(written, cap)`.
    #[test]
    fn lb_conservation(cap in 1usize..256, total in 0usize..512, chunk in 1usize..64) {
        let mut graph: Graph<usize> = Graph::with_default_config();
        let written_total = total;
        let n1 = graph.make_node(move |ctx| {
            let payload = vec![9u8; written_total];
            let mut done = 0;
            while done < payload.len() {
                let take = (payload.len() - done).min(chunk);
                ctx.write(0, &payload[done..done + take]);
                done += take;
            }
            done
        });
        let n2 = graph.make_node(move |ctx| {
            let mut total_read = 0;
            let mut buf = vec![0u8; 32];
            loop {
                let n = ctx.read(0, &mut buf);
                if n == 0 {
                    break;
                }
                total_read += n;
            }
            total_read
        });
        graph.add_entry(n1);
        graph.set_buffer(n1, 0, SlotBuffer::Linear(cap)).unwrap();
        graph.link(n1, n2, Mode::Seq);
        graph.add_flow(n1, 0, n2, 0).unwrap();

        graph.start().unwrap();
        graph.join().unwrap();

        let read = graph.take_result(n2).unwrap();
        prop_assert!(read <= written_total.min(cap));
        prop_assert_eq!(read, written_total.min(cap));
    }

    /// INV-CB-02/03 (§8 property 3): `0 <= written - transferred <= cap`
    /// holds at the end of a run regardless of write/read granularity —
    /// checked indirectly here via full delivery (property 2) since the
    /// counters themselves are crate-private; a writer that could violate
    /// the space bound would either under- or over-deliver bytes.
    #[test]
    fn cb_delivery_matches_writer_stream(
        cap in 16usize..512,
        total in 0usize..4096,
        write_chunk in 1usize..128,
        read_chunk in 1usize..128,
    ) {
        let mut graph: Graph<Vec<u8>> = Graph::with_default_config();
        let payload: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = graph.make_node(move |ctx| {
            let mut done = 0;
            while done < payload.len() {
                let take = (payload.len() - done).min(write_chunk);
                ctx.write(0, &payload[done..done + take]);
                done += take;
            }
            Vec::new()
        });
        let reader = graph.make_node(move |ctx| {
            let mut out = Vec::new();
            let mut buf = vec![0u8; read_chunk];
            loop {
                let n = ctx.read(0, &mut buf);
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            out
        });
        graph.add_entry(writer);
        graph.set_buffer(writer, 0, SlotBuffer::Circular(cap)).unwrap();
        graph.link(writer, reader, Mode::Par);
        graph.add_flow(writer, 0, reader, 0).unwrap();

        graph.start().unwrap();
        graph.join().unwrap();

        prop_assert_eq!(graph.take_result(reader).unwrap(), expected);
    }

    /// INV-SCHED-01 (§8 property 5): a node with `parents = k` activates
    /// exactly once, on the k-th distinct arrival, regardless of arrival
    /// order among its parents (all Seq edges here to keep the race
    /// entirely inside the rendezvous counter rather than thread
    /// scheduling).
    #[test]
    fn rendezvous_fires_once_per_run(k in 1usize..8) {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut graph: Graph<()> = Graph::with_default_config();
        let invocations = Arc::new(AtomicUsize::new(0));
        let sink = {
            let invocations = Arc::clone(&invocations);
            graph.make_node(move |_ctx| {
                invocations.fetch_add(1, Ordering::SeqCst);
            })
        };
        for _ in 0..k {
            let parent = graph.make_node(|_ctx| ());
            graph.add_entry(parent);
            graph.link(parent, sink, Mode::Seq);
        }

        graph.start().unwrap();
        graph.join().unwrap();

        prop_assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}

/// INV-REWIND-01 (§8 property 6): start/join/rewind returns the graph to
/// its pre-start observable state, and the next start/join reproduces
/// the same result. Not a `proptest!` case since it exercises full
/// thread spawning twice per iteration; run as a handful of fixed
/// repetitions instead.
#[test]
fn rewind_idempotence_across_replays() {
    for _ in 0..5 {
        let mut graph: Graph<u8> = Graph::with_default_config();
        let n1 = graph.make_node(|ctx| {
            ctx.write(0, b"Z");
            0
        });
        let n2 = graph.make_node(|ctx| {
            let mut buf = [0u8; 1];
            let n = ctx.read(0, &mut buf);
            if n == 1 {
                buf[0]
            } else {
                0
            }
        });
        graph.add_entry(n1);
        graph.set_buffer(n1, 0, SlotBuffer::Linear(1)).unwrap();
        graph.link(n1, n2, Mode::Seq);
        graph.add_flow(n1, 0, n2, 0).unwrap();

        for _ in 0..2 {
            graph.start().unwrap();
            graph.join().unwrap();
            assert_eq!(graph.take_result(n2), Some(b'Z'));
        }
    }
}

/// INV-SCHED-DESTROY-01 (§8 property 7): a graph with a directed cycle
/// among its nodes (via execution edges unrelated to the entries the
/// scheduler actually starts) can be destroyed without double free —
/// exercised here by actually running the graph to keep the cycle
/// inert for the scheduler while still present for `destroy`'s walk.
#[test]
fn destroy_is_cycle_safe() {
    let mut graph: Graph<()> = Graph::with_default_config();
    let a = graph.make_node(|_ctx| ());
    let b = graph.make_node(|_ctx| ());
    let c = graph.make_node(|_ctx| ());
    graph.add_entry(a);
    graph.link(a, b, Mode::Seq);
    graph.link(b, c, Mode::Seq);
    // c -> a closes a cycle among the neighbor lists `destroy` walks.
    // This edge is never reachable during `start` because `a` is the
    // only entry and has already transitioned past `Inactive` by the
    // time `c` would try to re-signal it, so it is never activated
    // twice — but `destroy`'s BFS still walks through it.
    graph.link(c, a, Mode::Par);

    graph.start().unwrap();
    graph.join().unwrap();
    graph.destroy();
}

#[test]
fn read_write_on_unbound_slots_behave_as_dev_null() {
    let mut graph: Graph<(usize, usize)> = Graph::with_default_config();
    let lone = graph.make_node(|ctx| {
        let written = ctx.write(0, b"nobody reads this");
        let mut buf = [0u8; 4];
        let read = ctx.read(0, &mut buf);
        (written, read)
    });
    graph.add_entry(lone);

    graph.start().unwrap();
    graph.join().unwrap();

    assert_eq!(graph.take_result(lone), Some((18, 0)));
}

#[test]
fn multi_reader_cb_space_bound_holds_under_thread_pressure() {
    // A stress variant of S3 with more readers and smaller writes, run
    // directly (outside proptest) since it spins up real threads.
    let mut graph: Graph<Vec<u8>> = Graph::with_default_config();
    let writer = graph.make_node(|ctx| {
        for byte in 0u8..=255 {
            let chunk = [byte; 7];
            ctx.write(0, &chunk);
        }
        Vec::new()
    });
    let drain = |ctx: straph::NodeContext<Vec<u8>>| {
        let mut out = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    };
    let readers: Vec<_> = (0..4).map(|_| graph.make_node(drain)).collect();

    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(128)).unwrap();
    for &r in &readers {
        graph.link(writer, r, Mode::Par);
        graph.add_flow(writer, 0, r, 0).unwrap();
    }

    graph.start().unwrap();
    graph.join().unwrap();

    let expected: Vec<u8> = (0u8..=255).flat_map(|b| std::iter::repeat(b).take(7)).collect();
    for &r in &readers {
        assert_eq!(graph.take_result(r).unwrap(), expected);
    }
}

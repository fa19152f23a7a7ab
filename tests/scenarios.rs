//! End-to-end scenarios S1-S6 from `SPEC_FULL.md` §8.
//!
//! Unlike the unit tests alongside each module, these exercise the full
//! stack — `Graph` assembly through `start`/`join` — the way a user of
//! the crate would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use straph::{Config, Graph, Mode, SlotBuffer};

/// S1 — Sequential chain with LB EOF.
#[test]
fn s1_sequential_chain_with_lb_eof() {
    let mut graph: Graph<u8> = Graph::with_default_config();
    let n1 = graph.make_node(|ctx| {
        ctx.write(0, b"A");
        0
    });
    let n2 = graph.make_node(|ctx| {
        let mut buf = [0u8; 1];
        let n = ctx.read(0, &mut buf);
        assert_eq!(n, 1);
        buf[0]
    });
    graph.add_entry(n1);
    graph.set_buffer(n1, 0, SlotBuffer::Linear(1)).unwrap();
    graph.link(n1, n2, Mode::Seq);
    graph.add_flow(n1, 0, n2, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();
}

/// S2 — Parallel pipeline, CB handover.
#[test]
fn s2_parallel_pipeline_cb_handover() {
    let mut graph: Graph<Vec<u64>> = Graph::with_default_config();
    let writer = graph.make_node(|ctx| {
        for v in 1u64..=100 {
            ctx.write(0, &v.to_le_bytes());
        }
        Vec::new()
    });
    let reader = graph.make_node(|ctx| {
        let mut received = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            assert_eq!(n, 8, "CB reassembly must hand back whole u64s");
            received.push(u64::from_le_bytes(buf));
        }
        received
    });
    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(120)).unwrap();
    graph.link(writer, reader, Mode::Par);
    graph.add_flow(writer, 0, reader, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    let received = graph.take_result(reader).unwrap();
    assert_eq!(received, (1u64..=100).collect::<Vec<_>>());
}

/// S3 — Multi-reader CB: both readers bound before start, nreaders = 2.
#[test]
fn s3_multi_reader_cb_sees_the_same_stream() {
    let mut graph: Graph<Vec<u8>> = Graph::with_default_config();
    let writer = graph.make_node(|ctx| {
        let chunk = [7u8; 16];
        for _ in 0..625 {
            ctx.write(0, &chunk);
        }
        Vec::new()
    });
    let drain = |ctx: straph::NodeContext<Vec<u8>>| {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    };
    let reader_a = graph.make_node(drain);
    let reader_b = graph.make_node(drain);

    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(256)).unwrap();
    graph.link(writer, reader_a, Mode::Par);
    graph.link(writer, reader_b, Mode::Par);
    graph.add_flow(writer, 0, reader_a, 0).unwrap();
    graph.add_flow(writer, 0, reader_b, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    let expected: Vec<u8> = std::iter::repeat(7u8).take(625 * 16).collect();
    assert_eq!(graph.take_result(reader_a).unwrap(), expected);
    assert_eq!(graph.take_result(reader_b).unwrap(), expected);
}

/// S4 — CB back-pressure: small capacity forces the writer to block on
/// the metrics-visible `writer_blocked` hook at least once.
#[test]
fn s4_cb_backpressure_writer_blocks_and_all_bytes_arrive() {
    let mut graph: Graph<usize> = Graph::new(Config::DIAGNOSTIC);
    let writer = graph.make_node(|ctx| {
        let payload = vec![3u8; 10_000];
        let mut done = 0;
        while done < payload.len() {
            let take = (payload.len() - done).min(64);
            ctx.write(0, &payload[done..done + take]);
            done += take;
        }
        done
    });
    let reader = graph.make_node(|ctx| {
        let mut total = 0;
        let mut buf = [0u8; 100];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            total += n;
            thread::sleep(Duration::from_micros(50));
        }
        total
    });
    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(64)).unwrap();
    graph.link(writer, reader, Mode::Par);
    graph.add_flow(writer, 0, reader, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    assert_eq!(graph.take_result(reader), Some(10_000));
    assert!(graph.metrics().writer_blocked >= 1, "writer should have blocked at least once under backpressure");
}

/// S5 — Multi-parent rendezvous: n_c fires exactly once, after both
/// n_a and n_b terminate.
#[test]
fn s5_multi_parent_rendezvous_fires_once() {
    let invocations = Arc::new(AtomicU64::new(0));
    let mut graph: Graph<u8> = Graph::with_default_config();
    let a = graph.make_node(|_ctx| b'A');
    let b = graph.make_node(|_ctx| b'B');
    let counted = Arc::clone(&invocations);
    let c = graph.make_node(move |_ctx| {
        counted.fetch_add(1, Ordering::SeqCst);
        0
    });
    graph.add_entry(a);
    graph.add_entry(b);
    graph.link(a, c, Mode::Seq);
    graph.link(b, c, Mode::Seq);

    graph.start().unwrap();
    graph.join().unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(graph.take_result(a), Some(b'A'));
    assert_eq!(graph.take_result(b), Some(b'B'));
}

/// S6 — Rewind and replay: running S1 twice yields the same result both
/// times.
#[test]
fn s6_rewind_and_replay() {
    let mut graph: Graph<u8> = Graph::with_default_config();
    let n1 = graph.make_node(|ctx| {
        ctx.write(0, b"A");
        0
    });
    let n2 = graph.make_node(|ctx| {
        let mut buf = [0u8; 1];
        let n = ctx.read(0, &mut buf);
        assert_eq!(n, 1);
        buf[0]
    });
    graph.add_entry(n1);
    graph.set_buffer(n1, 0, SlotBuffer::Linear(1)).unwrap();
    graph.link(n1, n2, Mode::Seq);
    graph.add_flow(n1, 0, n2, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();
    assert_eq!(graph.take_result(n2), Some(b'A'));

    graph.start().unwrap();
    graph.join().unwrap();
    assert_eq!(graph.take_result(n2), Some(b'A'));
}

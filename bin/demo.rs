//! Demonstration of `straph` features.
//!
//! Run with: `cargo run --bin demo`

use std::time::Duration;

use straph::{Config, Graph, Mode, SlotBuffer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== straph Demo ===\n");

    demo_sequential_chain();
    demo_parallel_pipeline();
    demo_multi_reader_fan_out();
    demo_backpressure();
    demo_multi_parent_rendezvous();
    demo_rewind_and_replay();

    println!("\n=== All demos completed successfully! ===");
}

/// Demo 1: a two-node sequential chain joined by a linear buffer.
fn demo_sequential_chain() {
    println!("--- Demo 1: Sequential Chain (Linear Buffer) ---");

    let mut graph: Graph<String> = Graph::with_default_config();
    let producer = graph.make_node(|ctx| {
        let n = ctx.write(0, b"hello from the producer");
        format!("wrote {n} bytes")
    });
    let consumer = graph.make_node(|ctx| {
        let mut buf = [0u8; 64];
        let n = ctx.read(0, &mut buf);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });

    graph.add_entry(producer);
    graph.set_buffer(producer, 0, SlotBuffer::Linear(64)).unwrap();
    graph.link(producer, consumer, Mode::Seq);
    graph.add_flow(producer, 0, consumer, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    println!("  producer: {}", graph.take_result(producer).unwrap());
    println!("  consumer read: {:?}", graph.take_result(consumer).unwrap());
    println!("  ✓ Sequential chain complete\n");
}

/// Demo 2: a writer and reader running concurrently over a circular
/// buffer, the reader starting as soon as the writer does (`Mode::Par`).
fn demo_parallel_pipeline() {
    println!("--- Demo 2: Parallel Pipeline (Circular Buffer) ---");

    let mut graph: Graph<Vec<u64>> = Graph::with_default_config();
    let writer = graph.make_node(|ctx| {
        for v in 1u64..=1000 {
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
            received.push(u64::from_le_bytes(buf));
        }
        received
    });

    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(4096)).unwrap();
    graph.link(writer, reader, Mode::Par);
    graph.add_flow(writer, 0, reader, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    let received = graph.take_result(reader).unwrap();
    println!("  reader received {} values, last = {:?}", received.len(), received.last());
    println!("  ✓ Parallel pipeline complete\n");
}

/// Demo 3: two readers bound to the same circular buffer before start,
/// each independently draining the full stream.
fn demo_multi_reader_fan_out() {
    println!("--- Demo 3: Multi-Reader Fan-Out ---");

    let mut graph: Graph<usize> = Graph::with_default_config();
    let writer = graph.make_node(|ctx| {
        let chunk = [b'x'; 32];
        for _ in 0..200 {
            ctx.write(0, &chunk);
        }
        0
    });
    let drain = |ctx: straph::NodeContext<usize>| {
        let mut total = 0;
        let mut buf = [0u8; 128];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    };
    let reader_a = graph.make_node(drain);
    let reader_b = graph.make_node(drain);

    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(1024)).unwrap();
    graph.link(writer, reader_a, Mode::Par);
    graph.link(writer, reader_b, Mode::Par);
    graph.add_flow(writer, 0, reader_a, 0).unwrap();
    graph.add_flow(writer, 0, reader_b, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    println!("  reader A total: {}", graph.take_result(reader_a).unwrap());
    println!("  reader B total: {}", graph.take_result(reader_b).unwrap());
    println!("  ✓ Multi-reader fan-out complete\n");
}

/// Demo 4: a small circular buffer forces the writer to block on a slow
/// reader, visible via the diagnostic metrics preset.
fn demo_backpressure() {
    println!("--- Demo 4: Backpressure ---");

    let mut graph: Graph<usize> = Graph::new(Config::DIAGNOSTIC);
    let writer = graph.make_node(|ctx| {
        let payload = vec![b'y'; 20_000];
        let mut done = 0;
        while done < payload.len() {
            let take = (payload.len() - done).min(256);
            ctx.write(0, &payload[done..done + take]);
            done += take;
        }
        done
    });
    let reader = graph.make_node(|ctx| {
        let mut total = 0;
        let mut buf = [0u8; 128];
        loop {
            let n = ctx.read(0, &mut buf);
            if n == 0 {
                break;
            }
            total += n;
            std::thread::sleep(Duration::from_micros(20));
        }
        total
    });

    graph.add_entry(writer);
    graph.set_buffer(writer, 0, SlotBuffer::Circular(128)).unwrap();
    graph.link(writer, reader, Mode::Par);
    graph.add_flow(writer, 0, reader, 0).unwrap();

    graph.start().unwrap();
    graph.join().unwrap();

    let snapshot = graph.metrics();
    println!(
        "  wrote {}, read {}, writer blocked {} times",
        graph.take_result(writer).unwrap(),
        graph.take_result(reader).unwrap(),
        snapshot.writer_blocked
    );
    println!("  ✓ Backpressure demo complete\n");
}

/// Demo 5: a node with two parents activates exactly once, after both
/// have terminated.
fn demo_multi_parent_rendezvous() {
    println!("--- Demo 5: Multi-Parent Rendezvous ---");

    let mut graph: Graph<&'static str> = Graph::with_default_config();
    let left = graph.make_node(|_ctx| "left");
    let right = graph.make_node(|_ctx| "right");
    let join_node = graph.make_node(|_ctx| "joined");

    graph.add_entry(left);
    graph.add_entry(right);
    graph.link(left, join_node, Mode::Seq);
    graph.link(right, join_node, Mode::Seq);

    graph.start().unwrap();
    graph.join().unwrap();

    println!(
        "  left={:?} right={:?} join={:?}",
        graph.take_result(left),
        graph.take_result(right),
        graph.take_result(join_node),
    );
    println!("  ✓ Multi-parent rendezvous complete\n");
}

/// Demo 6: the same graph started, joined, and replayed a second time.
fn demo_rewind_and_replay() {
    println!("--- Demo 6: Rewind and Replay ---");

    let mut graph: Graph<u8> = Graph::with_default_config();
    let producer = graph.make_node(|ctx| {
        ctx.write(0, b"R");
        0
    });
    let consumer = graph.make_node(|ctx| {
        let mut buf = [0u8; 1];
        let n = ctx.read(0, &mut buf);
        if n == 1 {
            buf[0]
        } else {
            0
        }
    });
    graph.add_entry(producer);
    graph.set_buffer(producer, 0, SlotBuffer::Linear(1)).unwrap();
    graph.link(producer, consumer, Mode::Seq);
    graph.add_flow(producer, 0, consumer, 0).unwrap();

    for round in 1..=2 {
        graph.start().unwrap();
        graph.join().unwrap();
        println!("  round {round}: consumer read {:?}", graph.take_result(consumer));
    }
    println!("  ✓ Rewind and replay complete\n");
}

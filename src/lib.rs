//! `straph`: a library for executing user-defined computations as a
//! directed graph of concurrent nodes connected by typed edges.
//!
//! Two kinds of edges coexist: **execution edges**, which sequence node
//! activation in *parallel* or *sequential* mode, and **I/O edges**,
//! which route a byte stream from one node's output slot to another's
//! input slot through a shared [linear](buffer::linear) or
//! [circular](buffer::circular) buffer.
//!
//! The entry points a caller needs are [`Graph`] (build a DAG of nodes,
//! then [`Graph::start`]/[`Graph::join`]/[`Graph::rewind`]/
//! [`Graph::destroy`] it) and [`NodeContext`], handed to each node's
//! routine for reading and writing its own slots.
//!
//! ```
//! use straph::{Config, Graph, Mode, SlotBuffer};
//!
//! let mut graph: Graph<()> = Graph::new(Config::default());
//! let producer = graph.make_node(|ctx| {
//!     ctx.write(0, b"hello");
//! });
//! let consumer = graph.make_node(|ctx| {
//!     let mut buf = [0u8; 5];
//!     let n = ctx.read(0, &mut buf);
//!     assert_eq!(&buf[..n], b"hello");
//! });
//! graph.add_entry(producer);
//! graph.set_buffer(producer, 0, SlotBuffer::Linear(5)).unwrap();
//! graph.link(producer, consumer, Mode::Seq);
//! graph.add_flow(producer, 0, consumer, 0).unwrap();
//!
//! graph.start().unwrap();
//! graph.join().unwrap();
//! ```

pub(crate) mod buffer;
pub mod config;
pub mod error;
pub mod graph;
pub(crate) mod invariants;
pub mod metrics;
pub(crate) mod node;
pub(crate) mod scheduler;
pub(crate) mod slot;
pub(crate) mod worklist;

pub use buffer::BufferStatus;
pub use config::Config;
pub use error::{Result, StraphError};
pub use graph::{Graph, SlotBuffer};
pub use metrics::MetricsSnapshot;
pub use node::{Mode, NodeContext, NodeId, NodeStatus};

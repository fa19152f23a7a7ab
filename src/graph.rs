//! The graph ("straph") and its public assembly API (component G,
//! `SPEC_FULL.md` §3 "Graph" and §6 "Public assembly API").
//!
//! Grounded on `include/straph.h`'s `struct s_straph` (an entry-node
//! list) and `original_source/src/straph.c`'s `new_straph`/
//! `add_start_node`; the "thin owning handle over an `Arc<Inner>`" shape
//! follows `crates/ringmpsc/src/channel.rs::Channel`, adapted to a
//! single-owner graph (no per-call `Arc` cloning needed at the public
//! surface — only the scheduler's worker threads need their own
//! `Arc<GraphInner<R>>` clone, since they must outlive the call that
//! spawned them).

use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::{BufferStatus, CircularBuffer, LinearBuffer, OutputBuffer};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::node::{Mode, Node, NodeContext, NodeId, NodeStatus, Routine};
use crate::scheduler;

/// What to install at an output slot: `SPEC_FULL.md` §6 "set buffer".
#[derive(Debug, Clone, Copy)]
pub enum SlotBuffer {
    /// Clears the slot.
    None,
    /// A bounded, no-wraparound byte stream of the given capacity.
    Linear(usize),
    /// A bounded-space, unbounded-in-time chunk-framed byte stream of the
    /// given capacity.
    Circular(usize),
}

/// The arena and shared configuration every node and buffer in one run
/// belongs to. Held behind an `Arc` so worker threads (each given their
/// own clone by the scheduler) can reach sibling nodes' slots without
/// the graph itself needing to be `'static` or the caller needing to
/// keep it alive past a `start()` call that hasn't yet returned.
pub(crate) struct GraphInner<R> {
    nodes: Vec<Node<R>>,
    entries: Mutex<Vec<NodeId>>,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
}

impl<R> GraphInner<R> {
    pub(crate) fn node(&self, id: NodeId) -> &Node<R> {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn entries(&self) -> Vec<NodeId> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A directed graph of concurrent nodes connected by execution and I/O
/// edges — `SPEC_FULL.md`'s "straph". `R` is the return type every
/// node's routine produces.
///
/// A `Graph` owns every node it contains in one arena; nodes are
/// referenced by the opaque [`NodeId`] returned from [`Graph::make_node`].
pub struct Graph<R> {
    inner: Arc<GraphInner<R>>,
}

impl<R: Send + 'static> Graph<R> {
    /// Creates a new, empty graph under `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                nodes: Vec::new(),
                entries: Mutex::new(Vec::new()),
                config,
                metrics: Arc::new(Metrics::new(config.enable_metrics)),
            }),
        }
    }

    /// Creates a new, empty graph under [`Config::default`].
    #[must_use]
    pub fn with_default_config() -> Self {
        Self::new(Config::default())
    }

    fn inner_mut(&mut self) -> &mut GraphInner<R> {
        Arc::get_mut(&mut self.inner).expect(
            "Graph assembly methods require exclusive access; they must not be called \
             while a worker thread holds a clone of the graph (i.e. between start() and join())",
        )
    }

    /// Creates an inactive node wrapping `routine` and adds it to the
    /// graph's arena. The node is *not* an entry until added via
    /// [`Graph::add_entry`]. `routine` is `FnMut` rather than `FnOnce` so
    /// it survives a [`Graph::rewind`] and runs again on replay.
    pub fn make_node(&mut self, routine: impl FnMut(NodeContext<R>) -> R + Send + 'static) -> NodeId {
        let id = NodeId(self.inner.nodes.len());
        let boxed: Routine<R> = Box::new(routine);
        self.inner_mut().nodes.push(Node::new(id, boxed));
        id
    }

    /// Marks `node` as a graph entry: `SPEC_FULL.md` §6 "add node to
    /// graph" — the scheduler seeds its initial worklist from entries.
    pub fn add_entry(&self, node: NodeId) {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    /// Installs, replaces, or clears the output buffer at `node`'s
    /// `slot` (`SPEC_FULL.md` §6 "set buffer"). Only legal while `node`
    /// is `Inactive`.
    pub fn set_buffer(&self, node: NodeId, slot: usize, spec: SlotBuffer) -> Result<()> {
        let buffer = match spec {
            SlotBuffer::None => None,
            SlotBuffer::Linear(0) | SlotBuffer::Circular(0) => None,
            SlotBuffer::Linear(cap) => Some(OutputBuffer::Linear(LinearBuffer::new(cap))),
            SlotBuffer::Circular(cap) => Some(OutputBuffer::Circular(CircularBuffer::new(
                cap,
                self.inner.config.chunk_payload_limit,
                Arc::clone(&self.inner.metrics),
            ))),
        };
        self.inner.node(node).set_output_buffer(slot, buffer)
    }

    /// Adds an execution edge `a -> b` with the given propagation mode,
    /// incrementing `b`'s `parents` count (`SPEC_FULL.md` §6 "link").
    pub fn link(&self, a: NodeId, b: NodeId, mode: Mode) {
        self.inner.node(a).link_neighbor(b, mode);
        self.inner.node(b).incr_parents();
    }

    /// Binds `b`'s input `in_slot` to `a`'s output `out_slot`
    /// (`SPEC_FULL.md` §6 "add flow"): increments the writer's reader
    /// count, decrementing whatever `in_slot` was previously bound to,
    /// if anything.
    pub fn add_flow(&self, a: NodeId, out_slot: usize, b: NodeId, in_slot: usize) -> Result<()> {
        let output = self.inner.node(a).output_buffer(out_slot)?;
        let previous = self.inner.node(b).bind_input(in_slot, Arc::clone(&output))?;
        if let Some(previous) = previous {
            previous.decr_readers();
        }
        output.incr_readers();
        Ok(())
    }

    /// Reads up to `buf.len()` bytes from `node`'s input `slot`
    /// (`SPEC_FULL.md` §4.E). Returns `0` for an unbound or out-of-range
    /// slot, exactly like a read issued from inside the node's own
    /// routine via [`NodeContext::read`].
    pub fn read(&self, node: NodeId, slot: usize, buf: &mut [u8]) -> usize {
        let n = self.inner.node(node).read(slot, buf, self.inner.config.reader_cache_size);
        self.inner.metrics.bytes_read(n as u64);
        n
    }

    /// Writes `buf` to `node`'s output `slot`. Writing to an unbound slot
    /// reports `buf.len()` as if successful.
    pub fn write(&self, node: NodeId, slot: usize, buf: &[u8]) -> usize {
        let n = self.inner.node(node).write(slot, buf);
        self.inner.metrics.bytes_written(n as u64);
        n
    }

    /// Sets `node`'s output `slot` buffer status directly. Rarely needed
    /// outside tests: bring-up/bring-down/rewind already drive this
    /// transition as part of the node lifecycle.
    pub fn set_buffer_status(&self, node: NodeId, slot: usize, status: BufferStatus) -> Result<()> {
        self.inner.node(node).set_buffer_status(slot, status)
    }

    /// The lifecycle status of `node`.
    #[must_use]
    pub fn status(&self, node: NodeId) -> NodeStatus {
        self.inner.node(node).status()
    }

    /// Takes `node`'s captured return value. Valid only after
    /// [`Graph::join`] has visited `node`; `None` before that, or if the
    /// graph has since been rewound.
    pub fn take_result(&self, node: NodeId) -> Option<R> {
        self.inner.node(node).take_result()
    }

    /// Starts the graph: enqueues every entry and runs the activation
    /// scheduler (`SPEC_FULL.md` §4.F "Start"). Precondition: every node
    /// is `Inactive`; the scheduler is not re-entrant on the same graph.
    pub fn start(&self) -> Result<()> {
        scheduler::start(&self.inner)
    }

    /// Blocks until every node reachable from an entry has terminated
    /// and its thread has been joined, then rewinds the graph
    /// (`SPEC_FULL.md` §4.F "Join").
    pub fn join(&self) -> Result<()> {
        scheduler::join(&self.inner)
    }

    /// Resets every reachable node to `Inactive` and every owned output
    /// buffer to `Ready` without joining threads (`SPEC_FULL.md` §4.F
    /// "Rewind"). Normally called automatically by `join`; exposed for
    /// callers that manage thread lifetimes themselves.
    pub fn rewind(&self) {
        scheduler::rewind(&self.inner);
    }

    /// Tears the graph down, marking every reachable node `Doomed`
    /// (`SPEC_FULL.md` §4.F "Destroy"). Consumes the graph: in safe Rust
    /// this is just `Drop`, but the explicit call performs the
    /// cycle-safe reachability walk described in §9 before that drop
    /// runs, satisfying testable property 7 even for a graph with a
    /// directed cycle among its nodes.
    pub fn destroy(self) {
        scheduler::destroy(&self.inner);
    }

    /// A point-in-time snapshot of this graph's metrics, if
    /// [`Config::enable_metrics`] was set; otherwise every counter reads
    /// zero.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

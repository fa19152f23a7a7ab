//! Node lifecycle, topology, and slot storage (component E,
//! `SPEC_FULL.md` §4.E).
//!
//! Grounded on `struct s_node`/`struct neighbour` in `straph.h` for the
//! shape (status, parents/start_requests, neighbor list, sparse output
//! and input slot vectors, worker handle, return value, rendezvous
//! lock), reworked around [`crate::slot::InputBinding`]'s sum type and
//! an `Arc<GraphInner<R>>`-handle style borrowed from `Channel<T>`.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::buffer::{BufferStatus, Output, OutputBuffer};
use crate::error::{Result, StraphError};
use crate::slot::InputBinding;

/// Index of a node within its owning graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Execution-edge mode: whether a downstream node may start concurrently
/// with its upstream, or must wait for it to terminate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Downstream may activate as soon as this edge's rendezvous count
    /// is satisfied, without waiting for the upstream node to finish.
    Par,
    /// Downstream is only enqueued after the upstream node's routine has
    /// returned and bring-down has completed.
    Seq,
}

/// A node's position in its lifecycle (`SPEC_FULL.md` §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Inactive,
    Active,
    Terminated,
    Joined,
    /// Marked by `destroy` so a cyclic neighbor walk cannot free a node
    /// twice.
    Doomed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Neighbor {
    pub(crate) target: NodeId,
    pub(crate) mode: Mode,
}

struct Rendezvous {
    status: NodeStatus,
    parents: usize,
    start_requests: usize,
}

/// What `try_start` learned about a node when it was visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    /// Rendezvous satisfied; the node was just brought up.
    Started,
    /// Not an error: the node is already `Active` (sequential re-walk
    /// hitting an already-started node).
    AlreadyActive,
    /// Rendezvous not yet satisfied; more parents still to arrive.
    NotReady,
}

/// A user computation bound to one node: given a handle for reading and
/// writing its own slots, produces a value of `R`. `FnMut` rather than
/// `FnOnce` so the same routine survives a rewind and runs again on
/// replay (`SPEC_FULL.md` §8 property 6, scenario S6) instead of being
/// consumed by its first activation.
pub(crate) type Routine<R> = Box<dyn FnMut(NodeContext<R>) -> R + Send>;

/// Passed into a running node's routine. A thin, `Clone`-free handle:
/// just enough to reach this node's own slots.
pub struct NodeContext<R> {
    graph: Arc<crate::graph::GraphInner<R>>,
    node: NodeId,
}

impl<R> NodeContext<R> {
    pub(crate) fn new(graph: Arc<crate::graph::GraphInner<R>>, node: NodeId) -> Self {
        Self { graph, node }
    }

    /// Reads from this node's own input slot `slot`. Dispatches to
    /// [`crate::buffer::linear::LinearBuffer::read`] or
    /// [`crate::buffer::circular::CircularBuffer::next_chunk`] depending
    /// on what the slot is bound to; returns `0` for an unbound or
    /// out-of-range slot.
    pub fn read(&self, slot: usize, buf: &mut [u8]) -> usize {
        let n = self.graph.node(self.node).read(slot, buf, self.graph.config.reader_cache_size);
        self.graph.metrics.bytes_read(n as u64);
        n
    }

    /// Writes to this node's own output slot `slot`. Writing to an
    /// unbound slot reports `buf.len()` as if successful — the
    /// "`/dev/null`" policy from `SPEC_FULL.md` §4.E.
    pub fn write(&self, slot: usize, buf: &[u8]) -> usize {
        let n = self.graph.node(self.node).write(slot, buf);
        self.graph.metrics.bytes_written(n as u64);
        n
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }
}

pub(crate) struct Node<R> {
    id: NodeId,
    rendezvous: Mutex<Rendezvous>,
    neighbors: Mutex<Vec<Neighbor>>,
    outputs: Mutex<Vec<Option<Arc<Output>>>>,
    inputs: Mutex<Vec<InputBinding>>,
    routine: Mutex<Routine<R>>,
    worker: Mutex<Option<JoinHandle<R>>>,
    result: Mutex<Option<R>>,
}

impl<R> Node<R> {
    pub(crate) fn new(id: NodeId, routine: Routine<R>) -> Self {
        Self {
            id,
            rendezvous: Mutex::new(Rendezvous {
                status: NodeStatus::Inactive,
                parents: 0,
                start_requests: 0,
            }),
            neighbors: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
            routine: Mutex::new(routine),
            worker: Mutex::new(None),
            result: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn status(&self) -> NodeStatus {
        self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    // -- assembly: executed only before/between runs ---------------------

    /// Installs (or replaces, or clears) the output buffer at `slot`.
    /// Only legal while the node is `Inactive`.
    pub(crate) fn set_output_buffer(&self, slot: usize, buffer: Option<OutputBuffer>) -> Result<()> {
        let rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        if rendezvous.status != NodeStatus::Inactive {
            return Err(StraphError::InvalidArgument(format!(
                "cannot reconfigure output slot {slot} while node is not Inactive"
            )));
        }
        drop(rendezvous);

        let mut outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        if slot >= outputs.len() {
            let additional = slot + 1 - outputs.len();
            outputs.try_reserve(additional)?;
            outputs.resize_with(slot + 1, || None);
        }
        outputs[slot] = buffer.map(|buffer| Arc::new(Output::new(buffer)));
        Ok(())
    }

    pub(crate) fn output_buffer(&self, slot: usize) -> Result<Arc<Output>> {
        let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        outputs
            .get(slot)
            .and_then(|s| s.as_ref())
            .map(Arc::clone)
            .ok_or_else(|| StraphError::NotFound(format!("output slot {slot} is not configured")))
    }

    /// Binds input `slot` to `output`, only while the node is `Inactive`
    /// (`SPEC_FULL.md` §6 "add flow"). Returns whichever `Output` the
    /// slot was previously bound to, if any, so the caller can decrement
    /// its reader count — the reader-count bookkeeping lives on `Output`
    /// itself rather than on the node that happens to own it, which is
    /// what lets this work without knowing who that prior owner was.
    pub(crate) fn bind_input(&self, slot: usize, output: Arc<Output>) -> Result<Option<Arc<Output>>> {
        let rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        if rendezvous.status != NodeStatus::Inactive {
            return Err(StraphError::InvalidArgument(format!(
                "cannot rebind input slot {slot} while node is not Inactive"
            )));
        }
        drop(rendezvous);

        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        if slot >= inputs.len() {
            let additional = slot + 1 - inputs.len();
            inputs.try_reserve(additional)?;
            inputs.resize_with(slot + 1, || InputBinding::Unbound);
        }
        Ok(inputs[slot].bind(output))
    }

    pub(crate) fn link_neighbor(&self, target: NodeId, mode: Mode) {
        self.neighbors.lock().unwrap_or_else(PoisonError::into_inner).push(Neighbor { target, mode });
    }

    pub(crate) fn neighbors(&self) -> Vec<Neighbor> {
        self.neighbors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn incr_parents(&self) {
        self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner).parents += 1;
    }

    pub(crate) fn parents(&self) -> usize {
        self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner).parents
    }

    // -- run-time: read/write/status -------------------------------------

    pub(crate) fn read(&self, slot: usize, buf: &mut [u8], reader_cache_size: usize) -> usize {
        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        match inputs.get_mut(slot) {
            Some(binding) => binding.read(buf, reader_cache_size),
            None => 0,
        }
    }

    pub(crate) fn write(&self, slot: usize, buf: &[u8]) -> usize {
        let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        match outputs.get(slot).and_then(|s| s.as_ref()) {
            Some(out) => out.write(buf),
            None => buf.len(),
        }
    }

    pub(crate) fn set_buffer_status(&self, slot: usize, status: BufferStatus) -> Result<()> {
        let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        let out = outputs
            .get(slot)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| StraphError::NotFound(format!("output slot {slot} is not configured")))?;
        out.set_status(status);
        Ok(())
    }

    // -- scheduler-internal: rendezvous, bring-up/down, join, rewind -----

    /// Rendezvous processing for one arrival: `SPEC_FULL.md` §4.F
    /// "try-start". Called by the scheduler with the node's own
    /// rendezvous lock engaged for the whole decision.
    pub(crate) fn register_arrival(&self) -> StartOutcome {
        let mut rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        if rendezvous.status != NodeStatus::Inactive {
            return StartOutcome::AlreadyActive;
        }
        rendezvous.start_requests += 1;
        crate::invariants::debug_assert_start_requests_bounded!(rendezvous.start_requests, rendezvous.parents);
        if rendezvous.start_requests < rendezvous.parents {
            StartOutcome::NotReady
        } else {
            rendezvous.status = NodeStatus::Active;
            StartOutcome::Started
        }
    }

    pub(crate) fn activate_outputs(&self) {
        let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in outputs.iter().flatten() {
            slot.activate();
        }
    }

    pub(crate) fn activate_inputs(&self, reader_cache_size: usize) {
        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        for binding in inputs.iter_mut() {
            binding.ensure_cursor(reader_cache_size);
        }
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<R>) {
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Rolls a failed bring-up back to `Inactive` (no thread was ever
    /// spawned).
    pub(crate) fn rollback_bring_up(&self) {
        let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
        for binding in inputs.iter_mut() {
            binding.deactivate();
        }
        drop(inputs);
        let mut rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        rendezvous.status = NodeStatus::Inactive;
        rendezvous.start_requests = 0;
    }

    /// Bring-down at routine return: §4.F thread-wrapper step 2.
    pub(crate) fn bring_down(&self) {
        {
            let mut rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
            rendezvous.status = NodeStatus::Terminated;
        }
        {
            let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
            for binding in inputs.iter_mut() {
                binding.deactivate();
            }
        }
        {
            let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in outputs.iter().flatten() {
                slot.set_status(BufferStatus::Inactive);
            }
        }
    }

    pub(crate) fn store_result(&self, value: R) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub(crate) fn take_result(&self) -> Option<R> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Joins the worker thread if one was spawned, propagating a panic
    /// as [`StraphError::Synchronization`].
    pub(crate) fn join(&self) -> Result<()> {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(value) => self.store_result(value),
                Err(payload) => return Err(StraphError::worker_panicked(payload.as_ref())),
            }
        }
        self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner).status = NodeStatus::Joined;
        Ok(())
    }

    pub(crate) fn rewind(&self) {
        let mut rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        rendezvous.status = NodeStatus::Inactive;
        rendezvous.start_requests = 0;
        drop(rendezvous);
        let outputs = self.outputs.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in outputs.iter().flatten() {
            slot.set_status(BufferStatus::Ready);
        }
    }

    pub(crate) fn mark_doomed_if_not_already(&self) -> bool {
        let mut rendezvous = self.rendezvous.lock().unwrap_or_else(PoisonError::into_inner);
        if rendezvous.status == NodeStatus::Doomed {
            false
        } else {
            rendezvous.status = NodeStatus::Doomed;
            true
        }
    }

    /// Invokes the node's routine with `ctx`, holding the routine lock
    /// for the duration of the call. Exactly one invocation is ever in
    /// flight per node (bring-up only spawns the worker thread after the
    /// rendezvous is satisfied, and a node cannot re-activate before it
    /// is rewound), so this never contends.
    pub(crate) fn run_routine(&self, ctx: NodeContext<R>) -> R {
        let mut routine = self.routine.lock().unwrap_or_else(PoisonError::into_inner);
        (routine)(ctx)
    }
}

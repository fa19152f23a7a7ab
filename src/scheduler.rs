//! Activation scheduler: starter, thread-wrapper, join, rewind, destroy
//! (component F, `SPEC_FULL.md` §4.F).
//!
//! Grounded on `original_source/src/straph.c` (`launch_node`,
//! `launch_straph`, `join_straph`, `straph_destroy`, `routine_wrapper`)
//! for control flow, generalized per `SPEC_FULL.md` §4.F: the original
//! source has no sequential re-walk from the thread-wrapper, so that
//! part follows the spec rather than the C revision it was distilled
//! from. Style follows the teacher's direct-block approach to waiting
//! (`crates/ringmpsc/src/channel.rs`'s `join`-like operations never
//! spin; a scheduler join only ever waits on a `thread::JoinHandle`,
//! which is itself a blocking OS primitive, so there is nothing to
//! back off from).

use std::sync::Arc;

use crate::error::Result;
use crate::graph::GraphInner;
use crate::node::{Mode, NodeContext, NodeId, NodeStatus, StartOutcome};
use crate::worklist::Worklist;

/// Where a walk entered a node from, distinguishing the two starter
/// entry points `SPEC_FULL.md` §4.F calls out: the initial `start` walk
/// (where "already Active" can only be a caller error) and sequential
/// re-walk from a thread-wrapper (where it is an expected, harmless
/// race between two upstream terminations both trying to wake the same
/// downstream join-node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkKind {
    Start,
    SequentialPropagation,
}

/// Runs the starter algorithm over `worklist`, bringing up every node
/// whose rendezvous becomes satisfied and enqueuing its parallel
/// neighbors. Returns as soon as the worklist drains; an error aborts
/// the walk without leaking further enqueues (`SPEC_FULL.md` §4.F step
/// 4: "unwind ... do not leak partially enqueued work").
fn run_starter<R: Send + 'static>(
    graph: &Arc<GraphInner<R>>,
    mut worklist: Worklist<NodeId>,
    kind: WalkKind,
) -> Result<()> {
    while let Some(id) = worklist.pop_front() {
        match try_start(graph, id, kind)? {
            StartOutcome::Started => {
                let node = graph.node(id);
                for neighbor in node.neighbors() {
                    if neighbor.mode == Mode::Par {
                        worklist.push_back(neighbor.target);
                    }
                }
            }
            StartOutcome::AlreadyActive | StartOutcome::NotReady => {}
        }
    }
    Ok(())
}

/// Rendezvous decision plus bring-up for one node (`SPEC_FULL.md` §4.F
/// "Starter algorithm" steps 2a-2d and "Bring-up").
fn try_start<R: Send + 'static>(
    graph: &Arc<GraphInner<R>>,
    id: NodeId,
    kind: WalkKind,
) -> Result<StartOutcome> {
    let node = graph.node(id);
    let outcome = node.register_arrival();

    match outcome {
        StartOutcome::AlreadyActive => {
            debug_assert!(
                kind == WalkKind::SequentialPropagation || kind == WalkKind::Start,
                "every walk kind tolerates AlreadyActive at the worklist level; callers must not treat it as an error"
            );
            tracing::trace!(node = id.index(), "skip: already active");
            Ok(StartOutcome::AlreadyActive)
        }
        StartOutcome::NotReady => {
            tracing::trace!(node = id.index(), "rendezvous not yet satisfied");
            Ok(StartOutcome::NotReady)
        }
        StartOutcome::Started => match bring_up(graph, id) {
            Ok(()) => {
                tracing::debug!(node = id.index(), "node activated");
                graph.metrics.node_started();
                Ok(StartOutcome::Started)
            }
            Err(err) => {
                node.rollback_bring_up();
                tracing::warn!(node = id.index(), error = %err, "bring-up failed, rolled back to Inactive");
                Err(err)
            }
        },
    }
}

/// Activates a node: allocates input cursors, marks output buffers
/// Active, flips status, spawns the worker thread.
fn bring_up<R: Send + 'static>(graph: &Arc<GraphInner<R>>, id: NodeId) -> Result<()> {
    let node = graph.node(id);
    node.activate_inputs(graph.config.reader_cache_size);
    node.activate_outputs();

    let thread_graph = Arc::clone(graph);
    let handle = std::thread::Builder::new()
        .name(format!("straph-node-{}", id.index()))
        .spawn(move || thread_wrapper(thread_graph, id))
        .map_err(|err| crate::error::StraphError::thread_spawn(&err))?;

    node.set_worker(handle);
    Ok(())
}

/// Worker thread entry (`SPEC_FULL.md` §4.F "Thread-wrapper"): run the
/// user routine, bring the node down, then re-walk sequential
/// neighbors from this same thread.
fn thread_wrapper<R: Send + 'static>(graph: Arc<GraphInner<R>>, id: NodeId) -> R {
    let ctx = NodeContext::new(Arc::clone(&graph), id);
    let value = graph.node(id).run_routine(ctx);

    let node = graph.node(id);
    node.bring_down();
    graph.metrics.node_terminated();
    tracing::debug!(node = id.index(), "node terminated");

    let sequential_targets: Vec<NodeId> = node
        .neighbors()
        .into_iter()
        .filter(|n| n.mode == Mode::Seq)
        .map(|n| n.target)
        .collect();

    if !sequential_targets.is_empty() {
        let worklist = Worklist::seeded(sequential_targets);
        if let Err(err) = run_starter(&graph, worklist, WalkKind::SequentialPropagation) {
            tracing::error!(node = id.index(), error = %err, "sequential propagation failed after node termination");
        }
    }

    value
}

/// Graph-level `start`: enqueue every entry and run the starter.
/// Precondition: every node in the graph is `Inactive` (not checked
/// defensively here beyond what rendezvous registration already
/// guards — `SPEC_FULL.md` §4.F "Start": "the scheduler is not
/// re-entrant on the same graph").
pub(crate) fn start<R: Send + 'static>(graph: &Arc<GraphInner<R>>) -> Result<()> {
    let worklist = Worklist::seeded(graph.entries());
    run_starter(graph, worklist, WalkKind::Start)
}

/// BFS over every node reachable from the graph's entries, following
/// all neighbors regardless of mode, visiting each node exactly once.
fn reachable<R>(graph: &Arc<GraphInner<R>>) -> Vec<NodeId> {
    let mut seen = vec![false; graph.node_count()];
    let mut order = Vec::new();
    let mut worklist = Worklist::seeded(graph.entries());
    while let Some(id) = worklist.pop_front() {
        if seen[id.index()] {
            continue;
        }
        seen[id.index()] = true;
        order.push(id);
        for neighbor in graph.node(id).neighbors() {
            if !seen[neighbor.target.index()] {
                worklist.push_back(neighbor.target);
            }
        }
    }
    order
}

/// `SPEC_FULL.md` §4.F "Join": blocks on every reachable node's worker
/// thread, stores its return value, marks it `Joined`, then performs a
/// full `Rewind`.
pub(crate) fn join<R: Send + 'static>(graph: &Arc<GraphInner<R>>) -> Result<()> {
    for id in reachable(graph) {
        graph.node(id).join()?;
        graph.metrics.node_joined();
        tracing::debug!(node = id.index(), "node joined");
    }
    rewind(graph);
    Ok(())
}

/// `SPEC_FULL.md` §4.F "Rewind": every reachable node back to
/// `Inactive`, every owned output buffer back to `Ready`,
/// `start_requests` reset to zero. A rewound graph may be started
/// again.
pub(crate) fn rewind<R>(graph: &Arc<GraphInner<R>>) {
    for id in reachable(graph) {
        graph.node(id).rewind();
    }
    tracing::debug!("graph rewound");
}

/// `SPEC_FULL.md` §4.F "Destroy": two-pass mark-then-free so a directed
/// cycle among nodes cannot cause a double free. In safe Rust the
/// second pass reduces to ordinary `Drop`, since `GraphInner`'s arena
/// already owns every node's state exactly once; the mark pass still
/// matters because it computes the reachable set rather than
/// accidentally keeping nodes the graph's entries can't reach.
pub(crate) fn destroy<R>(graph: &Arc<GraphInner<R>>) {
    let mut seen = vec![false; graph.node_count()];
    let mut to_free = Vec::new();
    let mut worklist = Worklist::seeded(graph.entries());
    while let Some(id) = worklist.pop_front() {
        if seen[id.index()] {
            continue;
        }
        seen[id.index()] = true;
        let node = graph.node(id);
        for neighbor in node.neighbors() {
            worklist.push_back(neighbor.target);
        }
        if node.mark_doomed_if_not_already() {
            to_free.push(id);
        }
    }
    tracing::debug!(freed = to_free.len(), "graph destroyed");
    // Pass 2 is a no-op beyond the marking above: each node's owned
    // state (buffers, slots, neighbor list, worker handle) is dropped
    // when `GraphInner`'s arena itself drops. The mark pass exists
    // purely to make destroy idempotent and cycle-safe, matching
    // `SPEC_FULL.md` §8 property 7.
}

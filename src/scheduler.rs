//! The batched pull-through evaluator.
//!
//! A [`Session`] pins down everything mutable about one evaluation run: the
//! topologically ordered ancestor set of the requested nodes, one state box
//! per node, the high-water mark of evaluated time, and the collected output
//! blocks of the requested nodes. The graph itself stays immutable and
//! shared; two sessions over the same nodes never touch each other.
//!
//! Each call to [`Session::evaluate_until`] processes one batch: fresh
//! per-edge input slots are allocated, nodes run in topological order, and
//! every node's output block is handed to exactly the slots of its children
//! (plus the output list, if the node was requested). An intermediate block
//! dies as soon as the last child of its producer has consumed it within
//! the batch.
//!
//! Operator invocations see batches in strictly non-decreasing time order,
//! and batch consistency of every kernel makes `evaluate_until(a);
//! evaluate_until(b)` indistinguishable from `evaluate_until(b)` — which is
//! all the one-shot driver [`evaluate_nodes`] does in a loop.
//!
//! When an operator fails, the batch is abandoned and the session is
//! poisoned: the engine cannot know how much per-node state the failed
//! batch already advanced, so the only safe continuation is a fresh session
//! replayed from the original start time.

use crate::block::{Block, ErasedBlock, KnotValue};
use crate::error::{Error, Result};
use crate::graph::topo_order;
use crate::node::{NodeRef, node_addr};
use crate::series::Series;
use crate::state::NodeState;
use crate::time::{Duration, Span, Timestamp};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// The mutable carrier of one evaluation run.
pub struct Session {
    /// Ancestors of the requested nodes, parents before children.
    nodes: Vec<NodeRef>,
    /// Node address → position in `nodes`.
    index: HashMap<usize, usize>,
    /// Per-node kernel state, parallel to `nodes`.
    states: Vec<NodeState>,
    /// For each node, the `(child position, input slot)` pairs fed by it.
    children: Vec<Vec<(usize, usize)>>,
    /// The nodes whose outputs are collected.
    requested: Vec<NodeRef>,
    /// Positions of the requested nodes in `nodes`.
    requested_pos: Vec<usize>,
    /// Output blocks per requested node, one per non-empty batch.
    outputs: Vec<Vec<ErasedBlock>>,
    /// High-water mark: everything before this time has been evaluated.
    current_time: Timestamp,
    poisoned: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("current_time", &self.current_time)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session for `requested`, ready to evaluate from `t_start`.
    pub fn start_at(requested: &[NodeRef], t_start: Timestamp) -> Session {
        let nodes = topo_order(requested);
        let index: HashMap<usize, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (node_addr(n), i))
            .collect();
        let states: Vec<NodeState> = nodes.iter().map(|n| n.op().create_state()).collect();

        let mut children: Vec<Vec<(usize, usize)>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for (slot, parent) in node.parents().iter().enumerate() {
                children[index[&node_addr(parent)]].push((i, slot));
            }
        }

        let requested: Vec<NodeRef> = requested.iter().map(Arc::clone).collect();
        let requested_pos: Vec<usize> = requested.iter().map(|n| index[&node_addr(n)]).collect();
        let outputs = vec![Vec::new(); requested.len()];

        debug!(
            "session over {} nodes ({} requested) starting at {t_start:?}",
            nodes.len(),
            requested.len()
        );

        Session {
            nodes,
            index,
            states,
            children,
            requested,
            requested_pos,
            outputs,
            current_time: t_start,
            poisoned: false,
        }
    }

    /// Evaluate the batch `[current_time, t_end)` and advance the high-water
    /// mark. An empty interval is a no-op.
    pub fn evaluate_until(&mut self, t_end: Timestamp) -> Result<()> {
        if self.poisoned {
            return Err(Error::corrupt(
                "session was poisoned by an earlier operator failure",
            ));
        }
        if t_end < self.current_time {
            return Err(Error::invalid(format!(
                "cannot evaluate backwards: current time {:?}, requested {t_end:?}",
                self.current_time
            )));
        }
        if t_end == self.current_time {
            return Ok(());
        }

        let span = Span::new(self.current_time, t_end);
        debug!("evaluating batch {span:?} over {} nodes", self.nodes.len());

        // One input slot per parent edge, refilled every batch.
        let mut slots: Vec<Vec<Option<ErasedBlock>>> = self
            .nodes
            .iter()
            .map(|n| vec![None; n.parents().len()])
            .collect();

        for i in 0..self.nodes.len() {
            let inputs: Vec<ErasedBlock> = slots[i]
                .iter_mut()
                .map(|slot| {
                    slot.take().ok_or_else(|| {
                        Error::corrupt("node ran before a parent delivered its block")
                    })
                })
                .collect::<Result<_>>()?;

            let op = Arc::clone(self.nodes[i].op());
            let out = match op.run(&mut self.states[i], span, &inputs) {
                Ok(out) => out,
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            };
            debug_assert!(
                out.times().iter().all(|&t| span.contains(t)),
                "{} emitted outside {span:?}",
                op.name()
            );

            for &(child, slot) in &self.children[i] {
                slots[child][slot] = Some(out.clone());
            }
            for (r, &pos) in self.requested_pos.iter().enumerate() {
                if pos == i && !out.is_empty() {
                    self.outputs[r].push(out.clone());
                }
            }
        }

        self.current_time = t_end;
        Ok(())
    }

    /// The collected output of a requested series, concatenated across
    /// batches.
    pub fn output<T: KnotValue>(&self, series: &Series<T>) -> Result<Block<T>> {
        self.output_node(series.node())
    }

    /// The collected output of a requested node, concatenated across
    /// batches.
    pub fn output_node<T: KnotValue>(&self, node: &NodeRef) -> Result<Block<T>> {
        let expected = crate::op::TypeTag::of::<T>();
        if node.output_type().id != expected.id {
            return Err(Error::invalid(format!(
                "node produces {} but its output was requested as {}",
                node.output_type().name,
                expected.name
            )));
        }
        let r = self
            .requested
            .iter()
            .position(|n| Arc::ptr_eq(n, node))
            .ok_or_else(|| {
                Error::MissingValue("node was not requested when the session started".into())
            })?;
        let blocks: Vec<Block<T>> = self.outputs[r]
            .iter()
            .map(|e| e.downcast::<T>().map(Block::clone))
            .collect::<Result<_>>()?;
        Block::concat(&blocks)
    }

    /// Fork the session: same immutable graph, shared blocks, deep-copied
    /// mutable state. Both copies can continue independently.
    pub fn duplicate(&self) -> Session {
        Session {
            nodes: self.nodes.clone(),
            index: self.index.clone(),
            states: self.states.clone(),
            children: self.children.clone(),
            requested: self.requested.clone(),
            requested_pos: self.requested_pos.clone(),
            outputs: self.outputs.clone(),
            current_time: self.current_time,
            poisoned: self.poisoned,
        }
    }

    /// The session's high-water mark.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Number of live nodes in this session (requested plus ancestors).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True once an operator failure has abandoned a batch; a poisoned
    /// session refuses all further evaluation.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Whether `node` is in this session's ancestor set.
    pub fn contains(&self, node: &NodeRef) -> bool {
        self.index.contains_key(&node_addr(node))
    }
}

/// One-shot evaluation of `nodes` over `[t_start, t_end)`.
///
/// Without `batch`, the whole interval is one batch. With it, the interval
/// is processed in `batch`-sized steps (the last one clamped to `t_end`),
/// which by batch consistency yields identical outputs.
pub fn evaluate_nodes(
    nodes: &[NodeRef],
    t_start: Timestamp,
    t_end: Timestamp,
    batch: Option<Duration>,
) -> Result<Session> {
    if t_end < t_start {
        return Err(Error::invalid(format!(
            "evaluation interval runs backwards: [{t_start:?}, {t_end:?})"
        )));
    }
    let mut session = Session::start_at(nodes, t_start);
    match batch {
        None => session.evaluate_until(t_end)?,
        Some(step) => {
            if step.millis() <= 0 {
                return Err(Error::invalid(format!(
                    "batch interval must be positive, got {step:?}"
                )));
            }
            let mut t = t_start;
            while t < t_end {
                t = (t + step).min(t_end);
                session.evaluate_until(t)?;
            }
        }
    }
    Ok(session)
}

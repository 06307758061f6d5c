//! Belief propagation over tree-shaped graphs.
//!
//! `solve` runs exact two-phase message passing: an upward collect pass from
//! the leaves of each component to its root, then a downward distribute pass
//! back out. Both passes walk an explicitly scheduled traversal rather than
//! recursing, and the scheduler rejects cyclic skeletons up front instead of
//! looping on them. Each edge carries exactly one message per direction, so
//! the pass count is linear in the number of edges.

use smallvec::SmallVec;

use crate::engine::errors::InferenceError;
use crate::engine::graph::{Graph, NodeId, NodeKind};
use crate::engine::table::{EvalMode, FactorTable, TableVar, Value};

/// Direction typing for a message, named after the sending side's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    VariableToVariable,
    VariableToFactor,
    FactorToVariable,
}

/// A unit of belief passed along one edge.
///
/// The payload is a distribution over the edge's separator variable.
/// Messages are transient: created fresh for each solve, never mutated, and
/// dropped once the beliefs they feed have been computed.
#[derive(Debug, Clone)]
pub struct Message {
    from: NodeId,
    to: NodeId,
    kind: MessageKind,
    table: FactorTable,
}

impl Message {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn table(&self) -> &FactorTable {
        &self.table
    }

    /// Builds the message sent from `from` toward `to`.
    ///
    /// Multiplies the sender's local potential with every message the sender
    /// has received from its other neighbors (the one heading back toward
    /// `to` is excluded to prevent immediate feedback), then marginalizes out
    /// everything except the edge's separator variable under `mode`. This is
    /// the single step of belief propagation; it is exact when the graph
    /// reachable from `from` without crossing `to` is acyclic.
    pub fn create(
        graph: &Graph,
        from: NodeId,
        to: NodeId,
        mode: EvalMode,
        inbox: &[Message],
    ) -> Result<Self, InferenceError> {
        let separator = graph.separator(from, to)?;
        let sep_node = graph.node(separator)?;
        let sep_name = sep_node.name().to_string();
        let sep_var = TableVar::new(sep_node.name(), sep_node.domain());

        let mut combined = graph.node(from)?.local_potential()?;
        for message in inbox {
            if message.from == to {
                continue;
            }
            combined = Some(match combined {
                Some(acc) => acc.multiply(&message.table)?,
                None => message.table.clone(),
            });
        }

        let table = match combined {
            Some(t) if t.position(&sep_name).is_some() => {
                t.marginalize_to(&sep_name, mode)?.normalized(&[])?
            }
            // A sender with nothing to say contributes a flat message.
            _ => FactorTable::uniform(vec![sep_var])?.normalized(&[])?,
        };

        let kind = match (graph.node(from)?.kind(), graph.node(to)?.kind()) {
            (NodeKind::Factor, _) => MessageKind::FactorToVariable,
            (NodeKind::Variable, NodeKind::Factor) => MessageKind::VariableToFactor,
            (NodeKind::Variable, NodeKind::Variable) => MessageKind::VariableToVariable,
        };
        Ok(Self {
            from,
            to,
            kind,
            table,
        })
    }
}

/// Runtime diagnostics for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveReport {
    /// Messages created across both passes (two per edge).
    pub messages_passed: usize,
    /// Connected components of the graph skeleton.
    pub components: usize,
    /// Longest root-to-leaf path encountered while scheduling.
    pub max_depth: usize,
}

impl Graph {
    /// Runs exact belief propagation and stores a belief on every node.
    ///
    /// The skeleton must be acyclic; a cycle fails the call with
    /// `CyclicDependency` before any message is passed. Observed values
    /// enter as indicator potentials at their nodes. `SumProduct` yields
    /// marginals, `MaxProduct` max-marginals for MAP read-out.
    pub fn solve(&mut self, mode: EvalMode) -> Result<SolveReport, InferenceError> {
        for id in self.node_ids() {
            if !self.node(id)?.is_defined() {
                return Err(InferenceError::Internal(format!(
                    "node '{}' must be defined before solve",
                    self.node(id)?.name()
                )));
            }
        }

        let n = self.len();
        let mut visited = vec![false; n];
        let mut preorder: Vec<NodeId> = Vec::with_capacity(n);
        let mut parent: Vec<Option<NodeId>> = vec![None; n];
        let mut depth: Vec<usize> = vec![0; n];
        let mut components = 0_usize;
        let mut max_depth = 0_usize;

        for root in self.node_ids() {
            if visited[root.0 as usize] {
                continue;
            }
            components += 1;
            let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(root, None)];
            while let Some((current, via)) = stack.pop() {
                let slot = current.0 as usize;
                if visited[slot] {
                    // A second path reached this node: the skeleton is not a
                    // tree.
                    return Err(InferenceError::CyclicDependency(
                        self.node(current)?.name().to_string(),
                    ));
                }
                visited[slot] = true;
                parent[slot] = via;
                depth[slot] = via.map_or(0, |p| depth[p.0 as usize] + 1);
                max_depth = max_depth.max(depth[slot]);
                preorder.push(current);
                for neighbor in self.neighbors(current)? {
                    if Some(neighbor) != via {
                        stack.push((neighbor, Some(current)));
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = n,
            components,
            max_depth,
            "scheduled belief propagation"
        );

        let mut inbox: Vec<Vec<Message>> = vec![Vec::new(); n];

        // Collect: leaves toward each root.
        let mut messages_passed = 0_usize;
        for &node in preorder.iter().rev() {
            if let Some(target) = parent[node.0 as usize] {
                let message = Message::create(self, node, target, mode, &inbox[node.0 as usize])?;
                inbox[target.0 as usize].push(message);
                messages_passed += 1;
            }
        }

        // Distribute: each root back toward its leaves.
        for &node in &preorder {
            let children: SmallVec<[NodeId; 4]> = self
                .neighbors(node)?
                .into_iter()
                .filter(|c| parent[c.0 as usize] == Some(node))
                .collect();
            for child in children {
                let message = Message::create(self, node, child, mode, &inbox[node.0 as usize])?;
                inbox[child.0 as usize].push(message);
                messages_passed += 1;
            }
        }

        let ids: Vec<NodeId> = self.node_ids().collect();
        let mut beliefs = Vec::with_capacity(n);
        for id in &ids {
            let incoming: Vec<&FactorTable> =
                inbox[id.0 as usize].iter().map(Message::table).collect();
            beliefs.push(self.node(*id)?.evaluate(&incoming, mode)?);
        }
        for (id, belief) in ids.into_iter().zip(beliefs) {
            self.store_belief(id, belief)?;
        }

        Ok(SolveReport {
            messages_passed,
            components,
            max_depth,
        })
    }

    /// Reads the most-probable assignment out of `MaxProduct` beliefs.
    ///
    /// Per node, the highest-scoring domain value wins; ties go to the
    /// earlier domain value. Requires a prior successful solve.
    pub fn map_assignment(&self) -> Result<Vec<(NodeId, Value)>, InferenceError> {
        let mut assignment = Vec::with_capacity(self.len());
        for id in self.node_ids() {
            let node = self.node(id)?;
            let Some(belief) = node.solved_belief() else {
                return Err(InferenceError::Internal(format!(
                    "node '{}' has no belief; run solve first",
                    node.name()
                )));
            };
            let mut best = 0_usize;
            for (idx, weight) in belief.weights().iter().enumerate() {
                if *weight > belief.weights()[best] {
                    best = idx;
                }
            }
            assignment.push((id, node.domain()[best].clone()));
        }
        Ok(assignment)
    }
}

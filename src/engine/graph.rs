//! # Discrete Bayesian Network Graph
//!
//! This module implements the node arena and structural operations of the
//! inference engine.
//!
//! ## Key Components
//!
//! - **NodeConfig**: Explicit configuration validated when a node is defined
//! - **Node**: A variable or factor vertex owning its domain and, for factor
//!   nodes, a conditional [`FactorTable`] over itself and its parents
//! - **Graph**: Insertion-ordered arena of nodes with an O(1) name index
//!
//! ## Design
//!
//! Parent relationships are stored as [`NodeId`] indexes into the owning
//! graph's arena, never as owning references, so the parent DAG cannot form
//! ownership cycles and traversal stays safe. Node structure (kind, domain,
//! parent set) is immutable once [`Graph::define`] has run; only
//! probabilities and observations change afterwards.
//!
//! ## Example
//!
//! ```rust,ignore
//! use beliefnet::engine::graph::*;
//!
//! let mut g = Graph::new();
//! let rain = g.add_node("rain", NodeConfig::factor())?;
//! let grass = g.add_node("grass", NodeConfig::factor().with_parents(&[rain]))?;
//! g.define(rain)?;
//! g.define(grass)?;
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::data::DataTable;
use crate::engine::errors::InferenceError;
use crate::engine::table::{EvalMode, FactorTable, TableVar, Value};

/// A unique identifier for a node in the graph.
///
/// NodeId implements Ord/PartialOrd for stable, deterministic iteration.
/// Uses u32 internally for efficient storage and indexing.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// Whether a node is a pure variable or carries a conditional table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Variable,
    Factor,
}

/// Recognized node options, validated by [`Graph::define`] rather than at
/// construction.
///
/// `values` defaults to the boolean domain when omitted; `kind` defaults to
/// `Variable`; `parents` defaults to none.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub values: Option<Vec<Value>>,
    pub kind: Option<NodeKind>,
    pub parents: Vec<NodeId>,
}

impl NodeConfig {
    pub fn variable() -> Self {
        Self {
            kind: Some(NodeKind::Variable),
            ..Self::default()
        }
    }

    pub fn factor() -> Self {
        Self {
            kind: Some(NodeKind::Factor),
            ..Self::default()
        }
    }

    pub fn with_values(mut self, values: &[Value]) -> Self {
        self.values = Some(values.to_vec());
        self
    }

    pub fn with_parents(mut self, parents: &[NodeId]) -> Self {
        self.parents = parents.to_vec();
        self
    }
}

/// A variable or factor vertex in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    name: Arc<str>,
    kind: NodeKind,
    domain: Arc<[Value]>,
    parents: SmallVec<[NodeId; 4]>,
    /// Conditional table over `[self, parents...]`; factor nodes only.
    table: Option<FactorTable>,
    observed: Option<Value>,
    /// Marginal computed by the most recent solve.
    belief: Option<FactorTable>,
    defined: bool,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn domain(&self) -> &[Value] {
        &self.domain
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn observed(&self) -> Option<&Value> {
        self.observed.as_ref()
    }

    pub fn table(&self) -> Option<&FactorTable> {
        self.table.as_ref()
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn domain_arc(&self) -> Arc<[Value]> {
        self.domain.clone()
    }

    pub(crate) fn set_belief(&mut self, belief: FactorTable) {
        self.belief = Some(belief);
    }

    /// The belief stored by the most recent solve, if any.
    pub fn solved_belief(&self) -> Option<&FactorTable> {
        self.belief.as_ref()
    }

    /// The node's current belief: the marginal set by the latest solve, or
    /// the raw conditional table, or a uniform prior over the domain when no
    /// inference has run yet.
    pub fn belief(&self) -> Result<FactorTable, InferenceError> {
        if let Some(belief) = &self.belief {
            return Ok(belief.clone());
        }
        if let Some(table) = &self.table {
            return Ok(table.clone());
        }
        FactorTable::uniform(vec![TableVar {
            name: self.name.clone(),
            domain: self.domain.clone(),
        }])?
        .normalized(&[])
    }

    /// Combines the node's local potential with incoming messages under the
    /// given mode and normalizes the result into a belief over this node's
    /// variable.
    ///
    /// The local potential is the conditional table (when present) times an
    /// indicator over the observed value (when set). Fails with
    /// `EmptyMessageSet` when there are no messages and no local potential.
    pub fn evaluate(
        &self,
        incoming: &[&FactorTable],
        mode: EvalMode,
    ) -> Result<FactorTable, InferenceError> {
        let mut combined = self.local_potential()?;
        if combined.is_none() && incoming.is_empty() {
            return Err(InferenceError::EmptyMessageSet(self.name.to_string()));
        }
        for &message in incoming {
            combined = Some(match combined {
                Some(acc) => acc.multiply(message)?,
                None => message.clone(),
            });
        }
        let combined = combined
            .ok_or_else(|| InferenceError::EmptyMessageSet(self.name.to_string()))?;

        if combined.position(&self.name).is_some() {
            combined.marginalize_to(&self.name, mode)?.normalized(&[])
        } else {
            // Nothing in scope mentions this variable; fall back to the
            // uniform prior.
            FactorTable::uniform(vec![TableVar {
                name: self.name.clone(),
                domain: self.domain.clone(),
            }])?
            .normalized(&[])
        }
    }

    /// The node's own contribution to message passing: its conditional table
    /// restricted by its observed value, or a bare indicator when only an
    /// observation is present.
    pub(crate) fn local_potential(&self) -> Result<Option<FactorTable>, InferenceError> {
        match (&self.table, &self.observed) {
            (Some(table), Some(value)) => {
                let indicator = self.indicator(value)?;
                Ok(Some(table.multiply(&indicator)?))
            }
            (Some(table), None) => Ok(Some(table.clone())),
            (None, Some(value)) => Ok(Some(self.indicator(value)?)),
            (None, None) => Ok(None),
        }
    }

    fn indicator(&self, value: &Value) -> Result<FactorTable, InferenceError> {
        let mut table = FactorTable::zeroed(vec![TableVar {
            name: self.name.clone(),
            domain: self.domain.clone(),
        }])?;
        table.set_weight(&[(self.name.as_ref(), value.clone())], 1.0)?;
        Ok(table)
    }
}

/// An insertion-ordered collection of nodes.
///
/// Iteration order is the order nodes were added, which makes default
/// elimination orders and message schedules deterministic. Query variables,
/// evidence, and elimination orders are supplied per call and never stored.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: FxHashMap<Arc<str>, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs an undefined node. Only [`Graph::define`] validates the
    /// configuration.
    pub fn add_node(&mut self, name: &str, config: NodeConfig) -> Result<NodeId, InferenceError> {
        if self.index.contains_key(name) {
            return Err(InferenceError::DuplicateName(name.to_string()));
        }
        let domain: Arc<[Value]> = match config.values {
            Some(values) => Arc::from(values),
            None => Arc::from(vec![Value::Bool(false), Value::Bool(true)]),
        };
        let id = NodeId(self.nodes.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.nodes.push(Node {
            name: name.clone(),
            kind: config.kind.unwrap_or(NodeKind::Variable),
            domain,
            parents: SmallVec::from_vec(config.parents),
            table: None,
            observed: None,
            belief: None,
            defined: false,
        });
        self.index.insert(name, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, InferenceError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| InferenceError::Internal(format!("node id {:?} out of range", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, InferenceError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| InferenceError::Internal(format!("node id {:?} out of range", id)))
    }

    /// Looks a node up by name.
    pub fn node_id(&self, name: &str) -> Result<NodeId, InferenceError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| InferenceError::VariableNotFound(name.to_string()))
    }

    /// Finalizes a node's structure.
    ///
    /// Checks the parent wiring (`DuplicateParent`, `CyclicDependency` via a
    /// transitive traversal) and, for factor nodes, allocates the uniform
    /// conditional-table skeleton over the node's own domain crossed with all
    /// parents' domains. Idempotent on an already-defined node.
    pub fn define(&mut self, id: NodeId) -> Result<(), InferenceError> {
        if self.node(id)?.defined {
            return Ok(());
        }

        let parents: Vec<NodeId> = self.node(id)?.parents.to_vec();
        let mut seen: SmallVec<[NodeId; 4]> = SmallVec::new();
        for parent in &parents {
            self.node(*parent)?;
            if seen.contains(parent) {
                return Err(InferenceError::DuplicateParent {
                    node: self.node(id)?.name.to_string(),
                    parent: self.node(*parent)?.name.to_string(),
                });
            }
            seen.push(*parent);
        }
        self.check_acyclic_from(id)?;

        let node = self.node(id)?;
        if node.kind == NodeKind::Factor {
            let mut vars = Vec::with_capacity(parents.len() + 1);
            vars.push(TableVar {
                name: node.name_arc(),
                domain: node.domain_arc(),
            });
            for parent in &parents {
                let parent = self.node(*parent)?;
                vars.push(TableVar {
                    name: parent.name_arc(),
                    domain: parent.domain_arc(),
                });
            }
            let table = FactorTable::uniform(vars)?;
            self.node_mut(id)?.table = Some(table);
        } else if self.node(id)?.domain.is_empty() {
            return Err(InferenceError::InvalidDomain(
                self.node(id)?.name.to_string(),
            ));
        }

        self.node_mut(id)?.defined = true;
        Ok(())
    }

    /// Walks the parent chain from `start` and fails if it reaches `start`
    /// again.
    fn check_acyclic_from(&self, start: NodeId) -> Result<(), InferenceError> {
        let mut stack: Vec<NodeId> = self.node(start)?.parents.to_vec();
        let mut visited: Vec<bool> = vec![false; self.nodes.len()];
        while let Some(current) = stack.pop() {
            if current == start {
                return Err(InferenceError::CyclicDependency(
                    self.node(start)?.name.to_string(),
                ));
            }
            let slot = current.0 as usize;
            if visited[slot] {
                continue;
            }
            visited[slot] = true;
            stack.extend(self.node(current)?.parents.iter().copied());
        }
        Ok(())
    }

    /// Overwrites a factor node's conditional table.
    ///
    /// The supplied table must cover exactly the node's own variable and its
    /// parents with matching domains.
    pub fn set_table(&mut self, id: NodeId, table: FactorTable) -> Result<(), InferenceError> {
        let node = self.node(id)?;
        let Some(current) = &node.table else {
            return Err(InferenceError::Internal(format!(
                "node '{}' is not a defined factor node",
                node.name
            )));
        };
        if table.vars().len() != current.vars().len() {
            return Err(InferenceError::ShapeMismatch(format!(
                "table for '{}' must cover {} variables",
                node.name,
                current.vars().len()
            )));
        }
        for var in current.vars() {
            let Some(pos) = table.position(&var.name) else {
                return Err(InferenceError::VariableNotFound(var.name.to_string()));
            };
            if table.vars()[pos].domain != var.domain {
                return Err(InferenceError::IncompatibleDomains(var.name.to_string()));
            }
        }
        self.node_mut(id)?.table = Some(table);
        Ok(())
    }

    /// Estimates a factor node's conditional table by frequency counting.
    ///
    /// Counts co-occurrences of the node's value with its parents' values
    /// across the data rows, then normalizes per parent assignment. Fails
    /// with `InsufficientData` when a parent combination never occurs; no
    /// smoothing is applied.
    pub fn set_conditionals(
        &mut self,
        id: NodeId,
        data: &DataTable,
    ) -> Result<(), InferenceError> {
        let node = self.node(id)?;
        let Some(skeleton) = &node.table else {
            return Err(InferenceError::Internal(format!(
                "node '{}' is not a defined factor node",
                node.name
            )));
        };

        // Resolve every scope variable to its data column up front.
        let scope: Vec<(Arc<str>, usize)> = skeleton
            .vars()
            .iter()
            .map(|var| Ok((var.name.clone(), data.column(&var.name)?)))
            .collect::<Result<_, InferenceError>>()?;

        let mut counts = FactorTable::zeroed(skeleton.vars().to_vec())?;
        for row in data.rows() {
            let assignment: Vec<(&str, Value)> = scope
                .iter()
                .map(|(name, col)| (name.as_ref(), row[*col].clone()))
                .collect();
            counts.increment(&assignment)?;
        }

        let parent_names: Vec<Arc<str>> = skeleton.vars()[1..]
            .iter()
            .map(|v| v.name.clone())
            .collect();
        let conditioning: Vec<&str> = parent_names.iter().map(|n| n.as_ref()).collect();
        let normalized = counts.normalized(&conditioning).map_err(|err| match err {
            InferenceError::DegenerateTable(assignment) => InferenceError::InsufficientData {
                node: self.nodes[id.0 as usize].name.to_string(),
                assignment,
            },
            other => other,
        })?;
        self.node_mut(id)?.table = Some(normalized);
        Ok(())
    }

    /// Estimates conditionals for every factor node in insertion order.
    pub fn set_conditionals_all(&mut self, data: &DataTable) -> Result<(), InferenceError> {
        let factor_ids: Vec<NodeId> = self
            .node_ids()
            .filter(|id| self.nodes[id.0 as usize].table.is_some())
            .collect();
        for id in factor_ids {
            self.set_conditionals(id, data)?;
        }
        Ok(())
    }

    /// Binds an observed value to a node.
    pub fn observe(&mut self, id: NodeId, value: Value) -> Result<(), InferenceError> {
        let node = self.node(id)?;
        if !node.domain.contains(&value) {
            return Err(InferenceError::NoMatchingRows {
                variable: node.name.to_string(),
                value: value.to_string(),
            });
        }
        self.node_mut(id)?.observed = Some(value);
        Ok(())
    }

    /// Clears a node's observed value.
    pub fn clear_observation(&mut self, id: NodeId) -> Result<(), InferenceError> {
        self.node_mut(id)?.observed = None;
        Ok(())
    }

    /// Maps a raw numeric input to the nearest domain value and binds it as
    /// the node's observation.
    ///
    /// Fails with `UnorderedDomain` when the domain carries label values
    /// with no numeric interpretation. Ties go to the earlier domain value.
    pub fn quantize(&mut self, id: NodeId, raw: f64) -> Result<Value, InferenceError> {
        let node = self.node(id)?;
        let mut best: Option<(f64, Value)> = None;
        for value in node.domain.iter() {
            let Some(numeric) = value.as_numeric() else {
                return Err(InferenceError::UnorderedDomain(node.name.to_string()));
            };
            let distance = (raw - numeric).abs();
            if best.as_ref().map_or(true, |(d, _)| distance < *d) {
                best = Some((distance, value.clone()));
            }
        }
        let (_, value) = best.ok_or_else(|| {
            InferenceError::InvalidDomain(self.nodes[id.0 as usize].name.to_string())
        })?;
        self.node_mut(id)?.observed = Some(value.clone());
        Ok(value)
    }

    /// The node's current belief; see [`Node::belief`].
    pub fn belief(&self, id: NodeId) -> Result<FactorTable, InferenceError> {
        self.node(id)?.belief()
    }

    pub(crate) fn store_belief(&mut self, id: NodeId, belief: FactorTable) -> Result<(), InferenceError> {
        self.node_mut(id)?.set_belief(belief);
        Ok(())
    }

    /// Undirected neighbors of a node: its parents plus every node that
    /// lists it as a parent, in insertion order.
    pub(crate) fn neighbors(&self, id: NodeId) -> Result<SmallVec<[NodeId; 4]>, InferenceError> {
        let mut neighbors: SmallVec<[NodeId; 4]> = SmallVec::new();
        for parent in self.node(id)?.parents.iter() {
            if !neighbors.contains(parent) {
                neighbors.push(*parent);
            }
        }
        for other in self.node_ids() {
            if other != id
                && self.node(other)?.parents.contains(&id)
                && !neighbors.contains(&other)
            {
                neighbors.push(other);
            }
        }
        neighbors.sort_unstable();
        Ok(neighbors)
    }

    /// The single variable shared by the `(a, b)` edge: the parent-side
    /// endpoint of the link between the two nodes.
    pub(crate) fn separator(&self, a: NodeId, b: NodeId) -> Result<NodeId, InferenceError> {
        if self.node(a)?.parents.contains(&b) {
            Ok(b)
        } else if self.node(b)?.parents.contains(&a) {
            Ok(a)
        } else {
            Err(InferenceError::Internal(format!(
                "nodes '{}' and '{}' are not adjacent",
                self.node(a)?.name,
                self.node(b)?.name
            )))
        }
    }
}

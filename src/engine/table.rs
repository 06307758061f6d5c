//! Factor tables over discrete variables.
//!
//! A [`FactorTable`] maps every combination of its variables' domain values
//! to a non-negative weight. Tables are dense and row-major: the last listed
//! variable varies fastest, so row order is fully determined by the variable
//! order and each domain's declared value order. Every operation produces a
//! new table; operands are never mutated, which keeps in-flight inference
//! free of aliasing concerns.

use std::fmt;
use std::sync::Arc;

use crate::engine::errors::InferenceError;

/// A discrete domain value.
///
/// `Bool` and `Int` values carry a natural numeric ordering and can be
/// quantized against; `Label` values are opaque symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Bool(bool),
    Int(i64),
    Label(Arc<str>),
}

impl Value {
    /// Convenience constructor for label values.
    pub fn label(s: &str) -> Self {
        Value::Label(Arc::from(s))
    }

    /// The numeric interpretation used for quantization, if any.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Label(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Label(s) => write!(f, "{}", s),
        }
    }
}

/// A named variable together with its ordered domain.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableVar {
    pub name: Arc<str>,
    pub domain: Arc<[Value]>,
}

impl TableVar {
    pub fn new(name: &str, domain: &[Value]) -> Self {
        Self {
            name: Arc::from(name),
            domain: Arc::from(domain),
        }
    }
}

/// Aggregation policy used when a variable is summed out of a table.
///
/// `SumProduct` yields marginal probabilities; `MaxProduct` yields
/// best-assignment scores for MAP-style decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvalMode {
    SumProduct,
    MaxProduct,
}

/// A dense table of non-negative weights over the Cartesian product of its
/// variables' domains.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactorTable {
    vars: Vec<TableVar>,
    /// Row-major weights, last variable fastest.
    weights: Vec<f64>,
}

/// Advances `coords` as a mixed-radix odometer over the variables' domains,
/// last position fastest. Returns false once all combinations are exhausted.
fn advance(coords: &mut [usize], vars: &[TableVar]) -> bool {
    for pos in (0..coords.len()).rev() {
        coords[pos] += 1;
        if coords[pos] < vars[pos].domain.len() {
            return true;
        }
        coords[pos] = 0;
    }
    false
}

fn checked_size(vars: &[TableVar]) -> Result<usize, InferenceError> {
    vars.iter()
        .try_fold(1_usize, |acc, v| acc.checked_mul(v.domain.len()))
        .ok_or_else(|| InferenceError::Internal("factor table size overflows usize".into()))
}

impl FactorTable {
    fn skeleton(vars: Vec<TableVar>, fill: f64) -> Result<Self, InferenceError> {
        for var in &vars {
            if var.domain.is_empty() {
                return Err(InferenceError::InvalidDomain(var.name.to_string()));
            }
        }
        let mut seen: Vec<&str> = Vec::with_capacity(vars.len());
        for var in &vars {
            if seen.contains(&var.name.as_ref()) {
                return Err(InferenceError::DuplicateName(var.name.to_string()));
            }
            seen.push(var.name.as_ref());
        }
        let size = checked_size(&vars)?;
        Ok(Self {
            vars,
            weights: vec![fill; size],
        })
    }

    /// Builds the table skeleton with every weight set to one (a uniform
    /// potential, to be overwritten or normalized by the owner).
    pub fn uniform(vars: Vec<TableVar>) -> Result<Self, InferenceError> {
        Self::skeleton(vars, 1.0)
    }

    /// Builds the table skeleton with every weight set to zero, ready to be
    /// filled by counting.
    pub fn zeroed(vars: Vec<TableVar>) -> Result<Self, InferenceError> {
        Self::skeleton(vars, 0.0)
    }

    /// Builds a table from explicit row-major weights.
    pub fn from_weights(vars: Vec<TableVar>, weights: Vec<f64>) -> Result<Self, InferenceError> {
        let mut table = Self::skeleton(vars, 0.0)?;
        if weights.len() != table.weights.len() {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected {} weights, got {}",
                table.weights.len(),
                weights.len()
            )));
        }
        table.weights = weights;
        Ok(table)
    }

    /// The table's variables, in row-order significance.
    pub fn vars(&self) -> &[TableVar] {
        &self.vars
    }

    /// Number of rows (domain combinations).
    pub fn num_rows(&self) -> usize {
        self.weights.len()
    }

    /// Raw row-major weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Position of a variable in this table, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name.as_ref() == name)
    }

    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.vars.len()];
        for pos in (0..self.vars.len().saturating_sub(1)).rev() {
            strides[pos] = strides[pos + 1] * self.vars[pos + 1].domain.len();
        }
        strides
    }

    fn index_of(&self, coords: &[usize], strides: &[usize]) -> usize {
        coords
            .iter()
            .zip(strides)
            .map(|(c, s)| c * s)
            .sum::<usize>()
    }

    /// Resolves a full assignment (one entry per table variable) to a row
    /// index.
    fn row_index(&self, assignment: &[(&str, Value)]) -> Result<usize, InferenceError> {
        let strides = self.strides();
        let mut coords = vec![usize::MAX; self.vars.len()];
        for (name, value) in assignment {
            let Some(pos) = self.position(name) else {
                continue;
            };
            let idx = self.vars[pos]
                .domain
                .iter()
                .position(|v| v == value)
                .ok_or_else(|| InferenceError::NoMatchingRows {
                    variable: name.to_string(),
                    value: value.to_string(),
                })?;
            coords[pos] = idx;
        }
        for (pos, coord) in coords.iter().enumerate() {
            if *coord == usize::MAX {
                return Err(InferenceError::VariableNotFound(
                    self.vars[pos].name.to_string(),
                ));
            }
        }
        Ok(self.index_of(&coords, &strides))
    }

    /// Weight at a full assignment.
    pub fn weight_for(&self, assignment: &[(&str, Value)]) -> Result<f64, InferenceError> {
        Ok(self.weights[self.row_index(assignment)?])
    }

    /// Overwrites the weight at a full assignment. Owner-side population
    /// only; inference never mutates a table in flight.
    pub fn set_weight(
        &mut self,
        assignment: &[(&str, Value)],
        weight: f64,
    ) -> Result<(), InferenceError> {
        let idx = self.row_index(assignment)?;
        self.weights[idx] = weight;
        Ok(())
    }

    pub(crate) fn increment(&mut self, assignment: &[(&str, Value)]) -> Result<(), InferenceError> {
        let idx = self.row_index(assignment)?;
        self.weights[idx] += 1.0;
        Ok(())
    }

    /// Iterates rows as (assignment, weight) pairs in table order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (Vec<(Arc<str>, Value)>, f64)> + '_ {
        let mut coords = vec![0_usize; self.vars.len()];
        let mut done = self.weights.is_empty();
        let mut row = 0_usize;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let assignment = self
                .vars
                .iter()
                .zip(&coords)
                .map(|(v, &c)| (v.name.clone(), v.domain[c].clone()))
                .collect();
            let weight = self.weights[row];
            row += 1;
            done = !advance(&mut coords, &self.vars);
            Some((assignment, weight))
        })
    }

    /// Restricts the table with a partial assignment.
    ///
    /// Variables named in `evidence` keep only the rows matching the given
    /// value (their domain collapses to that single value); variables not
    /// named remain free, and evidence for variables absent from this table
    /// is ignored. Fails with `NoMatchingRows` when an evidence value lies
    /// outside its variable's domain.
    pub fn sub_table(&self, evidence: &[(&str, Value)]) -> Result<Self, InferenceError> {
        let mut fixed: Vec<Option<usize>> = vec![None; self.vars.len()];
        for (name, value) in evidence {
            let Some(pos) = self.position(name) else {
                continue;
            };
            let idx = self.vars[pos]
                .domain
                .iter()
                .position(|v| v == value)
                .ok_or_else(|| InferenceError::NoMatchingRows {
                    variable: name.to_string(),
                    value: value.to_string(),
                })?;
            fixed[pos] = Some(idx);
        }
        if fixed.iter().all(Option::is_none) {
            return Ok(self.clone());
        }

        let vars: Vec<TableVar> = self
            .vars
            .iter()
            .zip(&fixed)
            .map(|(v, f)| match f {
                Some(idx) => TableVar {
                    name: v.name.clone(),
                    domain: Arc::from(vec![v.domain[*idx].clone()]),
                },
                None => v.clone(),
            })
            .collect();

        let strides = self.strides();
        let mut result = Self::zeroed(vars)?;
        let mut coords = vec![0_usize; result.vars.len()];
        let mut row = 0_usize;
        loop {
            let src: usize = coords
                .iter()
                .zip(&fixed)
                .zip(&strides)
                .map(|((c, f), s)| f.unwrap_or(*c) * s)
                .sum();
            result.weights[row] = self.weights[src];
            row += 1;
            if !advance(&mut coords, &result.vars) {
                break;
            }
        }
        Ok(result)
    }

    /// Multiplies two tables by an outer join on their shared variables.
    ///
    /// The result's variables follow this table's order, then the other
    /// operand's exclusive variables in their original order, so row order is
    /// deterministic. Fails with `IncompatibleDomains` when a shared variable
    /// carries different domains in the two operands.
    pub fn multiply(&self, other: &Self) -> Result<Self, InferenceError> {
        for var in &other.vars {
            if let Some(pos) = self.position(&var.name) {
                let own = &self.vars[pos].domain;
                if !Arc::ptr_eq(own, &var.domain) && own != &var.domain {
                    return Err(InferenceError::IncompatibleDomains(var.name.to_string()));
                }
            }
        }

        let mut vars = self.vars.clone();
        vars.extend(
            other
                .vars
                .iter()
                .filter(|v| self.position(&v.name).is_none())
                .cloned(),
        );
        let mut result = Self::zeroed(vars)?;

        // For every variable of `other`, the position in the result's
        // coordinate vector it reads from.
        let mut other_slots = Vec::with_capacity(other.vars.len());
        for var in &other.vars {
            let slot = result.position(&var.name).ok_or_else(|| {
                InferenceError::Internal("product table lost an operand variable".into())
            })?;
            other_slots.push(slot);
        }

        let self_strides = self.strides();
        let other_strides = other.strides();
        let mut coords = vec![0_usize; result.vars.len()];
        let mut row = 0_usize;
        loop {
            let left: usize = coords[..self.vars.len()]
                .iter()
                .zip(&self_strides)
                .map(|(c, s)| c * s)
                .sum();
            let right: usize = other_slots
                .iter()
                .zip(&other_strides)
                .map(|(slot, s)| coords[*slot] * s)
                .sum();
            result.weights[row] = self.weights[left] * other.weights[right];
            row += 1;
            if !advance(&mut coords, &result.vars) {
                break;
            }
        }
        Ok(result)
    }

    /// Sums (or maximizes, under `MaxProduct`) one variable out of the table.
    pub fn marginalize(&self, name: &str, mode: EvalMode) -> Result<Self, InferenceError> {
        let pos = self
            .position(name)
            .ok_or_else(|| InferenceError::VariableNotFound(name.to_string()))?;

        let vars: Vec<TableVar> = self
            .vars
            .iter()
            .enumerate()
            .filter(|(p, _)| *p != pos)
            .map(|(_, v)| v.clone())
            .collect();
        let mut result = Self::zeroed(vars)?;
        if mode == EvalMode::MaxProduct {
            result.weights.fill(f64::NEG_INFINITY);
        }
        let result_strides = result.strides();

        let mut coords = vec![0_usize; self.vars.len()];
        let mut row = 0_usize;
        loop {
            let dst: usize = coords
                .iter()
                .enumerate()
                .filter(|(p, _)| *p != pos)
                .map(|(p, c)| c * result_strides[if p < pos { p } else { p - 1 }])
                .sum();
            match mode {
                EvalMode::SumProduct => result.weights[dst] += self.weights[row],
                EvalMode::MaxProduct => {
                    result.weights[dst] = result.weights[dst].max(self.weights[row])
                }
            }
            row += 1;
            if !advance(&mut coords, &self.vars) {
                break;
            }
        }
        Ok(result)
    }

    /// Marginalizes out every variable except `name`.
    pub fn marginalize_to(&self, name: &str, mode: EvalMode) -> Result<Self, InferenceError> {
        if self.position(name).is_none() {
            return Err(InferenceError::VariableNotFound(name.to_string()));
        }
        let others: Vec<Arc<str>> = self
            .vars
            .iter()
            .filter(|v| v.name.as_ref() != name)
            .map(|v| v.name.clone())
            .collect();
        let mut table = self.clone();
        for other in others {
            table = table.marginalize(&other, mode)?;
        }
        Ok(table)
    }

    /// Normalizes the table into a distribution.
    ///
    /// Weights over the free variables sum to one for each fixed assignment
    /// of the `conditioning` variables; with no conditioning variables the
    /// grand total is the denominator. Idempotent. Fails with
    /// `DegenerateTable` when any denominator is zero.
    pub fn normalized(&self, conditioning: &[&str]) -> Result<Self, InferenceError> {
        let cond_pos: Vec<usize> = conditioning
            .iter()
            .map(|name| {
                self.position(name)
                    .ok_or_else(|| InferenceError::VariableNotFound(name.to_string()))
            })
            .collect::<Result<_, _>>()?;

        // Mixed-radix key over the conditioning coordinates.
        let mut key_strides = vec![1_usize; cond_pos.len()];
        for i in (0..cond_pos.len().saturating_sub(1)).rev() {
            key_strides[i] = key_strides[i + 1] * self.vars[cond_pos[i + 1]].domain.len();
        }
        let num_groups: usize = cond_pos
            .iter()
            .map(|p| self.vars[*p].domain.len())
            .product();

        let mut denominators = vec![0.0_f64; num_groups];
        let mut coords = vec![0_usize; self.vars.len()];
        let mut row = 0_usize;
        loop {
            let key: usize = cond_pos
                .iter()
                .zip(&key_strides)
                .map(|(p, s)| coords[*p] * s)
                .sum();
            denominators[key] += self.weights[row];
            row += 1;
            if !advance(&mut coords, &self.vars) {
                break;
            }
        }

        for (key, denom) in denominators.iter().enumerate() {
            if *denom <= 0.0 {
                return Err(InferenceError::DegenerateTable(self.describe_group(
                    &cond_pos,
                    &key_strides,
                    key,
                )));
            }
        }

        let mut result = self.clone();
        coords.fill(0);
        row = 0;
        loop {
            let key: usize = cond_pos
                .iter()
                .zip(&key_strides)
                .map(|(p, s)| coords[*p] * s)
                .sum();
            result.weights[row] /= denominators[key];
            row += 1;
            if !advance(&mut coords, &self.vars) {
                break;
            }
        }
        Ok(result)
    }

    fn describe_group(&self, cond_pos: &[usize], key_strides: &[usize], key: usize) -> String {
        if cond_pos.is_empty() {
            return "grand total".to_string();
        }
        let parts: Vec<String> = cond_pos
            .iter()
            .zip(key_strides)
            .map(|(p, s)| {
                let idx = (key / s) % self.vars[*p].domain.len();
                format!("{}={}", self.vars[*p].name, self.vars[*p].domain[idx])
            })
            .collect();
        parts.join(", ")
    }

    /// Reorders the table's variables; `names` must be a permutation of the
    /// current variables.
    pub fn reordered(&self, names: &[&str]) -> Result<Self, InferenceError> {
        if names.len() != self.vars.len() {
            return Err(InferenceError::Internal(
                "reorder requires a permutation of the table's variables".into(),
            ));
        }
        let mut old_pos = Vec::with_capacity(names.len());
        for name in names {
            let pos = self
                .position(name)
                .ok_or_else(|| InferenceError::VariableNotFound(name.to_string()))?;
            if old_pos.contains(&pos) {
                return Err(InferenceError::DuplicateName(name.to_string()));
            }
            old_pos.push(pos);
        }

        let vars: Vec<TableVar> = old_pos.iter().map(|p| self.vars[*p].clone()).collect();
        let mut result = Self::zeroed(vars)?;
        let old_strides = self.strides();
        let mut coords = vec![0_usize; result.vars.len()];
        let mut row = 0_usize;
        loop {
            let src: usize = coords
                .iter()
                .zip(&old_pos)
                .map(|(c, p)| c * old_strides[*p])
                .sum();
            result.weights[row] = self.weights[src];
            row += 1;
            if !advance(&mut coords, &result.vars) {
                break;
            }
        }
        Ok(result)
    }
}

//! Variable elimination over the graph's factor tables.
//!
//! The algorithm is the textbook sum-product elimination: restrict every
//! factor with the supplied evidence, sum variables out in the caller's
//! order, multiply what remains and normalize over the query variables.
//! Elimination-order quality affects cost, never correctness; the engine
//! does not compute an optimal order itself.

use crate::engine::errors::InferenceError;
use crate::engine::graph::{Graph, NodeId};
use crate::engine::table::{EvalMode, FactorTable, TableVar, Value};

impl Graph {
    /// Answers a query with the default elimination order: every variable
    /// that is neither queried nor observed, in graph-insertion order.
    pub fn query(
        &self,
        query: &[NodeId],
        evidence: &[(NodeId, Value)],
    ) -> Result<FactorTable, InferenceError> {
        let order: Vec<NodeId> = self
            .node_ids()
            .filter(|id| !query.contains(id) && !evidence.iter().any(|(e, _)| e == id))
            .collect();
        self.eliminate(query, evidence, &order)
    }

    /// Runs variable elimination with an explicit order.
    ///
    /// The order must cover every variable that is neither query nor
    /// evidence and must not name one that is; otherwise the call fails with
    /// `IncompleteEliminationOrder`. The result is a distribution over the
    /// query variables, in query order.
    pub fn eliminate(
        &self,
        query: &[NodeId],
        evidence: &[(NodeId, Value)],
        order: &[NodeId],
    ) -> Result<FactorTable, InferenceError> {
        if query.is_empty() {
            return Err(InferenceError::IncompleteEliminationOrder(
                "no query variables given".into(),
            ));
        }
        for id in query
            .iter()
            .chain(evidence.iter().map(|(id, _)| id))
            .chain(order.iter())
        {
            if id.0 as usize >= self.len() {
                return Err(InferenceError::VariableNotFound(format!("node #{}", id.0)));
            }
        }
        for id in order {
            if query.contains(id) || evidence.iter().any(|(e, _)| e == id) {
                return Err(InferenceError::IncompleteEliminationOrder(format!(
                    "order names query/evidence variable '{}'",
                    self.node(*id)?.name()
                )));
            }
        }
        for id in self.node_ids() {
            let accounted = query.contains(&id)
                || evidence.iter().any(|(e, _)| *e == id)
                || order.contains(&id);
            if !accounted {
                return Err(InferenceError::IncompleteEliminationOrder(format!(
                    "order omits variable '{}'",
                    self.node(id)?.name()
                )));
            }
        }

        let named_evidence: Vec<(&str, Value)> = evidence
            .iter()
            .map(|(id, value)| Ok((self.node(*id)?.name(), value.clone())))
            .collect::<Result<_, InferenceError>>()?;

        // Every factor in the graph, restricted by the evidence.
        let mut factors: Vec<FactorTable> = Vec::new();
        for id in self.node_ids() {
            if let Some(table) = self.node(id)?.table() {
                factors.push(table.sub_table(&named_evidence)?);
            }
        }

        for id in order {
            let name = self.node(*id)?.name().to_string();
            let (mentioning, rest): (Vec<FactorTable>, Vec<FactorTable>) = factors
                .into_iter()
                .partition(|f| f.position(&name).is_some());
            factors = rest;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                variable = %name,
                factors = mentioning.len(),
                "eliminating variable"
            );
            let Some(mut product) = mentioning.first().cloned() else {
                continue;
            };
            for factor in &mentioning[1..] {
                product = product.multiply(factor)?;
            }
            factors.push(product.marginalize(&name, EvalMode::SumProduct)?);
        }

        let mut result = match factors.split_first() {
            Some((first, rest)) => {
                let mut product = first.clone();
                for factor in rest {
                    product = product.multiply(factor)?;
                }
                product
            }
            None => self.uniform_over(query)?,
        };

        // Cover query variables no remaining factor mentions, then project
        // away evidence leftovers (their domains are singletons by now).
        for id in query {
            let node = self.node(*id)?;
            if result.position(node.name()).is_none() {
                result = result.multiply(&self.uniform_over(&[*id])?)?;
            }
        }
        let query_names: Vec<String> = query
            .iter()
            .map(|id| Ok(self.node(*id)?.name().to_string()))
            .collect::<Result<_, InferenceError>>()?;
        let extraneous: Vec<String> = result
            .vars()
            .iter()
            .filter(|v| !query_names.iter().any(|q| q == v.name.as_ref()))
            .map(|v| v.name.to_string())
            .collect();
        for name in extraneous {
            result = result.marginalize(&name, EvalMode::SumProduct)?;
        }

        let ordered: Vec<&str> = query_names.iter().map(String::as_str).collect();
        result.reordered(&ordered)?.normalized(&[])
    }

    fn uniform_over(&self, ids: &[NodeId]) -> Result<FactorTable, InferenceError> {
        let vars: Vec<TableVar> = ids
            .iter()
            .map(|id| {
                let node = self.node(*id)?;
                Ok(TableVar::new(node.name(), node.domain()))
            })
            .collect::<Result<_, InferenceError>>()?;
        FactorTable::uniform(vars)
    }
}

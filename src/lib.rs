//! # Beliefnet - Exact Inference for Discrete Graphical Models
//!
//! Beliefnet is an exact-inference engine for discrete probabilistic
//! graphical models (Bayesian networks and factor graphs), with a derived
//! hidden Markov layer for sequence generation and decoding.
//!
//! ## Architecture
//!
//! The system is organized around a single `engine` module:
//!
//! - **table**: Factor tables over discrete variables with multiplication,
//!   restriction, marginalization and normalization
//! - **graph**: An arena of variable/factor nodes with structural validation
//!   and frequency-counting conditional estimation
//! - **elimination**: Variable elimination for posterior queries
//! - **propagation**: Exact message passing over tree-shaped graphs
//! - **markov**: Hidden Markov generation, naive and Viterbi decoding, and
//!   forward-backward posteriors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beliefnet::{Graph, NodeConfig, Value};
//!
//! let mut g = Graph::new();
//! let rain = g.add_node("rain", NodeConfig::factor())?;
//! let grass = g.add_node("grass", NodeConfig::factor().with_parents(&[rain]))?;
//! g.define(rain)?;
//! g.define(grass)?;
//!
//! let posterior = g.query(&[rain], &[(grass, Value::Bool(true))])?;
//! ```

#![forbid(unsafe_code)]

pub mod engine;

// Re-export commonly used types
pub use engine::data::DataTable;
pub use engine::errors::InferenceError;
pub use engine::graph::{Graph, Node, NodeConfig, NodeId, NodeKind};
pub use engine::markov::{HiddenMarkov, MarkovConfig};
pub use engine::propagation::{Message, MessageKind, SolveReport};
pub use engine::table::{EvalMode, FactorTable, TableVar, Value};

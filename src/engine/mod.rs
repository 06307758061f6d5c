//! The inference engine for discrete graphical models.
//!
//! This module provides:
//! - **errors**: Error types for inference failures
//! - **table**: Factor tables and the factor algebra
//! - **data**: Row-oriented observation records
//! - **graph**: Node arena, structural definition and conditional estimation
//! - **elimination**: Variable elimination for posterior queries
//! - **propagation**: Message passing over tree-shaped graphs
//! - **markov**: Hidden Markov generation, decoding and posteriors
//! - **numeric**: Scalar kernels shared by the algorithms

pub mod errors;
pub mod table;
pub mod data;
pub mod graph;
pub mod elimination;
pub mod propagation;
pub mod markov;
pub mod numeric;

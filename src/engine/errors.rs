//! Error types for inference execution.

use thiserror::Error;

/// Errors that can occur while building a model or running inference.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Every error is raised synchronously at the operation that detects the
/// violation and surfaces to the caller immediately; no partial results are
/// returned on failure, and results of prior successful calls remain valid.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InferenceError {
    /// A variable was declared with an empty domain.
    #[error("invalid domain: variable '{0}' has an empty domain")]
    InvalidDomain(String),

    /// A node transitively appears in its own parent chain, or message
    /// passing was requested on a graph whose skeleton contains a cycle.
    #[error("cyclic dependency involving node '{0}'")]
    CyclicDependency(String),

    /// The same parent was wired to a node more than once.
    #[error("duplicate parent '{parent}' on node '{node}'")]
    DuplicateParent { node: String, parent: String },

    /// A name was registered twice (graph node or data column).
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// An assignment named a value outside the variable's domain.
    #[error("no matching rows: value {value} is outside the domain of '{variable}'")]
    NoMatchingRows { variable: String, value: String },

    /// A shared variable has different domains in the two operand tables.
    #[error("incompatible domains for shared variable '{0}'")]
    IncompatibleDomains(String),

    /// A normalizing denominator was zero.
    #[error("degenerate table: zero normalizing denominator ({0})")]
    DegenerateTable(String),

    /// A node was evaluated with no incoming messages and no local factor.
    #[error("empty message set: node '{0}' has no incoming messages and no factor")]
    EmptyMessageSet(String),

    /// Quantization was requested against a domain with no numeric ordering.
    #[error("unordered domain: '{0}' cannot be quantized")]
    UnorderedDomain(String),

    /// A parent-assignment combination had zero observed count while
    /// estimating conditionals. No smoothing is applied; the data must cover
    /// every combination.
    #[error("insufficient data for node '{node}': no observations where {assignment}")]
    InsufficientData { node: String, assignment: String },

    /// A query, evidence, or order entry referenced an unknown variable.
    #[error("no variable named '{0}'")]
    VariableNotFound(String),

    /// The caller-supplied elimination order is not usable.
    #[error("incomplete elimination order: {0}")]
    IncompleteEliminationOrder(String),

    /// A Markov parameter array has the wrong shape or violates its
    /// stochasticity or definiteness constraint.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Internal execution error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

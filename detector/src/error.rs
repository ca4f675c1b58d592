// error.rs — Library error model
//
// Distinguishes fatal consistency failures from recoverable caller errors.
// Unknown-tag removal is not an error; it is reported through the removal
// outcome instead.

use thiserror::Error;

use crate::tag::TagId;

/// Errors surfaced by graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A post-operation consistency check failed. The graph must be
    /// considered poisoned; no further mutation is meaningful.
    #[error("graph invariant violated: {failed:?}")]
    InvariantViolation { failed: Vec<&'static str> },

    /// Addition of a tag whose id is already live in this graph.
    #[error("tag {0} is already present")]
    DuplicateTag(TagId),

    /// Rejected at the boundary: non-positive gap, non-finite tolerance,
    /// reserved or proxy id supplied by the caller.
    #[error("numeric domain: {0}")]
    NumericDomain(String),
}

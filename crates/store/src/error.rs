//! Store error taxonomy.
//!
//! These are the only error kinds request processing can produce; the
//! cluster server maps them onto HTTP-status space for the response
//! envelope.

/// An error produced while processing a request against a shard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested key is not present, or was expired and swept.
    #[error("{0}")]
    Missing(String),

    /// The stored value's type does not fit the operation: a list
    /// operation on a non-list, a dictionary operation on a
    /// non-mapping, an out-of-range position or an ill-typed lookup.
    #[error("{0}")]
    Conflict(String),

    /// An invariant broke: a well-typed lookup found nothing where
    /// something had to be.
    #[error("{0}")]
    Internal(String),
}

//! Error model shared by the store and the authorization layer.

use thiserror::Error;

/// Result type used across the authorization layer.
pub type BouncerResult<T> = Result<T, BouncerError>;

/// Result type returned by entity store implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Authorization-layer error.
///
/// Reference resolution failures are reported here; anything the store
/// raises is wrapped unchanged in [`BouncerError::Store`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BouncerError {
    /// A reference resolved to no entity and implicit creation is not allowed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A reference matched more than one entity under a non-unique key.
    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// A reference was used where its kind is not accepted
    /// (e.g. syncing the roles of a role).
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BouncerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::AmbiguousReference(msg.into())
    }

    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }
}

/// Entity store failure.
///
/// These are infrastructure errors as opposed to reference resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    /// The store could not serve the request (connectivity, poisoned lock, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The relation is not defined for this owner (e.g. roles of a role).
    #[error("invalid relation: {0}")]
    InvalidRelation(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_pass_through_unchanged() {
        let err: BouncerError = StoreError::unavailable("connection reset").into();
        assert_eq!(err.to_string(), "store unavailable: connection reset");
        assert!(matches!(err, BouncerError::Store(StoreError::Unavailable(_))));
    }
}

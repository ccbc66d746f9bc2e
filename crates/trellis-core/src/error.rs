// crates/trellis-core/src/error.rs

use thiserror::Error;

/// Engine-wide error types for Trellis.
///
/// Every rejected mutation is reported through one of these variants and
/// leaves the engine state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrellisError {
    /// Malformed attributes, out-of-range scores, or an invalid boundary/config.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown entity, boundary, or transaction.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Relationship cycle, or stored inherited values disagree with a recomputation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Execute or rollback invoked on a transaction in the wrong state.
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// Snapshot serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TrellisError {
    fn from(e: serde_json::Error) -> Self {
        TrellisError::Serialization(e.to_string())
    }
}

impl TrellisError {
    /// Short stable tag for the error kind, used in batch outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TrellisError::Validation(_) => "validation",
            TrellisError::NotFound(_) => "not_found",
            TrellisError::Conflict(_) => "conflict",
            TrellisError::TransactionState(_) => "transaction_state",
            TrellisError::Serialization(_) => "serialization",
        }
    }
}

// crates/trellis-core/src/transaction.rs
//
// Transaction records: one propose/commit/rollback unit per state change.
//
// Valid transitions:
//   Pending -> Executing -> Completed | Failed
//   Pending -> RolledBack
// Completed, Failed and RolledBack are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::TrustAttribute;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl TransactionStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::RolledBack
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Executing)
                | (TransactionStatus::Pending, TransactionStatus::RolledBack)
                | (TransactionStatus::Executing, TransactionStatus::Completed)
                | (TransactionStatus::Executing, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Executing => write!(f, "executing"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// What produced a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// Collaborator-supplied attribute update (first registration or refresh).
    Registration,
    /// Source -> target trust transfer.
    Propagation,
    /// Recalculation of a child from its current parents.
    Inheritance { parents: Vec<String> },
    /// Tier change.
    Promotion,
    /// Verification status change.
    Verification,
}

/// A single state change against one target entity.
///
/// Propagation transactions live in the propagation manager while pending;
/// every transaction is archived to the target's log once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    /// Entity the change originates from. Equals `target_id` for
    /// registration and promotion records.
    pub source_id: String,
    pub target_id: String,
    pub proposed_attributes: TrustAttribute,
    /// Full attribute snapshot written by a completed transaction.
    #[serde(default)]
    pub committed_attributes: Option<TrustAttribute>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new pending transaction.
    pub fn pending(
        kind: TransactionKind,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        proposed_attributes: TrustAttribute,
    ) -> Self {
        Self {
            transaction_id: Uuid::now_v7(),
            kind,
            source_id: source_id.into(),
            target_id: target_id.into(),
            proposed_attributes,
            committed_attributes: None,
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Build an already-completed record for a direct commit (registration,
    /// inheritance recalculation, promotion).
    pub fn completed(
        kind: TransactionKind,
        source_id: impl Into<String>,
        committed: TrustAttribute,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::now_v7(),
            kind,
            source_id: source_id.into(),
            target_id: committed.entity_id.clone(),
            proposed_attributes: committed.clone(),
            committed_attributes: Some(committed),
            status: TransactionStatus::Completed,
            created_at: now,
            completed_at: Some(now),
        }
    }
}

// crates/trellis-core/src/traits.rs

use crate::attribute::TrustAttribute;
use crate::error::TrellisError;
use crate::transaction::{Transaction, TransactionStatus};

/// Authoritative storage of current trust attributes plus an append-only
/// per-entity transaction log.
///
/// Implemented by trellis-store (in-memory backend). Callers serialize
/// writes per entity; implementations do no internal per-entity locking.
pub trait TrustStore {
    /// Current attributes of an entity, or `NotFound`.
    fn get(&self, entity_id: &str) -> Result<TrustAttribute, TrellisError>;

    /// Whether the entity has a materialized attribute record.
    fn contains(&self, entity_id: &str) -> bool;

    /// Validate and write an attribute record. On failure nothing changes.
    fn set(&mut self, entity_id: &str, attributes: TrustAttribute) -> Result<(), TrellisError>;

    /// Append a terminal transaction to its target's log.
    fn append_transaction(&mut self, record: Transaction) -> Result<(), TrellisError>;

    /// Ordered transaction log of an entity (empty if none).
    fn get_transaction_history(&self, entity_id: &str) -> Vec<Transaction>;

    /// Rebuild an entity's attributes by replaying its completed
    /// transactions in commit order, and restore the primary record.
    fn recover_state(&mut self, entity_id: &str) -> Result<TrustAttribute, TrellisError>;

    /// Drop log records older than the retention window. Returns how many
    /// records were removed. Never touches the attribute record.
    fn cleanup_old_transactions(&mut self, entity_id: &str, retention_days: u32) -> usize;

    /// Ids of every entity with a materialized attribute record.
    fn entity_ids(&self) -> Vec<String>;

    /// Ids of every entity with a non-empty transaction log. A failed
    /// propagation to a new target leaves a log without an attribute record.
    fn logged_entity_ids(&self) -> Vec<String>;

    /// Commit a completed transaction: validate its snapshot, append the log
    /// record, then write the attribute record. The log is written first so
    /// recovery can always replay what was committed.
    fn commit(&mut self, record: Transaction) -> Result<TrustAttribute, TrellisError> {
        if record.status != TransactionStatus::Completed {
            return Err(TrellisError::TransactionState(format!(
                "cannot commit transaction {} in state {}",
                record.transaction_id, record.status
            )));
        }
        let committed = record.committed_attributes.clone().ok_or_else(|| {
            TrellisError::Validation(format!(
                "transaction {} has no committed attributes",
                record.transaction_id
            ))
        })?;
        if committed.entity_id != record.target_id {
            return Err(TrellisError::Validation(format!(
                "transaction {} targets '{}' but commits attributes for '{}'",
                record.transaction_id, record.target_id, committed.entity_id
            )));
        }
        crate::validation::validate_attribute(&committed)?;

        let target = record.target_id.clone();
        self.append_transaction(record)?;
        self.set(&target, committed.clone())?;
        Ok(committed)
    }
}

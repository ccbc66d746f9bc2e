// crates/trellis-store/src/memory.rs
//
// In-memory trust store.
//
// Layout:
//   - attributes: entity_id -> current TrustAttribute
//   - logs:       entity_id -> append-only Vec<Transaction> in commit order
//
// Writes validate first and only then touch the maps, so a rejected write
// leaves the store exactly as it was.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::transaction::{Transaction, TransactionStatus};
use trellis_core::validation::validate_attribute;
use trellis_core::TrustAttribute;

/// HashMap-backed implementation of `TrustStore`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTrustStore {
    attributes: HashMap<String, TrustAttribute>,
    logs: HashMap<String, Vec<Transaction>>,
}

impl InMemoryTrustStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities with a materialized attribute record.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Retention sweep against an explicit clock.
    pub fn cleanup_old_transactions_at(
        &mut self,
        entity_id: &str,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> usize {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let Some(log) = self.logs.get_mut(entity_id) else {
            return 0;
        };
        let before = log.len();
        log.retain(|tx| tx.created_at >= cutoff);
        let removed = before - log.len();
        if removed > 0 {
            tracing::debug!(
                entity_id = %entity_id,
                removed,
                retention_days,
                "Pruned transaction log"
            );
        }
        removed
    }

    pub(crate) fn attributes(&self) -> &HashMap<String, TrustAttribute> {
        &self.attributes
    }

    pub(crate) fn logs(&self) -> &HashMap<String, Vec<Transaction>> {
        &self.logs
    }

    pub(crate) fn from_parts(
        attributes: HashMap<String, TrustAttribute>,
        logs: HashMap<String, Vec<Transaction>>,
    ) -> Self {
        Self { attributes, logs }
    }
}

impl TrustStore for InMemoryTrustStore {
    fn get(&self, entity_id: &str) -> Result<TrustAttribute, TrellisError> {
        self.attributes
            .get(entity_id)
            .cloned()
            .ok_or_else(|| TrellisError::NotFound(format!("entity '{}'", entity_id)))
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.attributes.contains_key(entity_id)
    }

    fn set(&mut self, entity_id: &str, attributes: TrustAttribute) -> Result<(), TrellisError> {
        if attributes.entity_id != entity_id {
            return Err(TrellisError::Validation(format!(
                "attribute record for '{}' cannot be stored under '{}'",
                attributes.entity_id, entity_id
            )));
        }
        validate_attribute(&attributes)?;
        self.attributes.insert(entity_id.to_string(), attributes);
        Ok(())
    }

    fn append_transaction(&mut self, record: Transaction) -> Result<(), TrellisError> {
        if !record.status.is_terminal() {
            return Err(TrellisError::TransactionState(format!(
                "only terminal transactions are archived; {} is {}",
                record.transaction_id, record.status
            )));
        }
        self.logs
            .entry(record.target_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn get_transaction_history(&self, entity_id: &str) -> Vec<Transaction> {
        self.logs.get(entity_id).cloned().unwrap_or_default()
    }

    fn recover_state(&mut self, entity_id: &str) -> Result<TrustAttribute, TrellisError> {
        // Each completed record carries the full snapshot it wrote, so
        // replaying in commit order leaves the last one in effect.
        let replayed = self
            .logs
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .filter_map(|tx| tx.committed_attributes.as_ref())
            .last()
            .cloned();

        let recovered = replayed.ok_or_else(|| {
            TrellisError::NotFound(format!(
                "no completed transactions to recover '{}' from",
                entity_id
            ))
        })?;

        self.set(entity_id, recovered.clone())?;
        tracing::info!(entity_id = %entity_id, "Recovered attributes from transaction log");
        Ok(recovered)
    }

    fn cleanup_old_transactions(&mut self, entity_id: &str, retention_days: u32) -> usize {
        self.cleanup_old_transactions_at(entity_id, retention_days, Utc::now())
    }

    fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.attributes.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn logged_entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .logs
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

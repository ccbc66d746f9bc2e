// crates/trellis-store/src/snapshot.rs
//
// Plain-data snapshot of a trust store: one attribute record per entity and
// one ordered transaction log per entity. Serializes to JSON for transport
// to audit collaborators or for durable persistence outside the engine.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use trellis_core::error::TrellisError;
use trellis_core::transaction::Transaction;
use trellis_core::validation::validate_attribute;
use trellis_core::TrustAttribute;

use crate::memory::InMemoryTrustStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub attributes: BTreeMap<String, TrustAttribute>,
    #[serde(default)]
    pub transactions: BTreeMap<String, Vec<Transaction>>,
}

impl StoreSnapshot {
    pub fn to_json(&self) -> Result<String, TrellisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TrellisError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl InMemoryTrustStore {
    /// Capture the full store contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            attributes: self
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            transactions: self
                .logs()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot. Every attribute record is validated
    /// and every log record must be terminal and filed under its target.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, TrellisError> {
        let mut attributes = HashMap::with_capacity(snapshot.attributes.len());
        for (entity_id, attr) in snapshot.attributes {
            if attr.entity_id != entity_id {
                return Err(TrellisError::Validation(format!(
                    "snapshot entry '{}' holds attributes for '{}'",
                    entity_id, attr.entity_id
                )));
            }
            validate_attribute(&attr)?;
            attributes.insert(entity_id, attr);
        }

        let mut logs = HashMap::with_capacity(snapshot.transactions.len());
        for (entity_id, records) in snapshot.transactions {
            if let Some(bad) = records
                .iter()
                .find(|tx| tx.target_id != entity_id || !tx.status.is_terminal())
            {
                return Err(TrellisError::Validation(format!(
                    "transaction {} cannot be filed in the log of '{}'",
                    bad.transaction_id, entity_id
                )));
            }
            logs.insert(entity_id, records);
        }

        Ok(InMemoryTrustStore::from_parts(attributes, logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::traits::TrustStore;
    use trellis_core::transaction::TransactionKind;

    #[test]
    fn snapshot_survives_json() {
        let mut store = InMemoryTrustStore::new();
        let attr = TrustAttribute::new("a", 0.7).with_context("finance", 0.5);
        store
            .commit(Transaction::completed(TransactionKind::Registration, "a", attr))
            .unwrap();

        let json = store.snapshot().to_json().unwrap();
        let restored = InMemoryTrustStore::from_snapshot(StoreSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.get("a").unwrap(), store.get("a").unwrap());
        assert_eq!(restored.get_transaction_history("a").len(), 1);
    }

    #[test]
    fn missing_primary_record_is_recoverable() {
        let mut store = InMemoryTrustStore::new();
        store
            .commit(Transaction::completed(
                TransactionKind::Registration,
                "a",
                TrustAttribute::new("a", 0.45),
            ))
            .unwrap();

        let mut snapshot = store.snapshot();
        snapshot.attributes.remove("a");
        let mut damaged = InMemoryTrustStore::from_snapshot(snapshot).unwrap();
        assert!(!damaged.contains("a"));

        let recovered = damaged.recover_state("a").unwrap();
        assert!((recovered.base_score - 0.45).abs() < 1e-12);
        assert!(damaged.contains("a"));
    }

    #[test]
    fn rejects_out_of_range_snapshot() {
        let mut snapshot = StoreSnapshot::default();
        snapshot
            .attributes
            .insert("a".to_string(), TrustAttribute::new("a", 3.0));
        assert!(InMemoryTrustStore::from_snapshot(snapshot).is_err());
    }
}

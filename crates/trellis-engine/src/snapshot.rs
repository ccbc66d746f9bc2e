// crates/trellis-engine/src/snapshot.rs
//
// Whole-domain snapshot in plain data: config, attribute records, transaction
// logs, relationship edges, boundaries and audit trails. Pending propagation
// transactions are not captured; only terminal transactions are persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use trellis_core::error::TrellisError;
use trellis_core::{EngineConfig, TrustBoundary};
use trellis_inheritance::{InheritanceHandler, Relationship, RelationshipGraph};
use trellis_store::{InMemoryTrustStore, StoreSnapshot};
use trellis_verify::{AuditTrail, VerificationSystem};

use crate::domain::TrustDomain;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub store: StoreSnapshot,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub boundaries: Vec<TrustBoundary>,
    #[serde(default)]
    pub audit: BTreeMap<String, AuditTrail>,
}

impl DomainSnapshot {
    pub fn to_json(&self) -> Result<String, TrellisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TrellisError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TrustDomain<InMemoryTrustStore> {
    /// Capture the full domain state.
    pub fn snapshot(&self) -> DomainSnapshot {
        DomainSnapshot {
            config: self.config().clone(),
            store: self.store().snapshot(),
            relationships: self.inheritance().graph().edges(),
            boundaries: self.verification().boundaries().cloned().collect(),
            audit: self.verification().audit_trails(),
        }
    }

    /// Rebuild a domain. Attribute bounds, graph acyclicity, boundary
    /// thresholds and audit chain integrity are all re-checked.
    pub fn restore(snapshot: DomainSnapshot) -> Result<Self, TrellisError> {
        snapshot.config.validate()?;
        let store = InMemoryTrustStore::from_snapshot(snapshot.store)?;
        let graph = RelationshipGraph::from_edges(snapshot.relationships)?;
        let inheritance = InheritanceHandler::with_graph(&snapshot.config, graph);
        let verification = VerificationSystem::restore(snapshot.boundaries, snapshot.audit)?;
        tracing::info!(entities = store.len(), "Restored trust domain from snapshot");
        Ok(TrustDomain::from_parts(
            snapshot.config,
            store,
            inheritance,
            verification,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityUpdate;
    use trellis_core::{TransactionStatus, TrustAttribute};

    #[test]
    fn snapshot_restores_everything() {
        let mut domain = TrustDomain::new(EngineConfig::default()).unwrap();
        domain.upsert_entity(EntityUpdate::new("root", 0.9)).unwrap();
        domain.register_inheritance_relationship("root", "leaf").unwrap();
        domain.inherit("leaf").unwrap();
        domain
            .register_trust_boundary(TrustBoundary::new("prod", 0.5).with_inheritance())
            .unwrap();
        domain.verify_all_boundaries("leaf");

        let json = domain.snapshot().to_json().unwrap();
        let restored = TrustDomain::restore(DomainSnapshot::from_json(&json).unwrap()).unwrap();

        assert_eq!(restored.get_entity("leaf").unwrap(), domain.get_entity("leaf").unwrap());
        assert_eq!(restored.get_parents("leaf"), vec!["root".to_string()]);
        assert_eq!(restored.audit_trust_verification("leaf").len(), 1);
        assert_eq!(restored.get_transaction_history("leaf").len(), 1);
    }

    #[test]
    fn full_precision_scores_survive_json() {
        let seeds = [
            0.026731580134663598,
            1.0 / 3.0,
            0.1 + 0.2,
            0.9876543210987654,
            std::f64::consts::FRAC_1_SQRT_2,
        ];
        let mut domain = TrustDomain::new(EngineConfig::default()).unwrap();
        let mut propagations = Vec::new();
        for (i, seed) in seeds.iter().enumerate() {
            let root = format!("root{}", i);
            let hop = format!("hop{}", i);
            let leaf = format!("leaf{}", i);
            domain
                .upsert_entity(EntityUpdate::new(root.clone(), *seed).with_context("ops", seed / 3.0))
                .unwrap();
            let tx = domain
                .begin_propagation(&root, &hop, TrustAttribute::new(hop.clone(), 0.0))
                .unwrap();
            domain.execute_propagation(tx).unwrap();
            propagations.push(tx);
            domain.register_inheritance_relationship(&hop, &leaf).unwrap();
            domain.inherit(&leaf).unwrap();
            for id in [&root, &hop, &leaf] {
                domain.verify_trust_level(id, 0.25);
            }
        }

        let snapshot = domain.snapshot();
        let json = snapshot.to_json().unwrap();
        let restored = TrustDomain::restore(DomainSnapshot::from_json(&json).unwrap()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        for tx in propagations {
            assert_eq!(
                restored.get_transaction_status(tx).unwrap(),
                TransactionStatus::Completed
            );
        }
    }

    #[test]
    fn restore_rejects_cyclic_edges() {
        let snapshot = DomainSnapshot {
            relationships: vec![
                Relationship { parent_id: "a".into(), child_id: "b".into() },
                Relationship { parent_id: "b".into(), child_id: "a".into() },
            ],
            ..DomainSnapshot::default()
        };
        assert!(TrustDomain::restore(snapshot).is_err());
    }
}

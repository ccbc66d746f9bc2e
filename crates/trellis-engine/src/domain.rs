// crates/trellis-engine/src/domain.rs
//
// TrustDomain: explicit owner of every map the engine uses.
//
// Data flow:
//   entity updates / relationships -> inheritance handler computes derived attributes
//   -> propagation manager commits transfers -> trust store logs and persists
//   -> verification system reads attributes on demand and appends to the audit trail

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::transaction::{Transaction, TransactionKind, TransactionStatus};
use trellis_core::{
    EngineConfig, Tier, TierPromotion, TrustAttribute, TrustBoundary, VerificationResult,
    VERIFIED_STATUS,
};
use trellis_inheritance::InheritanceHandler;
use trellis_propagation::PropagationManager;
use trellis_store::InMemoryTrustStore;
use trellis_verify::VerificationSystem;

/// Attribute update pushed in by an upstream collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub entity_id: String,
    pub base_score: f64,
    #[serde(default)]
    pub context_scores: BTreeMap<String, f64>,
}

impl EntityUpdate {
    pub fn new(entity_id: impl Into<String>, base_score: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            base_score,
            context_scores: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>, score: f64) -> Self {
        self.context_scores.insert(context.into(), score);
        self
    }
}

/// One independent trust domain.
#[derive(Debug)]
pub struct TrustDomain<S: TrustStore = InMemoryTrustStore> {
    config: EngineConfig,
    store: S,
    propagation: PropagationManager,
    inheritance: InheritanceHandler,
    verification: VerificationSystem,
}

impl TrustDomain<InMemoryTrustStore> {
    /// Create an empty in-memory domain.
    pub fn new(config: EngineConfig) -> Result<Self, TrellisError> {
        Self::with_store(config, InMemoryTrustStore::new())
    }
}

impl<S: TrustStore> TrustDomain<S> {
    /// Create a domain over a caller-supplied store.
    pub fn with_store(config: EngineConfig, store: S) -> Result<Self, TrellisError> {
        config.validate()?;
        Ok(Self {
            propagation: PropagationManager::from_store(&config, &store),
            inheritance: InheritanceHandler::new(&config),
            verification: VerificationSystem::new(),
            config,
            store,
        })
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        store: S,
        inheritance: InheritanceHandler,
        verification: VerificationSystem,
    ) -> Self {
        Self {
            propagation: PropagationManager::from_store(&config, &store),
            config,
            store,
            inheritance,
            verification,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn inheritance(&self) -> &InheritanceHandler {
        &self.inheritance
    }

    pub(crate) fn verification(&self) -> &VerificationSystem {
        &self.verification
    }

    // -----------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------

    /// Create an entity on first registration, or refresh its base score and
    /// the supplied context scores. Chain, tier, status and history are kept.
    pub fn upsert_entity(&mut self, update: EntityUpdate) -> Result<TrustAttribute, TrellisError> {
        let mut attr = self
            .store
            .get(&update.entity_id)
            .unwrap_or_else(|_| TrustAttribute::new(update.entity_id.clone(), 0.0));
        attr.base_score = update.base_score;
        attr.context_scores.extend(update.context_scores);
        attr.touch();

        let entity_id = attr.entity_id.clone();
        let committed = self.store.commit(Transaction::completed(
            TransactionKind::Registration,
            entity_id.clone(),
            attr,
        ))?;
        tracing::info!(entity_id = %entity_id, base_score = committed.base_score, "Entity attributes updated");
        Ok(committed)
    }

    pub fn get_entity(&self, entity_id: &str) -> Result<TrustAttribute, TrellisError> {
        self.store.get(entity_id)
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.store.entity_ids()
    }

    /// Move an entity to a new tier and record the change in its history.
    pub fn promote_tier(&mut self, entity_id: &str, tier: Tier) -> Result<TrustAttribute, TrellisError> {
        let mut attr = self.store.get(entity_id)?;
        if attr.tier == Some(tier) {
            return Err(TrellisError::Validation(format!(
                "entity '{}' already holds tier {}",
                entity_id, tier
            )));
        }
        let now = Utc::now();
        attr.promotion_history.push(TierPromotion {
            from_tier: attr.tier,
            to_tier: Some(tier),
            timestamp: now,
        });
        attr.tier = Some(tier);
        attr.last_updated = now;

        let committed = self.store.commit(Transaction::completed(
            TransactionKind::Promotion,
            entity_id,
            attr,
        ))?;
        tracing::info!(entity_id = %entity_id, tier = %tier, "Tier changed");
        Ok(committed)
    }

    /// Tag an entity as verified. Rejected when its chain is empty.
    pub fn mark_verified(&mut self, entity_id: &str) -> Result<TrustAttribute, TrellisError> {
        let mut attr = self.store.get(entity_id)?;
        attr.verification_status = Some(VERIFIED_STATUS.to_string());
        attr.touch();
        let committed = self.store.commit(Transaction::completed(
            TransactionKind::Verification,
            entity_id,
            attr,
        ))?;
        tracing::info!(entity_id = %entity_id, "Entity marked verified");
        Ok(committed)
    }

    // -----------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------

    pub fn begin_propagation(
        &mut self,
        source_id: &str,
        target_id: &str,
        proposed_attributes: TrustAttribute,
    ) -> Result<Uuid, TrellisError> {
        self.propagation
            .begin_propagation(source_id, target_id, proposed_attributes)
    }

    pub fn execute_propagation(&mut self, transaction_id: Uuid) -> Result<TrustAttribute, TrellisError> {
        self.propagation
            .execute_propagation(&mut self.store, transaction_id)
    }

    pub fn verify_propagation(&self, source_id: &str, target_id: &str) -> bool {
        self.propagation
            .verify_propagation(&self.store, source_id, target_id)
    }

    pub fn rollback_propagation(&mut self, transaction_id: Uuid) -> Result<(), TrellisError> {
        self.propagation
            .rollback_propagation(&mut self.store, transaction_id)
    }

    pub fn get_transaction_status(&self, transaction_id: Uuid) -> Result<TransactionStatus, TrellisError> {
        self.propagation
            .get_transaction_status(&self.store, transaction_id)
    }

    /// Begin and immediately execute a propagation.
    pub fn propagate(
        &mut self,
        source_id: &str,
        target_id: &str,
        proposed_attributes: TrustAttribute,
    ) -> Result<TrustAttribute, TrellisError> {
        let tx = self.begin_propagation(source_id, target_id, proposed_attributes)?;
        self.execute_propagation(tx)
    }

    // -----------------------------------------------------------------
    // Inheritance
    // -----------------------------------------------------------------

    pub fn register_inheritance_relationship(&mut self, parent_id: &str, child_id: &str) -> Result<(), TrellisError> {
        self.inheritance
            .register_inheritance_relationship(parent_id, child_id)
    }

    pub fn unregister_inheritance_relationship(&mut self, parent_id: &str, child_id: &str) -> bool {
        self.inheritance
            .unregister_inheritance_relationship(parent_id, child_id)
    }

    pub fn get_parents(&self, entity_id: &str) -> Vec<String> {
        self.inheritance.get_parents(entity_id)
    }

    pub fn get_children(&self, entity_id: &str) -> Vec<String> {
        self.inheritance.get_children(entity_id)
    }

    pub fn get_inheritance_chain(&self, entity_id: &str) -> BTreeSet<String> {
        self.inheritance.get_inheritance_chain(entity_id)
    }

    pub fn calculate_inherited_trust(
        &self,
        parent_ids: &[String],
        child_id: &str,
    ) -> Result<TrustAttribute, TrellisError> {
        self.inheritance
            .calculate_inherited_trust(&self.store, parent_ids, child_id)
    }

    /// Recompute a child from its registered parents and commit it.
    pub fn inherit(&mut self, child_id: &str) -> Result<TrustAttribute, TrellisError> {
        self.inheritance
            .apply_inherited_trust(&mut self.store, child_id)
    }

    pub fn verify_inheritance_chain(&self, entity_id: &str) -> bool {
        self.inheritance
            .verify_inheritance_chain(&self.store, entity_id)
    }

    pub fn detect_inheritance_conflict(&self, entity_id: &str) -> Result<(), TrellisError> {
        self.inheritance
            .detect_inheritance_conflict(&self.store, entity_id)
    }

    pub fn resolve_inheritance_conflicts(&mut self, entity_id: &str) -> Result<bool, TrellisError> {
        self.inheritance
            .resolve_inheritance_conflicts(&mut self.store, entity_id)
    }

    // -----------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------

    pub fn register_trust_boundary(&mut self, boundary: TrustBoundary) -> Result<(), TrellisError> {
        self.verification.register_trust_boundary(boundary)
    }

    pub fn verify_trust_level(&mut self, entity_id: &str, required_level: f64) -> VerificationResult {
        self.verification
            .verify_trust_level(&self.store, self.inheritance.graph(), entity_id, required_level)
    }

    pub fn enforce_trust_boundary(&mut self, entity_id: &str, boundary: &TrustBoundary) -> VerificationResult {
        self.verification
            .enforce_trust_boundary(&self.store, self.inheritance.graph(), entity_id, boundary)
    }

    pub fn verify_all_boundaries(&mut self, entity_id: &str) -> BTreeMap<String, VerificationResult> {
        self.verification
            .verify_all_boundaries(&self.store, self.inheritance.graph(), entity_id)
    }

    pub fn audit_trust_verification(&self, entity_id: &str) -> &[VerificationResult] {
        self.verification.audit_trust_verification(entity_id)
    }

    pub fn is_reverification_due(
        &self,
        entity_id: &str,
        boundary_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, TrellisError> {
        self.verification
            .is_reverification_due(entity_id, boundary_id, now)
    }

    // -----------------------------------------------------------------
    // Store maintenance
    // -----------------------------------------------------------------

    pub fn get_transaction_history(&self, entity_id: &str) -> Vec<Transaction> {
        self.store.get_transaction_history(entity_id)
    }

    pub fn recover_state(&mut self, entity_id: &str) -> Result<TrustAttribute, TrellisError> {
        self.store.recover_state(entity_id)
    }

    /// Apply the configured retention window to every entity's log.
    pub fn cleanup_transactions(&mut self) -> usize {
        let retention_days = self.config.retention_days;
        let removed: usize = self
            .store
            .logged_entity_ids()
            .iter()
            .map(|id| self.store.cleanup_old_transactions(id, retention_days))
            .sum();
        let forgotten = self.propagation.prune_archive(&self.store);
        tracing::info!(removed, forgotten, retention_days, "Transaction retention sweep finished");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> TrustDomain {
        TrustDomain::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(TrustDomain::new(EngineConfig::default().with_decay_factor(2.0)).is_err());
    }

    #[test]
    fn upsert_creates_then_refreshes() {
        let mut d = domain();
        d.upsert_entity(EntityUpdate::new("a", 0.4).with_context("ops", 0.3)).unwrap();
        d.upsert_entity(EntityUpdate::new("a", 0.6).with_context("finance", 0.9)).unwrap();

        let a = d.get_entity("a").unwrap();
        assert!((a.base_score - 0.6).abs() < 1e-12);
        assert_eq!(a.context_scores.len(), 2);
        assert_eq!(d.get_transaction_history("a").len(), 2);
    }

    #[test]
    fn rejected_upsert_changes_nothing() {
        let mut d = domain();
        d.upsert_entity(EntityUpdate::new("a", 0.4)).unwrap();
        assert!(d.upsert_entity(EntityUpdate::new("a", 1.7)).is_err());
        assert!((d.get_entity("a").unwrap().base_score - 0.4).abs() < 1e-12);
        assert_eq!(d.get_transaction_history("a").len(), 1);
    }

    #[test]
    fn promotion_appends_history() {
        let mut d = domain();
        d.upsert_entity(EntityUpdate::new("a", 0.4)).unwrap();
        d.promote_tier("a", Tier::Bronze).unwrap();
        d.promote_tier("a", Tier::Gold).unwrap();
        assert!(d.promote_tier("a", Tier::Gold).is_err());

        let a = d.get_entity("a").unwrap();
        assert_eq!(a.tier, Some(Tier::Gold));
        assert_eq!(a.promotion_history.len(), 2);
        assert_eq!(a.promotion_history[0].from_tier, None);
        assert_eq!(a.promotion_history[1].from_tier, Some(Tier::Bronze));
    }

    #[test]
    fn mark_verified_requires_chain() {
        let mut d = domain();
        d.upsert_entity(EntityUpdate::new("root", 0.9)).unwrap();
        d.upsert_entity(EntityUpdate::new("leaf", 0.1)).unwrap();
        assert!(d.mark_verified("leaf").is_err());

        d.register_inheritance_relationship("root", "leaf").unwrap();
        d.inherit("leaf").unwrap();
        let leaf = d.mark_verified("leaf").unwrap();
        assert_eq!(leaf.verification_status.as_deref(), Some(VERIFIED_STATUS));

        let history = d.get_transaction_history("leaf");
        assert_eq!(history.last().unwrap().kind, TransactionKind::Verification);
    }

    #[test]
    fn inherit_keeps_status_and_tier() {
        let mut d = domain();
        d.upsert_entity(EntityUpdate::new("root", 0.5)).unwrap();
        d.register_inheritance_relationship("root", "leaf").unwrap();
        d.inherit("leaf").unwrap();
        d.promote_tier("leaf", Tier::Silver).unwrap();
        d.mark_verified("leaf").unwrap();

        d.upsert_entity(EntityUpdate::new("root", 1.0)).unwrap();
        let leaf = d.inherit("leaf").unwrap();
        assert_eq!(leaf.tier, Some(Tier::Silver));
        assert!(leaf.verification_status.is_some());
        assert!((leaf.base_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn retention_sweep_reaches_every_log() {
        let aged = Utc::now() - chrono::Duration::days(90);
        let mut store = InMemoryTrustStore::new();
        let mut old_update = Transaction::completed(
            TransactionKind::Registration,
            "a",
            TrustAttribute::new("a", 0.2),
        );
        old_update.created_at = aged;
        store.append_transaction(old_update).unwrap();

        // Log-only entity: a failed propagation to a target that never existed.
        let mut old_failure = Transaction::pending(
            TransactionKind::Propagation,
            "ghost",
            "c",
            TrustAttribute::new("c", 0.0),
        );
        old_failure.status = TransactionStatus::Failed;
        old_failure.created_at = aged;
        let old_failure_id = old_failure.transaction_id;
        store.append_transaction(old_failure).unwrap();

        let mut d = TrustDomain::with_store(EngineConfig::default(), store).unwrap();
        d.upsert_entity(EntityUpdate::new("a", 0.5)).unwrap();
        assert_eq!(d.get_transaction_status(old_failure_id).unwrap(), TransactionStatus::Failed);

        assert_eq!(d.cleanup_transactions(), 2);
        assert_eq!(d.get_transaction_history("a").len(), 1);
        assert!(d.get_transaction_history("c").is_empty());
        assert!(d.get_transaction_status(old_failure_id).is_err());
        assert!((d.get_entity("a").unwrap().base_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn independent_domains_do_not_share_state() {
        let mut first = domain();
        let second = domain();
        first.upsert_entity(EntityUpdate::new("a", 0.4)).unwrap();
        assert!(second.get_entity("a").is_err());
    }
}

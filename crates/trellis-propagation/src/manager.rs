// crates/trellis-propagation/src/manager.rs
//
// Propagation manager and its transaction state machine.
//
//   Pending -> Executing -> Completed | Failed
//   Pending -> RolledBack
//
// Execution formula (decay factor d, default 0.8):
//   target.base_score        = source.base_score * d
//   target.context_scores[k] = source.context_scores[k] * d   for every source key k
//   target.inheritance_chain  gains source_id (idempotent)

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::transaction::{Transaction, TransactionKind, TransactionStatus};
use trellis_core::validation::validate_attribute;
use trellis_core::{EngineConfig, TrustAttribute};

/// Owns propagation transactions while they are in flight and commits
/// completed ones through the trust store.
///
/// Once a transaction reaches a terminal status it lives only in its
/// target's log; `archived` remembers which log to look in.
#[derive(Debug, Clone)]
pub struct PropagationManager {
    decay_factor: f64,
    live: HashMap<Uuid, Transaction>,
    archived: HashMap<Uuid, String>,
}

impl PropagationManager {
    /// Create a manager using the configured decay factor.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            decay_factor: config.decay_factor,
            live: HashMap::new(),
            archived: HashMap::new(),
        }
    }

    /// Create a manager whose archive index covers every propagation
    /// record already in the store's logs.
    pub fn from_store(config: &EngineConfig, store: &dyn TrustStore) -> Self {
        let mut manager = Self::new(config);
        for entity_id in store.logged_entity_ids() {
            for tx in store.get_transaction_history(&entity_id) {
                if tx.kind == TransactionKind::Propagation {
                    manager.archived.insert(tx.transaction_id, entity_id.clone());
                }
            }
        }
        manager
    }

    pub fn decay_factor(&self) -> f64 {
        self.decay_factor
    }

    /// Open a pending transaction after validating the proposal.
    ///
    /// The proposal is re-keyed to `target_id`. Nothing is created when
    /// validation fails.
    pub fn begin_propagation(
        &mut self,
        source_id: &str,
        target_id: &str,
        mut proposed_attributes: TrustAttribute,
    ) -> Result<Uuid, TrellisError> {
        if source_id.trim().is_empty() || target_id.trim().is_empty() {
            return Err(TrellisError::Validation(
                "source_id and target_id must not be empty".to_string(),
            ));
        }
        if source_id == target_id {
            return Err(TrellisError::Validation(format!(
                "entity '{}' cannot propagate trust to itself",
                source_id
            )));
        }

        proposed_attributes.entity_id = target_id.to_string();
        if let Err(e) = validate_attribute(&proposed_attributes) {
            tracing::warn!(
                source_id = %source_id,
                target_id = %target_id,
                "Rejected propagation proposal: {}",
                e
            );
            return Err(e);
        }

        let tx = Transaction::pending(
            TransactionKind::Propagation,
            source_id,
            target_id,
            proposed_attributes,
        );
        let id = tx.transaction_id;
        tracing::debug!(transaction_id = %id, source_id = %source_id, target_id = %target_id, "Propagation begun");
        self.live.insert(id, tx);
        Ok(id)
    }

    /// Execute a pending transaction and commit the decayed scores to the
    /// target. Any failure leaves the store's attributes untouched and marks
    /// the transaction `Failed`.
    pub fn execute_propagation(
        &mut self,
        store: &mut dyn TrustStore,
        transaction_id: Uuid,
    ) -> Result<TrustAttribute, TrellisError> {
        let Some(mut tx) = self.live.remove(&transaction_id) else {
            return Err(self.not_in_flight(store, transaction_id));
        };
        if let Err(e) = transition(&mut tx, TransactionStatus::Executing) {
            self.live.insert(transaction_id, tx);
            return Err(e);
        }

        let outcome = commit_decayed(store, &tx, self.decay_factor);
        tx.completed_at = Some(Utc::now());

        match outcome {
            Ok(committed) => {
                tracing::info!(
                    transaction_id = %transaction_id,
                    source_id = %tx.source_id,
                    target_id = %tx.target_id,
                    base_score = committed.base_score,
                    "Propagation committed"
                );
                self.archived.insert(transaction_id, tx.target_id);
                Ok(committed)
            }
            Err(e) => {
                tx.status = TransactionStatus::Failed;
                tracing::warn!(
                    transaction_id = %transaction_id,
                    source_id = %tx.source_id,
                    target_id = %tx.target_id,
                    "Propagation failed: {}",
                    e
                );
                self.archive(store, tx);
                Err(e)
            }
        }
    }

    /// Membership check: does the target's stored chain currently list the source?
    pub fn verify_propagation(&self, store: &dyn TrustStore, source_id: &str, target_id: &str) -> bool {
        store
            .get(target_id)
            .map(|target| target.chain_contains(source_id))
            .unwrap_or(false)
    }

    /// Discard a still-pending transaction. The rolled-back record is
    /// archived to the target's log; attributes are never touched.
    pub fn rollback_propagation(
        &mut self,
        store: &mut dyn TrustStore,
        transaction_id: Uuid,
    ) -> Result<(), TrellisError> {
        let Some(mut tx) = self.live.remove(&transaction_id) else {
            return Err(self.not_in_flight(store, transaction_id));
        };
        if let Err(e) = transition(&mut tx, TransactionStatus::RolledBack) {
            self.live.insert(transaction_id, tx);
            return Err(e);
        }
        tx.completed_at = Some(Utc::now());
        tracing::info!(transaction_id = %transaction_id, target_id = %tx.target_id, "Propagation rolled back");
        self.archive(store, tx);
        Ok(())
    }

    /// Status of an in-flight transaction, or of an archived one as recorded
    /// in its target's log.
    pub fn get_transaction_status(
        &self,
        store: &dyn TrustStore,
        transaction_id: Uuid,
    ) -> Result<TransactionStatus, TrellisError> {
        self.get_transaction(store, transaction_id)
            .map(|tx| tx.status)
            .ok_or_else(|| TrellisError::NotFound(format!("transaction {}", transaction_id)))
    }

    pub fn get_transaction(&self, store: &dyn TrustStore, transaction_id: Uuid) -> Option<Transaction> {
        if let Some(tx) = self.live.get(&transaction_id) {
            return Some(tx.clone());
        }
        let target_id = self.archived.get(&transaction_id)?;
        store
            .get_transaction_history(target_id)
            .into_iter()
            .find(|tx| tx.transaction_id == transaction_id)
    }

    /// Ids of transactions still awaiting execute or rollback, oldest first.
    pub fn pending_transactions(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .live
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .map(|tx| tx.transaction_id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of transactions held in memory (pending, or terminal but not
    /// yet archivable).
    pub fn in_flight(&self) -> usize {
        self.live.len()
    }

    /// Forget archive entries whose log record the retention sweep removed.
    pub fn prune_archive(&mut self, store: &dyn TrustStore) -> usize {
        let before = self.archived.len();
        self.archived.retain(|id, target_id| {
            store
                .get_transaction_history(target_id)
                .iter()
                .any(|tx| tx.transaction_id == *id)
        });
        before - self.archived.len()
    }

    /// Move a terminal transaction to its target's log. If the store refuses
    /// the record it stays in memory so its status remains queryable.
    fn archive(&mut self, store: &mut dyn TrustStore, tx: Transaction) {
        let id = tx.transaction_id;
        let target_id = tx.target_id.clone();
        match store.append_transaction(tx.clone()) {
            Ok(()) => {
                self.archived.insert(id, target_id);
            }
            Err(e) => {
                tracing::warn!(transaction_id = %id, "Could not archive transaction: {}", e);
                self.live.insert(id, tx);
            }
        }
    }

    fn not_in_flight(&self, store: &dyn TrustStore, transaction_id: Uuid) -> TrellisError {
        match self.get_transaction(store, transaction_id) {
            Some(tx) => TrellisError::TransactionState(format!(
                "transaction {} is already {}",
                transaction_id, tx.status
            )),
            None => TrellisError::NotFound(format!("transaction {}", transaction_id)),
        }
    }
}

fn transition(tx: &mut Transaction, next: TransactionStatus) -> Result<(), TrellisError> {
    if !tx.status.can_transition_to(next) {
        return Err(TrellisError::TransactionState(format!(
            "transaction {} cannot move from {} to {}",
            tx.transaction_id, tx.status, next
        )));
    }
    tx.status = next;
    Ok(())
}

/// Compute the target's new attributes and commit them. The store is only
/// written by the final `commit`, which validates before writing.
fn commit_decayed(
    store: &mut dyn TrustStore,
    tx: &Transaction,
    decay_factor: f64,
) -> Result<TrustAttribute, TrellisError> {
    let source = store.get(&tx.source_id).map_err(|_| {
        TrellisError::NotFound(format!(
            "source entity '{}' has no stored attributes",
            tx.source_id
        ))
    })?;

    let mut target = store
        .get(&tx.target_id)
        .unwrap_or_else(|_| tx.proposed_attributes.clone());
    target.base_score = source.base_score * decay_factor;
    for (context, score) in &source.context_scores {
        target.context_scores.insert(context.clone(), score * decay_factor);
    }
    target.add_to_chain(&source.entity_id);
    target.touch();

    let mut record = tx.clone();
    record.status = TransactionStatus::Completed;
    record.completed_at = Some(Utc::now());
    record.committed_attributes = Some(target);
    store.commit(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_store::InMemoryTrustStore;

    fn seeded() -> (PropagationManager, InMemoryTrustStore) {
        let mut store = InMemoryTrustStore::new();
        store
            .set("a", TrustAttribute::new("a", 0.9).with_context("finance", 0.5))
            .unwrap();
        (PropagationManager::new(&EngineConfig::default()), store)
    }

    #[test]
    fn execute_applies_decay_to_base_and_contexts() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let committed = pm.execute_propagation(&mut store, tx).unwrap();

        assert!((committed.base_score - 0.72).abs() < 1e-9);
        assert!((committed.context_score("finance").unwrap() - 0.4).abs() < 1e-9);
        assert_eq!(pm.get_transaction_status(&store, tx).unwrap(), TransactionStatus::Completed);
        assert_eq!(store.get("b").unwrap(), committed);
    }

    #[test]
    fn repeated_propagation_keeps_single_chain_entry() {
        let (mut pm, mut store) = seeded();
        for _ in 0..2 {
            let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
            pm.execute_propagation(&mut store, tx).unwrap();
        }
        let b = store.get("b").unwrap();
        assert_eq!(b.inheritance_chain.iter().filter(|e| *e == "a").count(), 1);
    }

    #[test]
    fn existing_target_keeps_unrelated_contexts() {
        let (mut pm, mut store) = seeded();
        store
            .set("b", TrustAttribute::new("b", 0.1).with_context("ops", 0.3))
            .unwrap();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let b = pm.execute_propagation(&mut store, tx).unwrap();
        assert!((b.context_score("ops").unwrap() - 0.3).abs() < 1e-12);
        assert!(b.context_score("finance").is_some());
    }

    #[test]
    fn invalid_proposal_creates_no_transaction() {
        let (mut pm, _store) = seeded();
        assert!(pm.begin_propagation("a", "b", TrustAttribute::new("b", 1.5)).is_err());
        assert!(pm.begin_propagation("a", "a", TrustAttribute::new("a", 0.5)).is_err());
        assert!(pm.pending_transactions().is_empty());
    }

    #[test]
    fn missing_source_fails_and_leaves_store_untouched() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("ghost", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let err = pm.execute_propagation(&mut store, tx).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(pm.get_transaction_status(&store, tx).unwrap(), TransactionStatus::Failed);
        assert!(!store.contains("b"));
        assert_eq!(store.get_transaction_history("b")[0].status, TransactionStatus::Failed);
    }

    #[test]
    fn execute_twice_is_a_state_error() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        pm.execute_propagation(&mut store, tx).unwrap();
        let err = pm.execute_propagation(&mut store, tx).unwrap_err();
        assert_eq!(err.kind(), "transaction_state");
        assert_eq!(pm.get_transaction_status(&store, tx).unwrap(), TransactionStatus::Completed);
    }

    #[test]
    fn rollback_only_while_pending() {
        let (mut pm, mut store) = seeded();
        let pending = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        pm.rollback_propagation(&mut store, pending).unwrap();
        assert_eq!(pm.get_transaction_status(&store, pending).unwrap(), TransactionStatus::RolledBack);
        assert!(!store.contains("b"));
        assert!(pm.execute_propagation(&mut store, pending).is_err());

        let done = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let committed = pm.execute_propagation(&mut store, done).unwrap();
        let err = pm.rollback_propagation(&mut store, done).unwrap_err();
        assert_eq!(err.kind(), "transaction_state");
        assert_eq!(store.get("b").unwrap(), committed);
    }

    #[test]
    fn verify_tracks_chain_membership() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        pm.execute_propagation(&mut store, tx).unwrap();
        assert!(pm.verify_propagation(&store, "a", "b"));

        let mut b = store.get("b").unwrap();
        b.remove_from_chain("a");
        store.set("b", b).unwrap();
        assert!(!pm.verify_propagation(&store, "a", "b"));
    }

    #[test]
    fn unknown_transaction_is_not_found() {
        let (pm, store) = seeded();
        assert!(pm.get_transaction_status(&store, Uuid::now_v7()).is_err());
    }

    #[test]
    fn terminal_transactions_leave_memory_but_stay_queryable() {
        let (mut pm, mut store) = seeded();
        let done = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let dropped = pm.begin_propagation("a", "c", TrustAttribute::new("c", 0.0)).unwrap();
        let failed = pm.begin_propagation("ghost", "d", TrustAttribute::new("d", 0.0)).unwrap();
        assert_eq!(pm.in_flight(), 3);

        pm.execute_propagation(&mut store, done).unwrap();
        pm.rollback_propagation(&mut store, dropped).unwrap();
        assert!(pm.execute_propagation(&mut store, failed).is_err());

        assert_eq!(pm.in_flight(), 0);
        assert_eq!(pm.get_transaction_status(&store, done).unwrap(), TransactionStatus::Completed);
        assert_eq!(pm.get_transaction_status(&store, dropped).unwrap(), TransactionStatus::RolledBack);
        assert_eq!(pm.get_transaction_status(&store, failed).unwrap(), TransactionStatus::Failed);
    }

    #[test]
    fn rebuilt_manager_answers_from_the_log() {
        let (mut pm, mut store) = seeded();
        let done = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        pm.execute_propagation(&mut store, done).unwrap();
        let failed = pm.begin_propagation("ghost", "c", TrustAttribute::new("c", 0.0)).unwrap();
        assert!(pm.execute_propagation(&mut store, failed).is_err());

        let mut rebuilt = PropagationManager::from_store(&EngineConfig::default(), &store);
        assert_eq!(rebuilt.get_transaction_status(&store, done).unwrap(), TransactionStatus::Completed);
        assert_eq!(rebuilt.get_transaction_status(&store, failed).unwrap(), TransactionStatus::Failed);
        let err = rebuilt.rollback_propagation(&mut store, done).unwrap_err();
        assert_eq!(err.kind(), "transaction_state");
    }

    #[test]
    fn pruned_log_records_drop_from_the_index() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        pm.execute_propagation(&mut store, tx).unwrap();
        assert_eq!(pm.prune_archive(&store), 0);

        store.cleanup_old_transactions_at("b", 1, Utc::now() + chrono::Duration::days(5));
        assert_eq!(pm.prune_archive(&store), 1);
        assert!(pm.get_transaction_status(&store, tx).is_err());
    }

    #[test]
    fn completed_log_record_allows_recovery() {
        let (mut pm, mut store) = seeded();
        let tx = pm.begin_propagation("a", "b", TrustAttribute::new("b", 0.0)).unwrap();
        let committed = pm.execute_propagation(&mut store, tx).unwrap();
        let recovered = store.recover_state("b").unwrap();
        assert_eq!(recovered, committed);
    }
}

// crates/trellis-inheritance/src/handler.rs
//
// Inherited trust computation over the relationship graph.
//
// For parents P = {p1..pn} and decay factor d:
//   child.base_score        = sum(p.base_score * d) / n
//   child.context_scores[k] = sum(p.context_scores[k] * d for p defining k) / divisor
//     where divisor = n                              (DivisorPolicy::AllParents)
//                   = |{p in P : p defines k}|       (DivisorPolicy::DefiningParents)
//   child.inheritance_chain = P

use std::collections::{BTreeMap, BTreeSet};

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::transaction::{Transaction, TransactionKind};
use trellis_core::{DivisorPolicy, EngineConfig, TrustAttribute};

use crate::graph::RelationshipGraph;

/// Relaxed chain check: every direct parent appears in the stored chain.
/// Extra chain entries and ordering are ignored.
pub fn chain_covers_parents(attr: &TrustAttribute, parents: &[String]) -> bool {
    parents.iter().all(|p| attr.chain_contains(p))
}

/// Maintains the relationship graph and derives children's attributes.
#[derive(Debug, Clone)]
pub struct InheritanceHandler {
    graph: RelationshipGraph,
    decay_factor: f64,
    divisor_policy: DivisorPolicy,
    score_epsilon: f64,
}

impl InheritanceHandler {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_graph(config, RelationshipGraph::new())
    }

    /// Create a handler over an existing graph (used when restoring).
    pub fn with_graph(config: &EngineConfig, graph: RelationshipGraph) -> Self {
        Self {
            graph,
            decay_factor: config.decay_factor,
            divisor_policy: config.divisor_policy,
            score_epsilon: config.score_epsilon,
        }
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// Add a parent -> child edge. Self-edges and cycle-closing edges are
    /// rejected and leave the graph unchanged.
    pub fn register_inheritance_relationship(
        &mut self,
        parent_id: &str,
        child_id: &str,
    ) -> Result<(), TrellisError> {
        match self.graph.add_edge(parent_id, child_id) {
            Ok(()) => {
                tracing::info!(parent_id = %parent_id, child_id = %child_id, "Registered inheritance relationship");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(parent_id = %parent_id, child_id = %child_id, "Rejected inheritance relationship: {}", e);
                Err(e)
            }
        }
    }

    /// Remove an edge. The child's stored attributes are left as they are.
    pub fn unregister_inheritance_relationship(&mut self, parent_id: &str, child_id: &str) -> bool {
        let removed = self.graph.remove_edge(parent_id, child_id);
        if removed {
            tracing::info!(parent_id = %parent_id, child_id = %child_id, "Unregistered inheritance relationship");
        }
        removed
    }

    pub fn get_parents(&self, entity_id: &str) -> Vec<String> {
        self.graph.parents_of(entity_id)
    }

    pub fn get_children(&self, entity_id: &str) -> Vec<String> {
        self.graph.children_of(entity_id)
    }

    /// All transitive ancestors of `entity_id`.
    pub fn get_inheritance_chain(&self, entity_id: &str) -> BTreeSet<String> {
        self.graph.ancestors(entity_id)
    }

    /// Compute a child's inherited attributes from the listed parents.
    ///
    /// Duplicate parent ids are collapsed. Every parent must have stored
    /// attributes. The child's stored tier, status and promotion history
    /// are carried over when the child already exists.
    pub fn calculate_inherited_trust(
        &self,
        store: &dyn TrustStore,
        parent_ids: &[String],
        child_id: &str,
    ) -> Result<TrustAttribute, TrellisError> {
        let mut unique: Vec<&String> = Vec::with_capacity(parent_ids.len());
        for id in parent_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            return Err(TrellisError::Validation(format!(
                "cannot compute inherited trust for '{}' without parents",
                child_id
            )));
        }
        if unique.iter().any(|p| p.as_str() == child_id) {
            return Err(TrellisError::Validation(format!(
                "entity '{}' cannot inherit from itself",
                child_id
            )));
        }

        let parents = unique
            .iter()
            .map(|id| {
                store.get(id).map_err(|_| {
                    TrellisError::NotFound(format!("parent entity '{}' has no stored attributes", id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let n = parents.len() as f64;
        let d = self.decay_factor;

        let base_score = parents.iter().map(|p| p.base_score * d).sum::<f64>() / n;

        // context -> (sum of decayed scores, number of defining parents)
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for parent in &parents {
            for (context, score) in &parent.context_scores {
                let entry = sums.entry(context.clone()).or_insert((0.0, 0));
                entry.0 += score * d;
                entry.1 += 1;
            }
        }
        let context_scores = sums
            .into_iter()
            .map(|(context, (sum, defining))| {
                let divisor = match self.divisor_policy {
                    DivisorPolicy::AllParents => n,
                    DivisorPolicy::DefiningParents => defining as f64,
                };
                (context, sum / divisor)
            })
            .collect();

        let mut child = store
            .get(child_id)
            .unwrap_or_else(|_| TrustAttribute::new(child_id, 0.0));
        child.base_score = base_score;
        child.context_scores = context_scores;
        child.inheritance_chain = unique.into_iter().cloned().collect();
        child.touch();

        tracing::debug!(child_id = %child_id, parents = parents.len(), base_score, "Computed inherited trust");
        Ok(child)
    }

    /// Relaxed check that every direct parent appears in the stored chain.
    /// False for entities with no stored attributes.
    pub fn verify_inheritance_chain(&self, store: &dyn TrustStore, entity_id: &str) -> bool {
        match store.get(entity_id) {
            Ok(attr) => chain_covers_parents(&attr, &self.get_parents(entity_id)),
            Err(_) => false,
        }
    }

    /// Recompute a child from its current parents and commit the result.
    pub fn apply_inherited_trust(
        &self,
        store: &mut dyn TrustStore,
        child_id: &str,
    ) -> Result<TrustAttribute, TrellisError> {
        let parents = self.get_parents(child_id);
        let computed = self.calculate_inherited_trust(store, &parents, child_id)?;
        let record = Transaction::completed(
            TransactionKind::Inheritance { parents },
            child_id,
            computed,
        );
        let committed = store.commit(record)?;
        tracing::info!(child_id = %child_id, base_score = committed.base_score, "Committed inherited trust");
        Ok(committed)
    }

    /// Compare stored attributes with a fresh recomputation from the current
    /// parents. Returns `Conflict` describing the first mismatch found.
    pub fn detect_inheritance_conflict(
        &self,
        store: &dyn TrustStore,
        entity_id: &str,
    ) -> Result<(), TrellisError> {
        let stored = store.get(entity_id)?;
        let parents = self.get_parents(entity_id);
        if parents.is_empty() {
            return Ok(());
        }

        if !chain_covers_parents(&stored, &parents) {
            return Err(TrellisError::Conflict(format!(
                "inheritance chain of '{}' does not cover its parents",
                entity_id
            )));
        }

        let expected = self.calculate_inherited_trust(store, &parents, entity_id)?;
        if (stored.base_score - expected.base_score).abs() > self.score_epsilon {
            return Err(TrellisError::Conflict(format!(
                "stored base score {} of '{}' differs from inherited {}",
                stored.base_score, entity_id, expected.base_score
            )));
        }
        for (context, want) in &expected.context_scores {
            match stored.context_score(context) {
                Some(have) if (have - want).abs() <= self.score_epsilon => {}
                Some(have) => {
                    return Err(TrellisError::Conflict(format!(
                        "stored context '{}' score {} of '{}' differs from inherited {}",
                        context, have, entity_id, want
                    )))
                }
                None => {
                    return Err(TrellisError::Conflict(format!(
                        "entity '{}' is missing inherited context '{}'",
                        entity_id, context
                    )))
                }
            }
        }
        Ok(())
    }

    /// Overwrite an entity's stored attributes with a recomputation from its
    /// current parents, then re-run the relaxed chain check.
    pub fn resolve_inheritance_conflicts(
        &self,
        store: &mut dyn TrustStore,
        entity_id: &str,
    ) -> Result<bool, TrellisError> {
        if !store.contains(entity_id) {
            return Err(TrellisError::NotFound(format!("entity '{}'", entity_id)));
        }
        if !self.get_parents(entity_id).is_empty() {
            self.apply_inherited_trust(store, entity_id)?;
        }
        let verified = self.verify_inheritance_chain(store, entity_id);
        tracing::info!(entity_id = %entity_id, verified, "Resolved inheritance conflicts");
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_store::InMemoryTrustStore;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn handler() -> InheritanceHandler {
        InheritanceHandler::new(&EngineConfig::default())
    }

    #[test]
    fn two_parent_mean_of_decayed_scores() {
        let mut store = InMemoryTrustStore::new();
        store.set("parent1", TrustAttribute::new("parent1", 0.8)).unwrap();
        store.set("parent2", TrustAttribute::new("parent2", 0.6)).unwrap();

        let child = handler()
            .calculate_inherited_trust(&store, &ids(&["parent1", "parent2"]), "child")
            .unwrap();
        assert!((child.base_score - 0.56).abs() < 1e-9);
        assert_eq!(child.inheritance_chain, ids(&["parent1", "parent2"]));
    }

    #[test]
    fn context_divisor_policies() {
        let mut store = InMemoryTrustStore::new();
        store
            .set("p1", TrustAttribute::new("p1", 0.5).with_context("finance", 1.0))
            .unwrap();
        store.set("p2", TrustAttribute::new("p2", 0.5)).unwrap();
        let parents = ids(&["p1", "p2"]);

        let diluted = handler().calculate_inherited_trust(&store, &parents, "c").unwrap();
        assert!((diluted.context_score("finance").unwrap() - 0.4).abs() < 1e-9);

        let config = EngineConfig::default().with_divisor_policy(DivisorPolicy::DefiningParents);
        let focused = InheritanceHandler::new(&config)
            .calculate_inherited_trust(&store, &parents, "c")
            .unwrap();
        assert!((focused.context_score("finance").unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_parent_is_not_found() {
        let store = InMemoryTrustStore::new();
        let err = handler()
            .calculate_inherited_trust(&store, &ids(&["ghost"]), "c")
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn empty_parent_list_rejected() {
        let store = InMemoryTrustStore::new();
        assert!(handler().calculate_inherited_trust(&store, &[], "c").is_err());
    }

    #[test]
    fn two_hop_inheritance() {
        let mut store = InMemoryTrustStore::new();
        store.set("parent1", TrustAttribute::new("parent1", 0.9)).unwrap();
        let mut h = handler();
        h.register_inheritance_relationship("parent1", "child").unwrap();
        h.register_inheritance_relationship("child", "grandchild").unwrap();

        let child = h.apply_inherited_trust(&mut store, "child").unwrap();
        assert!((child.base_score - 0.72).abs() < 1e-9);
        let grandchild = h.apply_inherited_trust(&mut store, "grandchild").unwrap();
        assert!((grandchild.base_score - 0.576).abs() < 1e-9);

        let chain = h.get_inheritance_chain("grandchild");
        assert_eq!(chain.into_iter().collect::<Vec<_>>(), ids(&["child", "parent1"]));
    }

    #[test]
    fn cycle_registration_leaves_graph_unchanged() {
        let mut h = handler();
        h.register_inheritance_relationship("a", "b").unwrap();
        assert!(h.register_inheritance_relationship("b", "a").is_err());
        assert!(h.register_inheritance_relationship("a", "a").is_err());
        assert_eq!(h.get_parents("a"), Vec::<String>::new());
        assert_eq!(h.graph().edge_count(), 1);
    }

    #[test]
    fn relaxed_chain_check_ignores_extra_entries() {
        let mut store = InMemoryTrustStore::new();
        let mut h = handler();
        h.register_inheritance_relationship("p", "c").unwrap();

        let mut c = TrustAttribute::new("c", 0.4);
        c.inheritance_chain = ids(&["unrelated", "p"]);
        store.set("c", c).unwrap();
        assert!(h.verify_inheritance_chain(&store, "c"));

        h.register_inheritance_relationship("q", "c").unwrap();
        assert!(!h.verify_inheritance_chain(&store, "c"));
        assert!(!h.verify_inheritance_chain(&store, "nobody"));
    }

    #[test]
    fn unregister_does_not_recompute() {
        let mut store = InMemoryTrustStore::new();
        store.set("p", TrustAttribute::new("p", 1.0)).unwrap();
        let mut h = handler();
        h.register_inheritance_relationship("p", "c").unwrap();
        let before = h.apply_inherited_trust(&mut store, "c").unwrap();

        assert!(h.unregister_inheritance_relationship("p", "c"));
        assert_eq!(store.get("c").unwrap(), before);
        assert!(h.get_children("p").is_empty());
    }

    #[test]
    fn detects_and_resolves_conflicts() {
        let mut store = InMemoryTrustStore::new();
        store.set("p", TrustAttribute::new("p", 0.5)).unwrap();
        let mut h = handler();
        h.register_inheritance_relationship("p", "c").unwrap();
        h.apply_inherited_trust(&mut store, "c").unwrap();
        assert!(h.detect_inheritance_conflict(&store, "c").is_ok());

        // Parent changes after the child was materialized.
        store.set("p", TrustAttribute::new("p", 0.9)).unwrap();
        let err = h.detect_inheritance_conflict(&store, "c").unwrap_err();
        assert_eq!(err.kind(), "conflict");

        assert!(h.resolve_inheritance_conflicts(&mut store, "c").unwrap());
        assert!(h.detect_inheritance_conflict(&store, "c").is_ok());
        assert!((store.get("c").unwrap().base_score - 0.72).abs() < 1e-9);
    }

    #[test]
    fn resolve_unknown_entity_is_not_found() {
        let mut store = InMemoryTrustStore::new();
        assert!(handler().resolve_inheritance_conflicts(&mut store, "x").is_err());
    }
}

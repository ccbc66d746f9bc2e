// crates/trellis-verify/src/verifier.rs
//
// Verification system: boundary registry, trust-level checks, boundary
// enforcement, and the per-entity audit trail.
//
// Boundary enforcement order (stops at the first failure):
//   1. base_score >= min_trust_score
//   2. every required context exists and meets its threshold
//   3. tier equals required_tier, when one is set
//   4. relaxed inheritance chain check, when allow_inheritance is set

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::{TrustAttribute, TrustBoundary, VerificationResult};
use trellis_inheritance::RelationshipGraph;

use crate::audit::AuditTrail;
use crate::violation::Violation;

/// Owns registered boundaries and every entity's audit trail.
#[derive(Debug, Clone, Default)]
pub struct VerificationSystem {
    boundaries: BTreeMap<String, TrustBoundary>,
    audit: HashMap<String, AuditTrail>,
}

impl VerificationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously captured boundaries and audit trails. Every
    /// boundary is re-validated and every trail must pass its integrity check.
    pub fn restore(
        boundaries: Vec<TrustBoundary>,
        audit: BTreeMap<String, AuditTrail>,
    ) -> Result<Self, TrellisError> {
        let mut system = Self::new();
        for boundary in boundaries {
            system.register_trust_boundary(boundary)?;
        }
        for (entity_id, trail) in audit {
            if !trail.verify_integrity() {
                return Err(TrellisError::Validation(format!(
                    "audit trail of '{}' failed its integrity check",
                    entity_id
                )));
            }
            system.audit.insert(entity_id, trail);
        }
        Ok(system)
    }

    /// Validate and store a boundary. A boundary with the same id is replaced.
    pub fn register_trust_boundary(&mut self, boundary: TrustBoundary) -> Result<(), TrellisError> {
        if let Err(e) = boundary.validate() {
            tracing::warn!(boundary_id = %boundary.boundary_id, "Rejected trust boundary: {}", e);
            return Err(e);
        }
        tracing::info!(
            boundary_id = %boundary.boundary_id,
            min_trust_score = boundary.min_trust_score,
            "Registered trust boundary"
        );
        self.boundaries.insert(boundary.boundary_id.clone(), boundary);
        Ok(())
    }

    pub fn get_trust_boundary(&self, boundary_id: &str) -> Option<&TrustBoundary> {
        self.boundaries.get(boundary_id)
    }

    /// Registered boundaries ordered by id.
    pub fn boundaries(&self) -> impl Iterator<Item = &TrustBoundary> {
        self.boundaries.values()
    }

    /// Check an entity against a minimum base score and the relaxed chain
    /// check. Always returns a result and always appends it to the audit trail.
    pub fn verify_trust_level(
        &mut self,
        store: &dyn TrustStore,
        graph: &RelationshipGraph,
        entity_id: &str,
        required_level: f64,
    ) -> VerificationResult {
        let mut details = BTreeMap::new();
        details.insert("check".to_string(), json!("trust_level"));
        details.insert("required_level".to_string(), json!(required_level));

        let outcome = match store.get(entity_id) {
            Err(_) => Err((0.0, Violation::EntityNotFound { entity_id: entity_id.to_string() })),
            Ok(_) if !(0.0..=1.0).contains(&required_level) => {
                Err((0.0, Violation::InvalidRequiredLevel { required: required_level }))
            }
            Ok(attr) if attr.base_score < required_level => Err((
                attr.base_score,
                Violation::BelowMinimum {
                    actual: attr.base_score,
                    required: required_level,
                },
            )),
            Ok(attr) => match missing_parents(&attr, graph) {
                Some(violation) => Err((attr.base_score, violation)),
                None => Ok(attr.base_score),
            },
        };

        let result = build_result(entity_id, details, outcome);
        self.record(result)
    }

    /// Enforce one boundary against an entity, stopping at the first failing
    /// condition. Always appends the result to the audit trail.
    pub fn enforce_trust_boundary(
        &mut self,
        store: &dyn TrustStore,
        graph: &RelationshipGraph,
        entity_id: &str,
        boundary: &TrustBoundary,
    ) -> VerificationResult {
        let mut details = BTreeMap::new();
        details.insert("check".to_string(), json!("boundary"));
        details.insert("boundary_id".to_string(), json!(boundary.boundary_id));

        let outcome = match store.get(entity_id) {
            Err(_) => Err((0.0, Violation::EntityNotFound { entity_id: entity_id.to_string() })),
            Ok(attr) => match first_violation(&attr, boundary, graph) {
                Some(violation) => Err((attr.base_score, violation)),
                None => Ok(attr.base_score),
            },
        };

        let result = build_result(entity_id, details, outcome);
        self.record(result)
    }

    /// Enforce a registered boundary by id.
    pub fn enforce_registered_boundary(
        &mut self,
        store: &dyn TrustStore,
        graph: &RelationshipGraph,
        entity_id: &str,
        boundary_id: &str,
    ) -> Result<VerificationResult, TrellisError> {
        let boundary = self
            .boundaries
            .get(boundary_id)
            .cloned()
            .ok_or_else(|| TrellisError::NotFound(format!("boundary '{}'", boundary_id)))?;
        Ok(self.enforce_trust_boundary(store, graph, entity_id, &boundary))
    }

    /// Enforce every registered boundary against one entity.
    pub fn verify_all_boundaries(
        &mut self,
        store: &dyn TrustStore,
        graph: &RelationshipGraph,
        entity_id: &str,
    ) -> BTreeMap<String, VerificationResult> {
        let boundaries: Vec<TrustBoundary> = self.boundaries.values().cloned().collect();
        boundaries
            .iter()
            .map(|b| {
                (
                    b.boundary_id.clone(),
                    self.enforce_trust_boundary(store, graph, entity_id, b),
                )
            })
            .collect()
    }

    /// Every result recorded for an entity, in call order.
    pub fn audit_trust_verification(&self, entity_id: &str) -> &[VerificationResult] {
        self.audit
            .get(entity_id)
            .map(AuditTrail::records)
            .unwrap_or(&[])
    }

    pub fn audit_trail(&self, entity_id: &str) -> Option<&AuditTrail> {
        self.audit.get(entity_id)
    }

    /// All audit trails keyed by entity id, ordered.
    pub fn audit_trails(&self) -> BTreeMap<String, AuditTrail> {
        self.audit
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether an entity is due for re-checking against a boundary: never
    /// checked, or the last check is at least `verification_frequency`
    /// seconds old.
    pub fn is_reverification_due(
        &self,
        entity_id: &str,
        boundary_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, TrellisError> {
        let boundary = self
            .boundaries
            .get(boundary_id)
            .ok_or_else(|| TrellisError::NotFound(format!("boundary '{}'", boundary_id)))?;
        let last = self
            .audit
            .get(entity_id)
            .and_then(|trail| trail.last_for_boundary(boundary_id));
        Ok(match last {
            None => true,
            Some(result) => {
                now - result.timestamp >= Duration::seconds(boundary.verification_frequency)
            }
        })
    }

    fn record(&mut self, result: VerificationResult) -> VerificationResult {
        if result.verified {
            tracing::debug!(entity_id = %result.entity_id, confidence = result.confidence_score, "Verification passed");
        } else {
            tracing::warn!(entity_id = %result.entity_id, errors = ?result.errors, "Verification failed");
        }
        self.audit
            .entry(result.entity_id.clone())
            .or_default()
            .append(result.clone());
        result
    }
}

fn build_result(
    entity_id: &str,
    mut details: BTreeMap<String, serde_json::Value>,
    outcome: Result<f64, (f64, Violation)>,
) -> VerificationResult {
    match outcome {
        Ok(confidence) => VerificationResult::passed(entity_id, confidence, details),
        Err((confidence, violation)) => {
            details.insert("failed_check".to_string(), json!(violation.check()));
            VerificationResult::failed(entity_id, confidence, details, violation.to_string())
        }
    }
}

fn missing_parents(attr: &TrustAttribute, graph: &RelationshipGraph) -> Option<Violation> {
    let missing: Vec<String> = graph
        .parents_of(&attr.entity_id)
        .into_iter()
        .filter(|p| !attr.chain_contains(p))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(Violation::BrokenInheritanceChain { missing })
    }
}

fn first_violation(
    attr: &TrustAttribute,
    boundary: &TrustBoundary,
    graph: &RelationshipGraph,
) -> Option<Violation> {
    if attr.base_score < boundary.min_trust_score {
        return Some(Violation::BelowMinimum {
            actual: attr.base_score,
            required: boundary.min_trust_score,
        });
    }

    for (context, required) in &boundary.required_context_scores {
        match attr.context_score(context) {
            None => {
                return Some(Violation::MissingContext {
                    context: context.clone(),
                })
            }
            Some(actual) if actual < *required => {
                return Some(Violation::ContextBelowThreshold {
                    context: context.clone(),
                    actual,
                    required: *required,
                })
            }
            Some(_) => {}
        }
    }

    if let Some(required) = boundary.required_tier {
        if attr.tier != Some(required) {
            return Some(Violation::TierMismatch {
                required,
                actual: attr.tier,
            });
        }
    }

    if boundary.allow_inheritance {
        return missing_parents(attr, graph);
    }

    None
}

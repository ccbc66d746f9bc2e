// crates/trellis-engine/src/operation.rs
//
// Batch operations. Collaborators (and the CLI's scenario files) describe
// work as a list of tagged operations; `apply_batch` runs every one of them,
// reporting each failure instead of stopping at it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use trellis_core::error::TrellisError;
use trellis_core::traits::TrustStore;
use trellis_core::{Tier, TrustAttribute, TrustBoundary};
use trellis_inheritance::Relationship;

use crate::domain::{EntityUpdate, TrustDomain};

/// A single unit of work against a trust domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    UpsertEntity(EntityUpdate),
    RegisterRelationship(Relationship),
    UnregisterRelationship(Relationship),
    Propagate {
        source_id: String,
        target_id: String,
        /// Base score of the target's initial record if it does not exist yet.
        #[serde(default)]
        proposed_base_score: f64,
        #[serde(default)]
        proposed_context_scores: BTreeMap<String, f64>,
    },
    Inherit {
        child_id: String,
    },
    ResolveConflicts {
        entity_id: String,
    },
    PromoteTier {
        entity_id: String,
        tier: Tier,
    },
    MarkVerified {
        entity_id: String,
    },
    RegisterBoundary(TrustBoundary),
}

impl Operation {
    /// Short operation name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::UpsertEntity(_) => "upsert_entity",
            Operation::RegisterRelationship(_) => "register_relationship",
            Operation::UnregisterRelationship(_) => "unregister_relationship",
            Operation::Propagate { .. } => "propagate",
            Operation::Inherit { .. } => "inherit",
            Operation::ResolveConflicts { .. } => "resolve_conflicts",
            Operation::PromoteTier { .. } => "promote_tier",
            Operation::MarkVerified { .. } => "mark_verified",
            Operation::RegisterBoundary(_) => "register_boundary",
        }
    }

    /// Entity (or boundary) the operation is about.
    pub fn subject(&self) -> String {
        match self {
            Operation::UpsertEntity(update) => update.entity_id.clone(),
            Operation::RegisterRelationship(r) | Operation::UnregisterRelationship(r) => {
                format!("{} -> {}", r.parent_id, r.child_id)
            }
            Operation::Propagate {
                source_id,
                target_id,
                ..
            } => format!("{} -> {}", source_id, target_id),
            Operation::Inherit { child_id } => child_id.clone(),
            Operation::ResolveConflicts { entity_id }
            | Operation::PromoteTier { entity_id, .. }
            | Operation::MarkVerified { entity_id } => entity_id.clone(),
            Operation::RegisterBoundary(b) => b.boundary_id.clone(),
        }
    }
}

/// What a successful operation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationOutcome {
    Entity { attributes: TrustAttribute },
    Relationship { changed: bool },
    Resolved { verified: bool },
    Boundary { boundary_id: String },
}

impl OperationOutcome {
    pub fn summary(&self) -> String {
        match self {
            OperationOutcome::Entity { attributes } => format!(
                "{} base={:.4} chain=[{}]",
                attributes.entity_id,
                attributes.base_score,
                attributes.inheritance_chain.join(", ")
            ),
            OperationOutcome::Relationship { changed } => {
                if *changed { "edge updated".to_string() } else { "no change".to_string() }
            }
            OperationOutcome::Resolved { verified } => format!("chain verified={}", verified),
            OperationOutcome::Boundary { boundary_id } => format!("boundary '{}' registered", boundary_id),
        }
    }
}

/// Per-operation line of a batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    pub index: usize,
    pub operation: String,
    pub subject: String,
    pub success: bool,
    #[serde(default)]
    pub outcome: Option<OperationOutcome>,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A named list of operations, as loaded from a scenario file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl<S: TrustStore> TrustDomain<S> {
    /// Run one operation.
    pub fn apply(&mut self, operation: Operation) -> Result<OperationOutcome, TrellisError> {
        match operation {
            Operation::UpsertEntity(update) => self
                .upsert_entity(update)
                .map(|attributes| OperationOutcome::Entity { attributes }),
            Operation::RegisterRelationship(r) => self
                .register_inheritance_relationship(&r.parent_id, &r.child_id)
                .map(|()| OperationOutcome::Relationship { changed: true }),
            Operation::UnregisterRelationship(r) => Ok(OperationOutcome::Relationship {
                changed: self.unregister_inheritance_relationship(&r.parent_id, &r.child_id),
            }),
            Operation::Propagate {
                source_id,
                target_id,
                proposed_base_score,
                proposed_context_scores,
            } => {
                let mut proposed = TrustAttribute::new(target_id.clone(), proposed_base_score);
                proposed.context_scores = proposed_context_scores;
                self.propagate(&source_id, &target_id, proposed)
                    .map(|attributes| OperationOutcome::Entity { attributes })
            }
            Operation::Inherit { child_id } => self
                .inherit(&child_id)
                .map(|attributes| OperationOutcome::Entity { attributes }),
            Operation::ResolveConflicts { entity_id } => self
                .resolve_inheritance_conflicts(&entity_id)
                .map(|verified| OperationOutcome::Resolved { verified }),
            Operation::PromoteTier { entity_id, tier } => self
                .promote_tier(&entity_id, tier)
                .map(|attributes| OperationOutcome::Entity { attributes }),
            Operation::MarkVerified { entity_id } => self
                .mark_verified(&entity_id)
                .map(|attributes| OperationOutcome::Entity { attributes }),
            Operation::RegisterBoundary(boundary) => {
                let boundary_id = boundary.boundary_id.clone();
                self.register_trust_boundary(boundary)
                    .map(|()| OperationOutcome::Boundary { boundary_id })
            }
        }
    }

    /// Run every operation in order. A failure is reported and processing
    /// continues with the next operation.
    pub fn apply_batch<I>(&mut self, operations: I) -> Vec<OperationReport>
    where
        I: IntoIterator<Item = Operation>,
    {
        operations
            .into_iter()
            .enumerate()
            .map(|(index, op)| {
                let operation = op.name().to_string();
                let subject = op.subject();
                match self.apply(op) {
                    Ok(outcome) => OperationReport {
                        index,
                        operation,
                        subject,
                        success: true,
                        outcome: Some(outcome),
                        error_kind: None,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(index, operation = %operation, subject = %subject, "Batch operation failed: {}", e);
                        OperationReport {
                            index,
                            operation,
                            subject,
                            success: false,
                            outcome: None,
                            error_kind: Some(e.kind().to_string()),
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    }
}

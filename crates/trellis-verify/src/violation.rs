// crates/trellis-verify/src/violation.rs
//
// Reasons a verification can fail. Rendered into the ordered `errors` list
// of a `VerificationResult`.

use thiserror::Error;

use trellis_core::Tier;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("entity '{entity_id}' not found")]
    EntityNotFound { entity_id: String },

    #[error("required level {required} is outside [0.0, 1.0]")]
    InvalidRequiredLevel { required: f64 },

    #[error("base score {actual} is below required minimum {required}")]
    BelowMinimum { actual: f64, required: f64 },

    #[error("missing required context score '{context}'")]
    MissingContext { context: String },

    #[error("context '{context}' score {actual} is below required {required}")]
    ContextBelowThreshold {
        context: String,
        actual: f64,
        required: f64,
    },

    #[error("tier mismatch: required {required}, found {}", tier_label(.actual))]
    TierMismatch { required: Tier, actual: Option<Tier> },

    #[error("inheritance chain does not include parent(s): {}", .missing.join(", "))]
    BrokenInheritanceChain { missing: Vec<String> },
}

fn tier_label(tier: &Option<Tier>) -> String {
    match tier {
        Some(t) => t.to_string(),
        None => "none".to_string(),
    }
}

impl Violation {
    /// Stable tag for the failing check, stored in result details.
    pub fn check(&self) -> &'static str {
        match self {
            Violation::EntityNotFound { .. } => "entity",
            Violation::InvalidRequiredLevel { .. } => "required_level",
            Violation::BelowMinimum { .. } => "min_trust_score",
            Violation::MissingContext { .. } | Violation::ContextBelowThreshold { .. } => {
                "required_context_scores"
            }
            Violation::TierMismatch { .. } => "required_tier",
            Violation::BrokenInheritanceChain { .. } => "inheritance_chain",
        }
    }
}

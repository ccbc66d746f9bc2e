// crates/trellis-core/src/boundary.rs
//
// Declarative trust boundaries registered by policy collaborators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute::Tier;
use crate::error::TrellisError;
use crate::validation::validate_score;

/// A named policy an entity's attributes can be enforced against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustBoundary {
    pub boundary_id: String,
    /// Minimum base score, in [0.0, 1.0].
    pub min_trust_score: f64,
    /// Context name -> minimum context score.
    #[serde(default)]
    pub required_context_scores: BTreeMap<String, f64>,
    /// Exact tier the entity must hold, if any.
    #[serde(default)]
    pub required_tier: Option<Tier>,
    /// Seconds between required re-verifications. Zero means every check is due.
    #[serde(default)]
    pub verification_frequency: i64,
    /// When set, enforcement also requires a valid inheritance chain.
    #[serde(default)]
    pub allow_inheritance: bool,
}

impl TrustBoundary {
    /// Create a boundary with only a minimum score.
    pub fn new(boundary_id: impl Into<String>, min_trust_score: f64) -> Self {
        Self {
            boundary_id: boundary_id.into(),
            min_trust_score,
            required_context_scores: BTreeMap::new(),
            required_tier: None,
            verification_frequency: 0,
            allow_inheritance: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>, min: f64) -> Self {
        self.required_context_scores.insert(context.into(), min);
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.required_tier = Some(tier);
        self
    }

    pub fn with_inheritance(mut self) -> Self {
        self.allow_inheritance = true;
        self
    }

    pub fn with_frequency(mut self, seconds: i64) -> Self {
        self.verification_frequency = seconds;
        self
    }

    /// Check the boundary's own thresholds before registration.
    pub fn validate(&self) -> Result<(), TrellisError> {
        if self.boundary_id.trim().is_empty() {
            return Err(TrellisError::Validation("boundary_id must not be empty".to_string()));
        }
        validate_score("min_trust_score", self.min_trust_score)?;
        for (context, min) in &self.required_context_scores {
            validate_score(&format!("required context score '{}'", context), *min)?;
        }
        if self.verification_frequency < 0 {
            return Err(TrellisError::Validation(format!(
                "verification_frequency must be >= 0, got {}",
                self.verification_frequency
            )));
        }
        Ok(())
    }
}

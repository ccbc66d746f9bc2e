// crates/trellis-core/src/config.rs
//
// Engine configuration. Every field has a serde default so a partial TOML
// table (or none at all) yields a usable config.

use serde::{Deserialize, Serialize};

use crate::error::TrellisError;

/// How multi-parent context scores are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisorPolicy {
    /// Divide each context key's sum by the total number of parents supplied,
    /// diluting keys that only some parents define.
    #[default]
    AllParents,
    /// Divide each context key's sum by the number of parents defining it.
    DefiningParents,
}

/// Runtime configuration for a trust domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Multiplier applied per propagation or inheritance hop.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    #[serde(default)]
    pub divisor_policy: DivisorPolicy,

    /// Transaction log retention used by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Tolerance when comparing stored and recomputed inherited scores.
    #[serde(default = "default_score_epsilon")]
    pub score_epsilon: f64,
}

fn default_decay_factor() -> f64 {
    0.8
}

fn default_retention_days() -> u32 {
    30
}

fn default_score_epsilon() -> f64 {
    1e-9
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_factor: default_decay_factor(),
            divisor_policy: DivisorPolicy::default(),
            retention_days: default_retention_days(),
            score_epsilon: default_score_epsilon(),
        }
    }
}

impl EngineConfig {
    pub fn with_decay_factor(mut self, decay_factor: f64) -> Self {
        self.decay_factor = decay_factor;
        self
    }

    pub fn with_divisor_policy(mut self, policy: DivisorPolicy) -> Self {
        self.divisor_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), TrellisError> {
        if !(0.0..=1.0).contains(&self.decay_factor) {
            return Err(TrellisError::Validation(format!(
                "decay_factor must be within [0.0, 1.0], got {}",
                self.decay_factor
            )));
        }
        if self.score_epsilon.is_nan() || self.score_epsilon < 0.0 {
            return Err(TrellisError::Validation(format!(
                "score_epsilon must be >= 0, got {}",
                self.score_epsilon
            )));
        }
        Ok(())
    }
}

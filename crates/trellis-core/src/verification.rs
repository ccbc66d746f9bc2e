// crates/trellis-core/src/verification.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one verification or boundary enforcement. Immutable once built;
/// appended to the entity's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub entity_id: String,
    pub verified: bool,
    pub confidence_score: f64,
    /// Free-form structured context (boundary id, required level, ...).
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Ordered explanation of which checks failed and why.
    #[serde(default)]
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    /// A passing result.
    pub fn passed(
        entity_id: impl Into<String>,
        confidence_score: f64,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            verified: true,
            confidence_score,
            details,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failing result carrying one explanation.
    pub fn failed(
        entity_id: impl Into<String>,
        confidence_score: f64,
        details: BTreeMap<String, serde_json::Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            verified: false,
            confidence_score,
            details,
            errors: vec![error.into()],
            timestamp: Utc::now(),
        }
    }

    /// Look up a string detail.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(|v| v.as_str())
    }
}

// crates/trellis-core/src/attribute.rs
//
// The per-entity trust attribute record and its tier ladder.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrellisError;

/// Status tag set on entities whose inherited trust has been confirmed.
pub const VERIFIED_STATUS: &str = "verified";

/// Ordered trust category. An entity without a tier ranks below `Bronze`
/// (`Option<Tier>` orders `None` first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Bronze => write!(f, "bronze"),
            Tier::Silver => write!(f, "silver"),
            Tier::Gold => write!(f, "gold"),
            Tier::Platinum => write!(f, "platinum"),
        }
    }
}

impl FromStr for Tier {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            "platinum" => Ok(Tier::Platinum),
            other => Err(TrellisError::Validation(format!("unknown tier '{}'", other))),
        }
    }
}

/// One entry of an entity's append-only promotion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPromotion {
    pub from_tier: Option<Tier>,
    pub to_tier: Option<Tier>,
    pub timestamp: DateTime<Utc>,
}

/// Current trust attributes of a single entity.
///
/// Owned exclusively by the trust store; every other component works on
/// clones and hands changes back through a store commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAttribute {
    /// Unique identifier of the entity.
    pub entity_id: String,
    /// Scalar trust rating in [0.0, 1.0].
    pub base_score: f64,
    /// Per-context sub-scores, each in [0.0, 1.0].
    #[serde(default)]
    pub context_scores: BTreeMap<String, f64>,
    /// Ancestors this entity's score derives from. Membership matters,
    /// order does not; entries are unique.
    #[serde(default)]
    pub inheritance_chain: Vec<String>,
    /// Optional status tag. When set, `inheritance_chain` must be non-empty.
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub promotion_history: Vec<TierPromotion>,
    pub last_updated: DateTime<Utc>,
}

impl TrustAttribute {
    /// Create a fresh attribute record with no contexts, chain, or tier.
    pub fn new(entity_id: impl Into<String>, base_score: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            base_score,
            context_scores: BTreeMap::new(),
            inheritance_chain: Vec::new(),
            verification_status: None,
            tier: None,
            promotion_history: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Builder-style helper to add a context score.
    pub fn with_context(mut self, context: impl Into<String>, score: f64) -> Self {
        self.context_scores.insert(context.into(), score);
        self
    }

    /// Builder-style helper to set the tier.
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Whether `ancestor` is a member of the inheritance chain.
    pub fn chain_contains(&self, ancestor: &str) -> bool {
        self.inheritance_chain.iter().any(|a| a == ancestor)
    }

    /// Add `ancestor` to the chain if absent. Returns `true` when it was added.
    pub fn add_to_chain(&mut self, ancestor: &str) -> bool {
        if self.chain_contains(ancestor) {
            return false;
        }
        self.inheritance_chain.push(ancestor.to_string());
        true
    }

    /// Remove `ancestor` from the chain. Returns `true` when it was present.
    pub fn remove_from_chain(&mut self, ancestor: &str) -> bool {
        let before = self.inheritance_chain.len();
        self.inheritance_chain.retain(|a| a != ancestor);
        before != self.inheritance_chain.len()
    }

    /// Look up a context score.
    pub fn context_score(&self, context: &str) -> Option<f64> {
        self.context_scores.get(context).copied()
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_places_none_lowest() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Platinum);
        assert!(None < Some(Tier::Bronze));
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert!("diamond".parse::<Tier>().is_err());
    }

    #[test]
    fn add_to_chain_is_idempotent() {
        let mut attr = TrustAttribute::new("child", 0.5);
        assert!(attr.add_to_chain("parent"));
        assert!(!attr.add_to_chain("parent"));
        assert_eq!(attr.inheritance_chain, vec!["parent".to_string()]);
    }

    #[test]
    fn remove_from_chain_reports_membership() {
        let mut attr = TrustAttribute::new("child", 0.5);
        attr.add_to_chain("a");
        assert!(attr.remove_from_chain("a"));
        assert!(!attr.remove_from_chain("a"));
        assert!(!attr.chain_contains("a"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"entity_id":"x","base_score":0.4,"last_updated":"2024-01-01T00:00:00Z"}"#;
        let attr: TrustAttribute = serde_json::from_str(json).unwrap();
        assert!(attr.context_scores.is_empty());
        assert!(attr.tier.is_none());
    }
}

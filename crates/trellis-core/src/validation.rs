// crates/trellis-core/src/validation.rs
//
// Bound and invariant checks applied before any attribute record is written.
//
// Invariants enforced:
//   - 0.0 <= base_score <= 1.0 (NaN rejected)
//   - every context score in [0.0, 1.0]
//   - verification_status set => inheritance_chain non-empty
//   - inheritance_chain entries unique and never the entity itself
//   - last_updated <= now

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::attribute::TrustAttribute;
use crate::error::TrellisError;

/// Check that a single score lies in the closed unit interval.
pub fn validate_score(label: &str, value: f64) -> Result<(), TrellisError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrellisError::Validation(format!(
            "{} must be within [0.0, 1.0], got {}",
            label, value
        )))
    }
}

/// Validate a full attribute record against the current clock.
pub fn validate_attribute(attr: &TrustAttribute) -> Result<(), TrellisError> {
    validate_attribute_at(attr, Utc::now())
}

/// Validate a full attribute record against an explicit `now`.
pub fn validate_attribute_at(attr: &TrustAttribute, now: DateTime<Utc>) -> Result<(), TrellisError> {
    if attr.entity_id.trim().is_empty() {
        return Err(TrellisError::Validation("entity_id must not be empty".to_string()));
    }

    validate_score("base_score", attr.base_score)?;

    for (context, score) in &attr.context_scores {
        validate_score(&format!("context score '{}'", context), *score)?;
    }

    let mut seen = HashSet::new();
    for ancestor in &attr.inheritance_chain {
        if ancestor == &attr.entity_id {
            return Err(TrellisError::Validation(format!(
                "entity '{}' cannot appear in its own inheritance chain",
                attr.entity_id
            )));
        }
        if !seen.insert(ancestor.as_str()) {
            return Err(TrellisError::Validation(format!(
                "duplicate ancestor '{}' in inheritance chain of '{}'",
                ancestor, attr.entity_id
            )));
        }
    }

    if attr.verification_status.is_some() && attr.inheritance_chain.is_empty() {
        return Err(TrellisError::Validation(format!(
            "entity '{}' has a verification status but an empty inheritance chain",
            attr.entity_id
        )));
    }

    if attr.last_updated > now {
        return Err(TrellisError::Validation(format!(
            "last_updated {} of '{}' is in the future",
            attr.last_updated, attr.entity_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn accepts_boundary_values() {
        assert!(validate_score("s", 0.0).is_ok());
        assert!(validate_score("s", 1.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(validate_score("s", -0.01).is_err());
        assert!(validate_score("s", 1.01).is_err());
        assert!(validate_score("s", f64::NAN).is_err());
    }

    #[test]
    fn rejects_bad_context_score() {
        let attr = TrustAttribute::new("a", 0.5).with_context("finance", 1.5);
        let err = validate_attribute(&attr).unwrap_err();
        assert!(err.to_string().contains("finance"));
    }

    #[test]
    fn status_requires_chain() {
        let mut attr = TrustAttribute::new("a", 0.5);
        attr.verification_status = Some("verified".to_string());
        assert!(validate_attribute(&attr).is_err());
        attr.add_to_chain("p");
        assert!(validate_attribute(&attr).is_ok());
    }

    #[test]
    fn rejects_self_in_chain() {
        let mut attr = TrustAttribute::new("a", 0.5);
        attr.inheritance_chain.push("a".to_string());
        assert!(validate_attribute(&attr).is_err());
    }

    #[test]
    fn rejects_future_timestamp() {
        let mut attr = TrustAttribute::new("a", 0.5);
        let now = Utc::now();
        attr.last_updated = now + Duration::hours(1);
        assert!(validate_attribute_at(&attr, now).is_err());
    }
}

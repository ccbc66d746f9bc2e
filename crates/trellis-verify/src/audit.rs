// crates/trellis-verify/src/audit.rs
//
// Append-only, hash-chained audit trail of verification results.
//
// head_0 = ""
// head_n = hex(SHA-256(head_{n-1} || digest_input(result_n)))
//
// The chain head lets a restored trail prove it was not edited in transit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use trellis_core::VerificationResult;

/// Per-entity ordered list of verification results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    records: Vec<VerificationResult>,
    #[serde(default)]
    head: String,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result and advance the chain head.
    pub fn append(&mut self, result: VerificationResult) {
        self.head = chain_digest(&self.head, &result);
        self.records.push(result);
    }

    /// Results in call order.
    pub fn records(&self) -> &[VerificationResult] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current chain head (empty for an empty trail).
    pub fn head(&self) -> &str {
        &self.head
    }

    /// Recompute the chain from the records and compare with the stored head.
    pub fn verify_integrity(&self) -> bool {
        let recomputed = self
            .records
            .iter()
            .fold(String::new(), |head, result| chain_digest(&head, result));
        recomputed == self.head
    }

    /// Most recent enforcement of the given boundary, if any.
    pub fn last_for_boundary(&self, boundary_id: &str) -> Option<&VerificationResult> {
        self.records
            .iter()
            .rev()
            .find(|r| r.detail_str("boundary_id") == Some(boundary_id))
    }
}

fn chain_digest(previous: &str, result: &VerificationResult) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(result.entity_id.as_bytes());
    hasher.update([result.verified as u8]);
    hasher.update(result.confidence_score.to_le_bytes());
    for (key, value) in &result.details {
        hasher.update(key.as_bytes());
        hasher.update(value.to_string().as_bytes());
    }
    for error in &result.errors {
        hasher.update(error.as_bytes());
    }
    hasher.update(result.timestamp.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

// crates/trellis-verify/src/lib.rs
//
// trellis-verify: Trust boundary enforcement and audit for Trellis.
//
// Boundaries are declarative policies (minimum score, required context
// scores, required tier, inheritance validity). Every verification performed
// is appended to a per-entity, hash-chained audit trail that normal operation
// never mutates or prunes.

pub mod audit;
pub mod verifier;
pub mod violation;

// Re-export key types for ergonomic access from downstream crates.
pub use audit::AuditTrail;
pub use verifier::VerificationSystem;
pub use violation::Violation;

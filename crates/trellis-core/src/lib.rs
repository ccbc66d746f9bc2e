// crates/trellis-core/src/lib.rs
//
// trellis-core: Core types, errors, validation and the store trait for the
// Trellis trust propagation and inheritance engine.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the trust attribute record, transactions, boundaries,
// verification results, the error taxonomy, and the `TrustStore` interface.

pub mod attribute;
pub mod boundary;
pub mod config;
pub mod error;
pub mod traits;
pub mod transaction;
pub mod validation;
pub mod verification;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use trellis_core::TrustAttribute;`

pub use attribute::{Tier, TierPromotion, TrustAttribute, VERIFIED_STATUS};
pub use boundary::TrustBoundary;
pub use config::{DivisorPolicy, EngineConfig};
pub use error::TrellisError;
pub use traits::TrustStore;
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
pub use verification::VerificationResult;

// crates/trellis-engine/src/lib.rs
//
// trellis-engine: The trust domain context object.
//
// A `TrustDomain` owns one trust store, one propagation manager, one
// inheritance handler and one verification system. Nothing is global:
// independent domains can coexist in one process and tests stay isolated.
// Collaborators push entity updates, relationships and boundaries in, and
// read verification and audit results out.

pub mod domain;
pub mod operation;
pub mod snapshot;

pub use domain::{EntityUpdate, TrustDomain};
pub use operation::{Operation, OperationOutcome, OperationReport, Scenario};
pub use snapshot::DomainSnapshot;

// Downstream users get the whole API surface from one crate.
pub use trellis_core::{
    DivisorPolicy, EngineConfig, Tier, TrellisError, TrustAttribute, TrustBoundary,
    TransactionStatus, VerificationResult,
};
pub use trellis_inheritance::Relationship;

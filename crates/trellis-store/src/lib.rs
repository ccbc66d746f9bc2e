// crates/trellis-store/src/lib.rs
//
// trellis-store: Storage layer for the Trellis trust engine.
//
// Provides the in-memory `TrustStore` implementation holding one current
// attribute record per entity and an append-only transaction log per entity,
// plus plain-data snapshots of both for transport or durable persistence by
// an outside collaborator.

pub mod memory;
pub mod snapshot;

pub use memory::InMemoryTrustStore;
pub use snapshot::StoreSnapshot;

// crates/trellis-propagation/src/lib.rs
//
// trellis-propagation: Atomic, auditable transfer of trust from a source
// entity to a target entity.
//
// A propagation is a transaction: begin (validate the proposal) -> execute
// (decay the source's scores onto the target and commit) or rollback (discard
// while still pending). At most one committed outcome exists per transaction.

pub mod manager;

pub use manager::PropagationManager;

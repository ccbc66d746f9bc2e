// crates/trellis-inheritance/src/lib.rs
//
// trellis-inheritance: Relationship graph and inherited trust for Trellis.
//
// Parents contribute trust to children. A child may have several parents,
// but the graph must stay acyclic; every candidate edge is checked for
// reachability before it is inserted. A child's inherited attributes are the
// decayed mean of its parents' scores.

pub mod graph;
pub mod handler;

pub use graph::{Relationship, RelationshipGraph};
pub use handler::{chain_covers_parents, InheritanceHandler};

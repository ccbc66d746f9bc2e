// crates/trellis-inheritance/src/graph.rs
//
// Directed parent -> child adjacency structure.
//
// Both directions are indexed so parent and child lookups are direct map
// reads. No node holds a reference to another; edges are plain id pairs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use trellis_core::error::TrellisError;

/// A single parent -> child edge in plain-data form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub parent_id: String,
    pub child_id: String,
}

/// Acyclic multi-parent relationship graph.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    /// child -> direct parents
    parents: BTreeMap<String, BTreeSet<String>>,
    /// parent -> direct children
    children: BTreeMap<String, BTreeSet<String>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from edges, rejecting any edge that would close a cycle.
    pub fn from_edges<I>(edges: I) -> Result<Self, TrellisError>
    where
        I: IntoIterator<Item = Relationship>,
    {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(&edge.parent_id, &edge.child_id)?;
        }
        Ok(graph)
    }

    /// Whether adding `parent -> child` would close a cycle: true for a
    /// self-edge, or when `parent` is already reachable from `child`.
    pub fn would_create_cycle(&self, parent_id: &str, child_id: &str) -> bool {
        parent_id == child_id || self.is_reachable(child_id, parent_id)
    }

    /// DFS along parent -> child edges: can `to` be reached from `from`?
    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![from];

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(kids) = self.children.get(node) {
                stack.extend(kids.iter().map(String::as_str));
            }
        }

        false
    }

    /// Insert an edge. Re-adding an existing edge is a no-op.
    pub fn add_edge(&mut self, parent_id: &str, child_id: &str) -> Result<(), TrellisError> {
        if parent_id.trim().is_empty() || child_id.trim().is_empty() {
            return Err(TrellisError::Validation(
                "relationship ids must not be empty".to_string(),
            ));
        }
        if parent_id == child_id {
            return Err(TrellisError::Validation(format!(
                "entity '{}' cannot inherit from itself",
                parent_id
            )));
        }
        if self.has_edge(parent_id, child_id) {
            return Ok(());
        }
        if self.would_create_cycle(parent_id, child_id) {
            return Err(TrellisError::Conflict(format!(
                "edge '{}' -> '{}' would create a cycle",
                parent_id, child_id
            )));
        }

        self.parents
            .entry(child_id.to_string())
            .or_default()
            .insert(parent_id.to_string());
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .insert(child_id.to_string());
        Ok(())
    }

    /// Remove an edge. Returns `true` when it existed.
    pub fn remove_edge(&mut self, parent_id: &str, child_id: &str) -> bool {
        let removed = remove_from(&mut self.parents, child_id, parent_id);
        remove_from(&mut self.children, parent_id, child_id);
        removed
    }

    pub fn has_edge(&self, parent_id: &str, child_id: &str) -> bool {
        self.parents
            .get(child_id)
            .is_some_and(|p| p.contains(parent_id))
    }

    /// Direct parents, sorted.
    pub fn parents_of(&self, entity_id: &str) -> Vec<String> {
        self.parents
            .get(entity_id)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct children, sorted.
    pub fn children_of(&self, entity_id: &str) -> Vec<String> {
        self.children
            .get(entity_id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive closure of ancestors, walking parent pointers.
    pub fn ancestors(&self, entity_id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack: Vec<&str> = vec![entity_id];

        while let Some(node) = stack.pop() {
            if let Some(parents) = self.parents.get(node) {
                for parent in parents {
                    if found.insert(parent.clone()) {
                        stack.push(parent.as_str());
                    }
                }
            }
        }

        found
    }

    /// Every edge, sorted by (parent, child).
    pub fn edges(&self) -> Vec<Relationship> {
        let mut edges: Vec<Relationship> = self
            .parents
            .iter()
            .flat_map(|(child, parents)| {
                parents.iter().map(move |parent| Relationship {
                    parent_id: parent.clone(),
                    child_id: child.clone(),
                })
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.parents.values().map(BTreeSet::len).sum()
    }
}

fn remove_from(index: &mut BTreeMap<String, BTreeSet<String>>, key: &str, member: &str) -> bool {
    let Some(set) = index.get_mut(key) else {
        return false;
    };
    let removed = set.remove(member);
    if set.is_empty() {
        index.remove(key);
    }
    removed
}

//! Lightweight unique identifier for nodes within a [`Graph`](crate::graph::Graph).
//!
//! Every [`Node`](crate::graph::Node) inserted into the graph arena is assigned a
//! sequential `NodeId` at construction. Ids are never reused, even across rewrites:
//! the optimiser mints fresh ids for new nodes and keeps the old id on a node whose
//! shape is unchanged (see [`crate::optimiser`]).
//!
//! Ids are small, `Copy`, and hashable, so they're used directly as keys in the
//! attribute table, the MSCR/layer maps, and the bridge/sink registry.

use std::fmt;

/// Unique numeric identifier for a node in a [`Graph`](crate::graph::Graph).
///
/// Node identity and equality are defined by id alone per the graph model's
/// invariants; structural content never participates in equality or hashing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new `NodeId` (used internally by [`Graph::new_id`](crate::graph::Graph::new_id)).
    pub(crate) fn new(v: u64) -> Self {
        Self(v)
    }

    /// Return the underlying numeric value.
    ///
    /// Useful for debugging, ordering (tie-breaking in the MSCR/layer builder),
    /// and job naming.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

//! Graph-level validation: the checks `Executor::execute` runs before it
//! trusts a graph enough to optimise and plan it (spec.md §4.1, §4.8).
//!
//! Deliberately narrow: this crate never inspects user data (that's the
//! distributed-collection API's job, out of scope per spec.md §1), so
//! "validation" here means the graph itself is well-formed — every edge
//! points at a node that exists, every edge's shape matches what its
//! consumer expects, and the reachable subgraph is acyclic. Named and
//! structured after the teacher's `Validate`/`ValidationError` pair
//! (`validation.rs`), narrowed to one closed error enum instead of an
//! open-ended per-field validator registry, since a graph has a fixed,
//! known shape rather than arbitrary user records.

use std::collections::HashSet;
use std::fmt;

use crate::error::ScoobiError;
use crate::graph::{Graph, Node, Shape};
use crate::node_id::NodeId;

/// One graph-validation failure.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// A node references an input id that isn't in the graph.
    DanglingEdge { from: NodeId, missing: NodeId },
    /// A node references an input whose shape doesn't match what the
    /// consumer requires (e.g. `Op`'s operands must both be `Exp`).
    ShapeMismatch {
        node: NodeId,
        expected: Shape,
        found: Shape,
        input: NodeId,
    },
    /// A node is its own (possibly indirect) input.
    Cycle { node: NodeId },
    /// `Flatten` with no inputs at all.
    EmptyFlatten { node: NodeId },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingEdge { from, missing } => {
                write!(f, "{from} references missing node {missing}")
            }
            Self::ShapeMismatch {
                node,
                expected,
                found,
                input,
            } => write!(
                f,
                "{node} expected {expected:?}-shaped input at {input} but found {found:?}"
            ),
            Self::Cycle { node } => write!(f, "{node} participates in a cycle"),
            Self::EmptyFlatten { node } => write!(f, "{node} flattens zero inputs"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate the subgraph reachable from `root`, returning every failure
/// found rather than stopping at the first (so a caller can report them all
/// at once, in the teacher's `combine_validations` spirit).
pub fn validate(graph: &Graph, root: NodeId) -> Result<(), ScoobiError> {
    let mut errors = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Ok(node) = graph.get(id) else {
            errors.push(ValidationError::DanglingEdge {
                from: id,
                missing: id,
            });
            continue;
        };

        if let Node::Flatten { inputs, .. } = &node {
            if inputs.is_empty() {
                errors.push(ValidationError::EmptyFlatten { node: id });
            }
        }

        for (position, input) in node.inputs().into_iter().enumerate() {
            match graph.get(input) {
                Err(_) => errors.push(ValidationError::DanglingEdge {
                    from: id,
                    missing: input,
                }),
                Ok(input_node) => {
                    if let Some(expected) = expected_shape_of(&node, position) {
                        let found = input_node.shape();
                        if found != expected {
                            errors.push(ValidationError::ShapeMismatch {
                                node: id,
                                expected,
                                found,
                                input,
                            });
                        }
                    }
                    stack.push(input);
                }
            }
        }
    }

    check_acyclic(graph, root, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScoobiError::Validation(
            errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "),
        ))
    }
}

/// The shape `node` requires of the input at `position` (as ordered by
/// `Node::inputs()`), if it cares (every input edge in the graph model is
/// shape-constrained by construction; this just restates the constraint so
/// validation can catch a hand-built graph that violates it).
///
/// `ParallelDo` is the one node whose inputs don't share a single shape:
/// `inputs()` lists its main input first (`Arr`) and its environment edge
/// second (`Exp`, per spec.md §3).
fn expected_shape_of(node: &Node, position: usize) -> Option<Shape> {
    match node {
        Node::Load { .. } | Node::Return { .. } => None,
        Node::ParallelDo { .. } => {
            if position == 0 {
                Some(Shape::Arr)
            } else {
                Some(Shape::Exp)
            }
        }
        Node::GroupByKey { .. } | Node::Combine { .. } | Node::Materialise { .. } => Some(Shape::Arr),
        Node::Flatten { .. } => Some(Shape::Arr),
        Node::Op { .. } => Some(Shape::Exp),
    }
}

fn check_acyclic(graph: &Graph, root: NodeId, errors: &mut Vec<ValidationError>) {
    enum Mark {
        InProgress,
        Done,
    }
    let mut marks = std::collections::HashMap::new();
    let mut stack = vec![(root, false)];
    while let Some((id, leaving)) = stack.pop() {
        if leaving {
            marks.insert(id, Mark::Done);
            continue;
        }
        match marks.get(&id) {
            Some(Mark::InProgress) => {
                errors.push(ValidationError::Cycle { node: id });
                continue;
            }
            Some(Mark::Done) => continue,
            None => {}
        }
        marks.insert(id, Mark::InProgress);
        stack.push((id, true));
        if let Ok(node) = graph.get(id) {
            for input in node.inputs() {
                stack.push((input, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn word_count_fixture_validates_cleanly() {
        let graph = Graph::new();
        let root = fixtures::word_count(&graph).unwrap();
        validate(&graph, root).unwrap();
    }

    #[test]
    fn dangling_edge_is_reported() {
        // `insert_with_id` bypasses the safe constructors' own shape/existence
        // checks, which is exactly how the optimiser's internal builder works
        // before it reassembles a `Graph` — this is what validation guards.
        let graph = Graph::new();
        let source = fixtures::single_map(&graph).unwrap();
        let ghost = graph.new_id();
        let bogus = graph.new_id();
        graph.insert_with_id(
            bogus,
            Node::Flatten {
                inputs: vec![source, ghost],
                out_ser: graph.get(source).unwrap().out_ser(),
            },
        );
        assert!(validate(&graph, bogus).is_err());
    }
}

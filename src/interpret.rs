//! A naive, wholly non-distributed reference evaluator over the graph.
//!
//! Not part of spec.md's distilled module list, but needed to state and test
//! "semantics preservation" (spec.md §8): the optimiser and the MSCR-based
//! executor must both compute the same thing this straightforward recursive
//! walk computes, for any given graph. It also doubles as the execution
//! engine behind [`crate::job::JobSpec::run_in_process`] — the only
//! difference is *what stops the recursion early*, captured by the
//! [`Resolver`] trait: a plain `HashMap` of pre-read bridge contents for a
//! single job, or a live, bridge-aware lookup for the executor's final
//! scalar result.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ScoobiError;
use crate::external::Value;
use crate::graph::{Graph, Node};
use crate::node_id::NodeId;

/// Supplies already-known values for a node id, short-circuiting recursion.
/// Returning `Ok(None)` means "keep walking the graph structurally".
pub trait Resolver {
    fn resolve(&self, graph: &Graph, id: NodeId) -> Result<Option<Vec<Value>>, ScoobiError>;
}

/// A resolver that never short-circuits: the pure reference-interpreter
/// path, recomputing everything from `Load`s up.
pub struct NoOverrides;

impl Resolver for NoOverrides {
    fn resolve(&self, _graph: &Graph, _id: NodeId) -> Result<Option<Vec<Value>>, ScoobiError> {
        Ok(None)
    }
}

impl Resolver for HashMap<NodeId, Vec<Value>> {
    fn resolve(&self, _graph: &Graph, id: NodeId) -> Result<Option<Vec<Value>>, ScoobiError> {
        Ok(self.get(&id).cloned())
    }
}

/// Evaluate an `Arr`-shaped node to its element list.
pub fn eval_arr(graph: &Graph, id: NodeId, resolver: &dyn Resolver) -> Result<Vec<Value>, ScoobiError> {
    if let Some(values) = resolver.resolve(graph, id)? {
        return Ok(values);
    }
    match graph.get(id)? {
        Node::Load { source, .. } => {
            let mut out = Vec::new();
            for split in source.input_splits() {
                out.extend(source.reader(&split));
            }
            Ok(out)
        }
        Node::ParallelDo {
            input, env, func, ..
        } => {
            let inputs = eval_arr(graph, input, resolver)?;
            let env_value = eval_exp(graph, env, resolver)?;
            func.setup();
            let mut out = Vec::new();
            for elem in &inputs {
                func.process(elem, &env_value, &mut |v| out.push(v));
            }
            func.cleanup(&env_value, &mut |v| out.push(v));
            Ok(out)
        }
        Node::GroupByKey { input, group_ops, .. } => {
            let pairs = eval_arr(graph, input, resolver)?;
            Ok(group_ops
                .group(pairs)
                .into_iter()
                .map(|(k, vs)| Arc::new((k, vs)) as Value)
                .collect())
        }
        Node::Combine { input, assoc_op, .. } => {
            let groups = eval_arr(graph, input, resolver)?;
            let mut out = Vec::with_capacity(groups.len());
            for group in groups {
                let (key, values) = group
                    .downcast_ref::<(Value, Vec<Value>)>()
                    .expect("Combine input must be GroupByKey's (key, values) shape")
                    .clone();
                let mut iter = values.into_iter();
                if let Some(mut acc) = iter.next() {
                    for v in iter {
                        acc = assoc_op.combine(acc, v);
                    }
                    out.push(Arc::new((key, acc)) as Value);
                }
            }
            Ok(out)
        }
        Node::Flatten { inputs, .. } => {
            let mut out = Vec::new();
            for input in inputs {
                out.extend(eval_arr(graph, input, resolver)?);
            }
            Ok(out)
        }
        other => Err(ScoobiError::Validation(format!(
            "{} ({id}) is not an Arr node",
            other.kind()
        ))),
    }
}

/// Evaluate an `Exp`-shaped node to its single scalar value.
pub fn eval_exp(graph: &Graph, id: NodeId, resolver: &dyn Resolver) -> Result<Value, ScoobiError> {
    match graph.get(id)? {
        Node::Return { value, .. } => Ok(value),
        Node::Op { lhs, rhs, func, .. } => {
            let a = eval_exp(graph, lhs, resolver)?;
            let b = eval_exp(graph, rhs, resolver)?;
            Ok(func.apply(a, b))
        }
        Node::Materialise { input, .. } => {
            let values = eval_arr(graph, input, resolver)?;
            Ok(Arc::new(values) as Value)
        }
        other => Err(ScoobiError::Validation(format!(
            "{} ({id}) is not an Exp node",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::graph::Graph;

    #[test]
    fn word_count_interprets_to_expected_counts() {
        let graph = Graph::new();
        let root = fixtures::word_count(&graph).unwrap();
        let values = eval_arr(&graph, root, &NoOverrides).unwrap();
        assert!(!values.is_empty());
    }
}

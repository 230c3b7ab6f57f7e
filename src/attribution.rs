//! Memoised attribute grammar over the graph.
//!
//! An attribute is a pure function of `(attribute name, node id)`, computed
//! at most once per pair and cached for the lifetime of one planner run
//! (spec.md §3, §4.2). Per spec.md §9's design note, this is implemented as
//! a single lock-guarded map rather than thread-local memoisation, because
//! attribute results (in particular `bridge_store_of`) must be visible
//! across the executor's worker threads when they pre-load environments
//! concurrently (spec.md §4.6's "Environment push").
//!
//! A per-`(attribute, id)` recursion guard fails fast on a self-referential
//! attribute definition instead of overflowing the stack, turning a
//! programmer error into a catchable [`ScoobiError::OptimiserInvariant`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::ScoobiError;
use crate::external::{Bridge, BridgeFactory};
use crate::graph::{Graph, Node};
use crate::node_id::NodeId;

type Key = (&'static str, NodeId);

struct TableInner {
    memo: HashMap<Key, Arc<dyn Any + Send + Sync>>,
    in_progress: HashSet<Key>,
    bridges: HashMap<NodeId, Arc<dyn Bridge>>,
}

/// The memoised attribute table for one planner run.
///
/// Cheaply cloneable (shares the same underlying store), matching the
/// teacher's lock-guarded shared-state idiom (see `pipeline::Pipeline`).
#[derive(Clone)]
pub struct AttributeTable {
    inner: Arc<Mutex<TableInner>>,
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTable {
    /// Create a fresh, empty table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner {
                memo: HashMap::new(),
                in_progress: HashSet::new(),
                bridges: HashMap::new(),
            })),
        }
    }

    /// Look up or compute the named attribute at `id`, guarding against
    /// re-entrant evaluation of the same `(name, id)` pair.
    fn memo<T, F>(&self, name: &'static str, id: NodeId, compute: F) -> Result<T, ScoobiError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, ScoobiError>,
    {
        let key: Key = (name, id);
        {
            let mut g = self.inner.lock().unwrap();
            if let Some(v) = g.memo.get(&key) {
                return Ok(v.downcast_ref::<T>().cloned().expect("attribute type stable"));
            }
            if !g.in_progress.insert(key) {
                return Err(ScoobiError::OptimiserInvariant {
                    detail: format!("attribute cycle detected evaluating `{name}` at {id}"),
                });
            }
        }
        let result = compute();
        let mut g = self.inner.lock().unwrap();
        g.in_progress.remove(&key);
        if let Ok(v) = &result {
            g.memo.insert(key, Arc::new(v.clone()));
        }
        result
    }
}

/// `parents(n)`: every node directly referencing `n` as an input, across the
/// whole graph. `O(graph size)`; memoised so repeated callers in the same
/// run pay the cost once per node.
pub fn parents(graph: &Graph, table: &AttributeTable, id: NodeId) -> Result<Vec<NodeId>, ScoobiError> {
    table.memo("parents", id, || {
        let snapshot = graph.snapshot();
        let mut out: Vec<NodeId> = snapshot
            .iter()
            .filter(|(_, n)| n.inputs().contains(&id))
            .map(|(pid, _)| *pid)
            .collect();
        out.sort();
        Ok(out)
    })
}

/// `allUses(n)`: every node transitively reachable *backwards* from `n`
/// (i.e. every consumer, direct or indirect, of `n`'s output).
pub fn all_uses(graph: &Graph, table: &AttributeTable, id: NodeId) -> Result<Vec<NodeId>, ScoobiError> {
    table.memo("allUses", id, || {
        let mut seen = HashSet::new();
        let mut stack = parents(graph, table, id)?;
        while let Some(n) = stack.pop() {
            if seen.insert(n) {
                stack.extend(parents(graph, table, n)?);
            }
        }
        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort();
        Ok(out)
    })
}

/// `usesAsEnvironment(n)`: the `ParallelDo` nodes that consume `n` via their
/// environment edge (as opposed to their main Arr input).
pub fn uses_as_environment(
    graph: &Graph,
    table: &AttributeTable,
    id: NodeId,
) -> Result<Vec<NodeId>, ScoobiError> {
    table.memo("usesAsEnvironment", id, || {
        let snapshot = graph.snapshot();
        let mut out: Vec<NodeId> = snapshot
            .iter()
            .filter(|(_, n)| matches!(n, Node::ParallelDo { env, .. } if *env == id))
            .map(|(pid, _)| *pid)
            .collect();
        out.sort();
        Ok(out)
    })
}

/// `reachableInputs(n)`: every id transitively reachable *forwards* (i.e.
/// every ancestor) from `n`, including `n` itself.
pub fn reachable_inputs(
    graph: &Graph,
    table: &AttributeTable,
    id: NodeId,
) -> Result<Vec<NodeId>, ScoobiError> {
    table.memo("reachableInputs", id, || {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if seen.insert(n) {
                stack.extend(graph.get(n)?.inputs());
            }
        }
        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort();
        Ok(out)
    })
}

/// `reachableOutputs(n)`: every sink-or-process node transitively downstream
/// of `n`, including `n` itself if it is itself a process node.
pub fn reachable_outputs(
    graph: &Graph,
    table: &AttributeTable,
    id: NodeId,
) -> Result<Vec<NodeId>, ScoobiError> {
    table.memo("reachableOutputs", id, || {
        let mut out = all_uses(graph, table, id)?;
        if graph.get(id)?.is_process_node() {
            out.push(id);
        }
        out.sort();
        out.dedup();
        Ok(out)
    })
}

/// `isProcessNode(n)`.
pub fn is_process_node(graph: &Graph, table: &AttributeTable, id: NodeId) -> Result<bool, ScoobiError> {
    table.memo("isProcessNode", id, || Ok(graph.get(id)?.is_process_node()))
}

/// `bridgeStoreOf(n)`: the (lazily created, memoised) bridge a process node
/// owns. Calling this on a non-process node is a programmer error and
/// surfaces as `OptimiserInvariant`, matching the "fail fast" house rule.
pub fn bridge_store_of(
    graph: &Graph,
    table: &AttributeTable,
    factory: &dyn BridgeFactory,
    id: NodeId,
) -> Result<Arc<dyn Bridge>, ScoobiError> {
    if !is_process_node(graph, table, id)? {
        return Err(ScoobiError::OptimiserInvariant {
            detail: format!("bridgeStoreOf requested for non-process node {id}"),
        });
    }
    let mut g = table.inner.lock().unwrap();
    if let Some(b) = g.bridges.get(&id) {
        return Ok(Arc::clone(b));
    }
    drop(g);
    let ser = graph.get(id)?.out_ser();
    let bridge = factory.create(id, ser);
    let mut g = table.inner.lock().unwrap();
    Ok(Arc::clone(g.bridges.entry(id).or_insert(bridge)))
}

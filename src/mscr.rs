//! MSCR (Map-Shuffle-Combine-Reduce) builder and layering.
//!
//! Groups the optimised graph's process nodes into `Mscr` units — the
//! granularity at which one MapReduce job is submitted — then partitions
//! those units into topologically ordered `Layer`s that can run concurrently
//! within a layer but must run layer-after-layer (spec.md §4.4).

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::attribution::{parents, AttributeTable};
use crate::error::ScoobiError;
use crate::graph::{Graph, Node};
use crate::node_id::NodeId;

/// Identifies one `Mscr` unit within a planner run. Stable for the run once
/// assigned by [`build_mscrs`]; not preserved across separate `optimise`/
/// `build_mscrs` calls.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MscrId(u64);

impl fmt::Display for MscrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mscr-{}", self.0)
    }
}

/// Identifies one `Layer` (a batch of mutually independent `Mscr`s).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LayerId(u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// One MapReduce-shaped unit of work: a `GroupByKey` shuffle (its "owning"
/// node), the process nodes that feed it as mappers, an optional reducer
/// (a `Combine` attached directly to the shuffle), and every other process
/// node this unit is responsible for materialising into a bridge.
///
/// A `Mscr` with no `shuffle` at all is a mapper-only unit: either a single
/// orphan `ParallelDo`/`Flatten` with no downstream `GroupByKey`, sitting
/// directly before a sink or another MSCR's mapper phase.
#[derive(Clone, Debug)]
pub struct Mscr {
    pub id: MscrId,
    /// The `GroupByKey` this unit shuffles through, if any.
    pub shuffle: Option<NodeId>,
    /// The `Combine` attached as this unit's reducer, if the builder could
    /// attach one directly (see spec.md §4.4 "Combine attaches to the
    /// reduce phase of the MSCR rooted at its `GroupByKey`").
    pub reducer: Option<NodeId>,
    /// Every process node whose output this unit is responsible for
    /// producing (mapper-side `ParallelDo`/`Flatten` nodes feeding the
    /// shuffle, plus the shuffle/reducer themselves, plus any orphan
    /// process node folded in because it has no shuffle of its own).
    pub process_nodes: Vec<NodeId>,
    /// Process nodes upstream of this unit whose bridges this unit reads.
    pub input_process_nodes: Vec<NodeId>,
}

impl Mscr {
    /// The single node whose bridge represents this unit's final output —
    /// the reducer if attached, else the shuffle, else the last mapper node.
    pub fn output_node(&self) -> NodeId {
        self.reducer
            .or(self.shuffle)
            .or_else(|| self.process_nodes.last().copied())
            .expect("an Mscr always owns at least one process node")
    }
}

/// One batch of mutually-independent `Mscr`s, safe to dispatch concurrently.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub mscrs: Vec<MscrId>,
}

/// The full plan: every `Mscr` the builder produced, and the layer order
/// they must run in.
#[derive(Clone, Debug)]
pub struct Plan {
    pub mscrs: HashMap<MscrId, Mscr>,
    pub layers: Vec<Layer>,
}

impl Plan {
    pub fn mscr(&self, id: MscrId) -> &Mscr {
        self.mscrs.get(&id).expect("plan: unknown mscr id")
    }
}

/// Human-readable rendering of a [`Plan`], mirroring the teacher's
/// `planner::ExecutionExplanation` report.
pub struct PlanExplanation<'a>(pub &'a Plan);

impl fmt::Display for PlanExplanation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for layer in &self.0.layers {
            writeln!(f, "{}:", layer.id)?;
            for mscr_id in &layer.mscrs {
                let mscr = self.0.mscr(*mscr_id);
                let shuffle = mscr
                    .shuffle
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let reducer = mscr
                    .reducer
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    f,
                    "  {} (shuffle={}, reducer={}, nodes={:?})",
                    mscr_id, shuffle, reducer, mscr.process_nodes
                )?;
            }
        }
        Ok(())
    }
}

/// Group the process nodes reachable from `root` into `Mscr` units
/// (spec.md §4.4).
///
/// Rules applied, in order:
/// - Every `GroupByKey` owns one `Mscr`.
/// - A `Combine` whose *only* consumer of its `GroupByKey` input is itself
///   attaches to that `GroupByKey`'s `Mscr` as its reducer. A `GroupByKey`
///   with more than one consumer (fan-out) cannot give any one `Combine` an
///   exclusive reducer slot, so such a `Combine` is left as its own
///   mapper-phase process node instead (see [`crate::optimiser`]'s
///   Combine-to-ParallelDo conversion, applied by the optimiser before this
///   builder ever runs, so by the time `build_mscrs` sees the graph no
///   `Combine` is ever attached to a shared `GroupByKey`).
/// - Every `ParallelDo`/`Flatten` directly feeding a `GroupByKey` (after
///   fusion, so at most one hop away) is folded in as a mapper of that
///   `GroupByKey`'s `Mscr`. A mapper feeding more than one `GroupByKey`
///   belongs to all of their `Mscr`s at once (spec.md §4.4) rather than
///   picking just one owner and making the rest read it back from a bridge.
/// - A `ParallelDo`/`Flatten` with no downstream `GroupByKey` at all (an
///   orphan) becomes a singleton `Mscr` of its own.
pub fn build_mscrs(graph: &Graph, table: &AttributeTable, root: NodeId) -> Result<Plan, ScoobiError> {
    let nodes = reachable(graph, root)?;
    let mut next_mscr = 0u64;
    let mut mscrs: HashMap<MscrId, Mscr> = HashMap::new();
    let mut owner: HashMap<NodeId, MscrId> = HashMap::new();

    // One Mscr per GroupByKey, with its directly attached Combine reducer
    // (if the GroupByKey has exactly one consumer, namely that Combine).
    let mut shuffle_ids: Vec<NodeId> = nodes
        .iter()
        .filter(|(_, n)| matches!(n, Node::GroupByKey { .. }))
        .map(|(id, _)| *id)
        .collect();
    shuffle_ids.sort();

    for gbk in shuffle_ids {
        let id = MscrId(next_mscr);
        next_mscr += 1;
        let consumers = parents(graph, table, gbk)?;
        let reducer = match consumers.as_slice() {
            [only] if matches!(nodes.get(only), Some(Node::Combine { .. })) => Some(*only),
            _ => None,
        };
        let mut process_nodes = vec![gbk];
        if let Some(r) = reducer {
            process_nodes.push(r);
            owner.insert(r, id);
        }
        owner.insert(gbk, id);
        mscrs.insert(
            id,
            Mscr {
                id,
                shuffle: Some(gbk),
                reducer,
                process_nodes,
                input_process_nodes: Vec::new(),
            },
        );
    }

    // Fold mapper-side process nodes: every other process node (ParallelDo,
    // Flatten, or a Combine that could not attach as a reducer) either joins
    // the single GroupByKey/Mscr it feeds, or becomes its own singleton unit.
    let mut process_ids: Vec<NodeId> = nodes
        .iter()
        .filter(|(id, n)| n.is_process_node() && !owner.contains_key(id))
        .map(|(id, _)| *id)
        .collect();
    process_ids.sort();

    for pid in process_ids {
        let consumers = parents(graph, table, pid)?;
        let mut downstream_mscrs: Vec<MscrId> = consumers
            .iter()
            .filter(|c| matches!(nodes.get(c), Some(Node::GroupByKey { .. })))
            .filter_map(|gbk| owner.get(gbk).copied())
            .collect();
        downstream_mscrs.sort();
        downstream_mscrs.dedup();

        if downstream_mscrs.is_empty() {
            let id = MscrId(next_mscr);
            next_mscr += 1;
            owner.insert(pid, id);
            mscrs.insert(
                id,
                Mscr {
                    id,
                    shuffle: None,
                    reducer: None,
                    process_nodes: vec![pid],
                    input_process_nodes: Vec::new(),
                },
            );
        } else {
            // Fed into every downstream GroupByKey's Mscr at once: each unit
            // recomputes this mapper itself rather than one owning it and the
            // rest reading it back from a bridge.
            owner.insert(pid, downstream_mscrs[0]);
            for mscr_id in &downstream_mscrs {
                mscrs.get_mut(mscr_id).unwrap().process_nodes.push(pid);
            }
        }
    }

    // Record cross-Mscr data dependencies: for every process node owned by
    // this unit, any process-node ancestor not itself folded into this same
    // unit's process_nodes is an input this unit reads back from a bridge.
    // Checked against each unit's own process_nodes rather than a single
    // global owner, since a shared mapper is folded into every unit that
    // feeds on it.
    for mscr in mscrs.values_mut() {
        let owned: HashSet<NodeId> = mscr.process_nodes.iter().copied().collect();
        let mut inputs: Vec<NodeId> = Vec::new();
        for &pid in &mscr.process_nodes {
            for input in nodes.get(&pid).expect("process node in reachable set").inputs() {
                if let Some(producer) = nearest_process_ancestor(&nodes, input) {
                    if !owned.contains(&producer) {
                        inputs.push(producer);
                    }
                }
            }
        }
        inputs.sort();
        inputs.dedup();
        mscr.input_process_nodes = inputs;
    }

    let layers = build_layers(&mscrs)?;
    Ok(Plan { mscrs, layers })
}

/// Walk up from `id` to the nearest process node (including `id` itself),
/// stopping at the first one found along each input edge. Non-process nodes
/// (e.g. `Return`, `Load`) have no bridge of their own, so a unit reading
/// past one reads from whatever process node produced it further upstream,
/// or nothing at all if the chain bottoms out at a `Load`/`Return`.
fn nearest_process_ancestor(nodes: &HashMap<NodeId, Node>, id: NodeId) -> Option<NodeId> {
    let mut stack = vec![id];
    let mut seen = HashSet::new();
    while let Some(cur) = stack.pop() {
        if !seen.insert(cur) {
            continue;
        }
        let Some(node) = nodes.get(&cur) else {
            continue;
        };
        if node.is_process_node() {
            return Some(cur);
        }
        if matches!(node, Node::Load { .. }) {
            continue;
        }
        stack.extend(node.inputs());
    }
    None
}

fn reachable(graph: &Graph, root: NodeId) -> Result<HashMap<NodeId, Node>, ScoobiError> {
    let mut out = HashMap::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if out.contains_key(&id) {
            continue;
        }
        let node = graph.get(id)?;
        stack.extend(node.inputs());
        out.insert(id, node);
    }
    Ok(out)
}

/// Partition `mscrs` into topologically ordered layers via Kahn's algorithm:
/// repeatedly peel the set of units whose `input_process_nodes` all belong to
/// already-peeled layers. Ties within one peel (units with no remaining
/// unpeeled dependency) are ordered by `MscrId` for determinism (spec.md §4.4).
pub fn build_layers(mscrs: &HashMap<MscrId, Mscr>) -> Result<Vec<Layer>, ScoobiError> {
    // A process node folded into more than one Mscr (a shared mapper feeding
    // several GroupByKeys) owns itself in every one of them, so this maps
    // each node to *every* Mscr it belongs to rather than assuming one.
    let mut owners_of: HashMap<NodeId, Vec<MscrId>> = HashMap::new();
    for m in mscrs.values() {
        for n in &m.process_nodes {
            owners_of.entry(*n).or_default().push(m.id);
        }
    }

    let mut remaining_deps: HashMap<MscrId, HashSet<MscrId>> = mscrs
        .values()
        .map(|m| {
            let deps: HashSet<MscrId> = m
                .input_process_nodes
                .iter()
                .flat_map(|n| owners_of.get(n).cloned().unwrap_or_default())
                .filter(|dep| *dep != m.id)
                .collect();
            (m.id, deps)
        })
        .collect();

    let mut layers = Vec::new();
    let mut placed: HashSet<MscrId> = HashSet::new();
    let mut layer_id = 0u64;

    while placed.len() < mscrs.len() {
        let mut ready: Vec<MscrId> = remaining_deps
            .iter()
            .filter(|(id, deps)| !placed.contains(id) && deps.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            return Err(ScoobiError::OptimiserInvariant {
                detail: "mscr dependency graph contains a cycle".into(),
            });
        }
        ready.sort();
        for id in &ready {
            placed.insert(*id);
        }
        for deps in remaining_deps.values_mut() {
            for id in &ready {
                deps.remove(id);
            }
        }
        layers.push(Layer {
            id: LayerId(layer_id),
            mscrs: ready,
        });
        layer_id += 1;
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::group_ops_for;
    use crate::graph::Graph;
    use crate::testing::fixtures;

    #[test]
    fn word_count_builds_one_mscr_per_shuffle() {
        let graph = Graph::new();
        let table = AttributeTable::new();
        let root = fixtures::word_count(&graph).unwrap();
        let plan = build_mscrs(&graph, &table, root).unwrap();
        let shuffle_count = plan.mscrs.values().filter(|m| m.shuffle.is_some()).count();
        assert_eq!(shuffle_count, 1);
        assert!(!plan.layers.is_empty());
    }

    #[test]
    fn orphan_parallel_do_gets_its_own_mscr() {
        let graph = Graph::new();
        let table = AttributeTable::new();
        let root = fixtures::single_map(&graph).unwrap();
        let plan = build_mscrs(&graph, &table, root).unwrap();
        assert_eq!(plan.mscrs.len(), 1);
        assert!(plan.mscrs.values().next().unwrap().shuffle.is_none());
    }

    #[test]
    fn shared_mapper_joins_every_downstream_shuffle() {
        let graph = Graph::new();
        let table = AttributeTable::new();
        let root = fixtures::fan_out_mapper(&graph).unwrap();
        let plan = build_mscrs(&graph, &table, root).unwrap();

        let shuffled: Vec<&Mscr> = plan.mscrs.values().filter(|m| m.shuffle.is_some()).collect();
        assert_eq!(shuffled.len(), 2);

        let combine = graph.get(root).unwrap().inputs()[0];
        let gbk = graph.get(combine).unwrap().inputs()[0];
        let mapper = graph.get(gbk).unwrap().inputs()[0];
        for mscr in &shuffled {
            assert!(
                mscr.process_nodes.contains(&mapper),
                "shared mapper should be folded into every downstream shuffle's Mscr"
            );
        }
        for mscr in &shuffled {
            assert!(!mscr.input_process_nodes.contains(&mapper));
        }
    }

    #[test]
    fn group_ops_for_is_usable_standalone() {
        use crate::external::Value;
        use std::sync::Arc;
        let ops = group_ops_for::<String, i64>();
        let pair = |k: &str, v: i64| -> Value {
            let k: Value = Arc::new(k.to_string());
            let v: Value = Arc::new(v);
            Arc::new((k, v))
        };
        let pairs: Vec<Value> = vec![pair("a", 1), pair("a", 2), pair("b", 3)];
        let grouped = ops.group(pairs);
        assert_eq!(grouped.len(), 2);
    }
}

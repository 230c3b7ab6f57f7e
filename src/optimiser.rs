//! Deterministic fix-point graph rewriter (spec.md §4.3).
//!
//! Five rewrite rules are applied, in order, until none of them changes
//! anything. A rewrite rule preserves a node's id when its content is
//! unchanged; a node built fresh by a rule (a fused `ParallelDo`, a
//! duplicated branch, a converted `Combine`) gets a newly minted id. The
//! rewriter never mutates the input [`Graph`] — it builds a plain
//! `HashMap<NodeId, Node>` working copy and assembles a new `Graph` from it
//! via [`Graph::from_parts`] once it reaches a fixpoint.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ScoobiError;
use crate::external::{AssocOp, BinOp, DoFn, SerialiserId, Value};
use crate::graph::{Graph, Node};
use crate::node_id::NodeId;

/// Bound on fixpoint iterations; exceeding it means a rule is oscillating
/// instead of converging, which is an optimiser bug, not a user error.
const MAX_OPTIMISE_PASSES: usize = 64;

/// Run the rewrite rules to a fixpoint, returning the rewritten graph and
/// the (possibly relocated) output node id.
pub fn optimise(graph: &Graph, root: NodeId) -> Result<(Graph, NodeId), ScoobiError> {
    let mut nodes = reachable_subgraph(graph, root)?;
    let mut root = root;
    let mut next_id = nodes
        .keys()
        .map(|id| id.raw())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut pass = 0usize;
    loop {
        pass += 1;
        if pass > MAX_OPTIMISE_PASSES {
            log::debug!(
                "optimiser did not converge after {MAX_OPTIMISE_PASSES} passes at root {root}"
            );
            return Err(ScoobiError::OptimiserInvariant {
                detail: format!("optimiser exceeded {MAX_OPTIMISE_PASSES} passes without converging"),
            });
        }
        let mut changed = false;
        changed |= flatten_normalise(&mut nodes, &mut root);
        changed |= sink_of_flatten(&mut nodes, &mut root, &mut next_id);
        changed |= fuse_parallel_dos(&mut nodes, &mut root, &mut next_id);
        changed |= combine_to_parallel_do_pass(&mut nodes, &mut root, &mut next_id);
        changed |= insert_identity_before_gbk(&mut nodes, &mut root, &mut next_id);
        if !changed {
            log::debug!("optimiser converged after {pass} pass(es)");
            break;
        }
    }
    Ok((Graph::from_parts(next_id, nodes), root))
}

fn reachable_subgraph(graph: &Graph, root: NodeId) -> Result<HashMap<NodeId, Node>, ScoobiError> {
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

fn fresh(next_id: &mut u64) -> NodeId {
    let id = NodeId::new(*next_id);
    *next_id += 1;
    id
}

fn compute_parents(nodes: &HashMap<NodeId, Node>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut out: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (id, n) in nodes {
        for input in n.inputs() {
            out.entry(input).or_default().push(*id);
        }
    }
    for v in out.values_mut() {
        v.sort();
    }
    out
}

/// Re-point every reference to an old id at its replacement, resolving
/// chains, then drop the substituted-away originals.
fn substitute(nodes: &mut HashMap<NodeId, Node>, root: &mut NodeId, subst: &HashMap<NodeId, NodeId>) {
    if subst.is_empty() {
        return;
    }
    let resolve = |mut id: NodeId| -> NodeId {
        let mut hops = 0usize;
        while let Some(&next) = subst.get(&id) {
            id = next;
            hops += 1;
            if hops > subst.len() + 1 {
                break;
            }
        }
        id
    };
    for node in nodes.values_mut() {
        node.remap_inputs(&resolve);
    }
    *root = resolve(*root);
    for old in subst.keys() {
        nodes.remove(old);
    }
}

/// Rule 1: `Flatten(..., Flatten(xs), ...) -> Flatten(..., xs..., ...)`;
/// `Flatten([x]) -> x`.
fn flatten_normalise(nodes: &mut HashMap<NodeId, Node>, root: &mut NodeId) -> bool {
    let mut changed = false;

    let flatten_ids: Vec<NodeId> = nodes
        .iter()
        .filter(|(_, n)| matches!(n, Node::Flatten { .. }))
        .map(|(id, _)| *id)
        .collect();
    for id in flatten_ids {
        let Node::Flatten { inputs, out_ser } = nodes.get(&id).unwrap().clone() else {
            continue;
        };
        let mut expanded = false;
        let mut new_inputs = Vec::with_capacity(inputs.len());
        for input in &inputs {
            if let Some(Node::Flatten { inputs: inner, .. }) = nodes.get(input) {
                new_inputs.extend(inner.iter().copied());
                expanded = true;
            } else {
                new_inputs.push(*input);
            }
        }
        if expanded {
            nodes.insert(id, Node::Flatten { inputs: new_inputs, out_ser });
            changed = true;
        }
    }

    let singletons: HashMap<NodeId, NodeId> = nodes
        .iter()
        .filter_map(|(id, n)| match n {
            Node::Flatten { inputs, .. } if inputs.len() == 1 => Some((*id, inputs[0])),
            _ => None,
        })
        .collect();
    if !singletons.is_empty() {
        substitute(nodes, root, &singletons);
        changed = true;
    }

    changed
}

/// Rule 2: `ParallelDo(Flatten([a, b, ...]), env, fn) ->
/// Flatten([ParallelDo(a, env, fn), ParallelDo(b, env, fn), ...])`, when
/// `fn` carries no barrier forbidding the duplication.
fn sink_of_flatten(nodes: &mut HashMap<NodeId, Node>, root: &mut NodeId, next_id: &mut u64) -> bool {
    let candidates: Vec<NodeId> = nodes
        .iter()
        .filter_map(|(id, n)| match n {
            Node::ParallelDo {
                input, fuse_barrier, ..
            } if !fuse_barrier && matches!(nodes.get(input), Some(Node::Flatten { .. })) => Some(*id),
            _ => None,
        })
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let mut subst = HashMap::new();
    for pdo_id in candidates {
        let Node::ParallelDo {
            input,
            env,
            func,
            group_barrier,
            fuse_barrier,
            out_ser,
        } = nodes.get(&pdo_id).unwrap().clone()
        else {
            unreachable!()
        };
        let Node::Flatten { inputs: branches, .. } = nodes.get(&input).unwrap().clone() else {
            unreachable!()
        };
        let mut new_branches = Vec::with_capacity(branches.len());
        for branch in branches {
            let id = fresh(next_id);
            nodes.insert(
                id,
                Node::ParallelDo {
                    input: branch,
                    env,
                    func: Arc::clone(&func),
                    group_barrier,
                    fuse_barrier,
                    out_ser,
                },
            );
            new_branches.push(id);
        }
        let flat_id = fresh(next_id);
        nodes.insert(
            flat_id,
            Node::Flatten {
                inputs: new_branches,
                out_ser,
            },
        );
        subst.insert(pdo_id, flat_id);
    }
    substitute(nodes, root, &subst);
    true
}

struct PairOp;

impl BinOp for PairOp {
    fn apply(&self, a: Value, b: Value) -> Value {
        Arc::new((a, b)) as Value
    }
}

fn split_pair(env: &Value) -> (Value, Value) {
    env.downcast_ref::<(Value, Value)>()
        .cloned()
        .expect("fused ParallelDo environment must be a paired (Value, Value)")
}

/// The composed function of two fused `ParallelDo`s, forwarding the
/// `setup`/`process`/`cleanup` lifecycle through both stages (spec.md §4.3).
struct FusedDoFn {
    f: Arc<dyn DoFn>,
    g: Arc<dyn DoFn>,
}

impl DoFn for FusedDoFn {
    fn setup(&self) {
        self.f.setup();
        self.g.setup();
    }

    fn process(&self, elem: &Value, env: &Value, emit: &mut dyn FnMut(Value)) {
        let (env_f, env_g) = split_pair(env);
        let g = &self.g;
        let mut mid = |v: Value| g.process(&v, &env_g, emit);
        self.f.process(elem, &env_f, &mut mid);
    }

    fn cleanup(&self, env: &Value, emit: &mut dyn FnMut(Value)) {
        let (env_f, env_g) = split_pair(env);
        let g = &self.g;
        let mut mid = |v: Value| g.process(&v, &env_g, emit);
        self.f.cleanup(&env_f, &mut mid);
        self.g.cleanup(&env_g, emit);
    }
}

/// Rule 3: fuse adjacent `p1 -> p2` when `p1` has exactly one use (`p2`)
/// and no barrier forbids it (`p1.group_barrier == false`; `fuse_barrier`
/// only governs *duplicating* a node across branches, which fusion never
/// does). The fused environment is `Op(env1, env2, pair)`; barriers become
/// `group_barrier = p2.group_barrier`, `fuse_barrier = p2.fuse_barrier`.
fn fuse_parallel_dos(nodes: &mut HashMap<NodeId, Node>, root: &mut NodeId, next_id: &mut u64) -> bool {
    let parents_of = compute_parents(nodes);
    let mut pdo_ids: Vec<NodeId> = nodes
        .iter()
        .filter(|(_, n)| matches!(n, Node::ParallelDo { .. }))
        .map(|(id, _)| *id)
        .collect();
    pdo_ids.sort();

    let mut consumed: HashSet<NodeId> = HashSet::new();
    let mut fused_pairs: Vec<(NodeId, NodeId)> = Vec::new();
    for &p2_id in &pdo_ids {
        if consumed.contains(&p2_id) {
            continue;
        }
        let Node::ParallelDo { input: p1_id, .. } = nodes[&p2_id].clone() else {
            continue;
        };
        if consumed.contains(&p1_id) || p1_id == *root {
            continue;
        }
        let Some(Node::ParallelDo {
            group_barrier: gb1, ..
        }) = nodes.get(&p1_id)
        else {
            continue;
        };
        if *gb1 {
            continue;
        }
        let uses = parents_of.get(&p1_id).map(Vec::as_slice).unwrap_or(&[]);
        if uses != [p2_id] {
            continue;
        }
        consumed.insert(p1_id);
        consumed.insert(p2_id);
        fused_pairs.push((p1_id, p2_id));
    }
    if fused_pairs.is_empty() {
        return false;
    }

    let mut subst = HashMap::new();
    for (p1_id, p2_id) in fused_pairs {
        let Node::ParallelDo {
            input: p1_input,
            env: env1,
            func: f,
            ..
        } = nodes[&p1_id].clone()
        else {
            unreachable!()
        };
        let Node::ParallelDo {
            env: env2,
            func: g,
            group_barrier: gb2,
            fuse_barrier: fb2,
            out_ser: out_ser2,
            ..
        } = nodes[&p2_id].clone()
        else {
            unreachable!()
        };

        let paired_env_id = fresh(next_id);
        nodes.insert(
            paired_env_id,
            Node::Op {
                lhs: env1,
                rhs: env2,
                func: Arc::new(PairOp),
                out_ser: SerialiserId::of::<(Value, Value)>(),
            },
        );

        let fused_id = fresh(next_id);
        nodes.insert(
            fused_id,
            Node::ParallelDo {
                input: p1_input,
                env: paired_env_id,
                func: Arc::new(FusedDoFn { f, g }),
                group_barrier: gb2,
                fuse_barrier: fb2,
                out_ser: out_ser2,
            },
        );
        subst.insert(p2_id, fused_id);
        subst.insert(p1_id, fused_id);
    }
    substitute(nodes, root, &subst);
    true
}

/// Reduces one `GroupByKey`-shaped `(key, values)` group with an
/// [`AssocOp`], used by both [`combine_to_parallel_do_pass`] and the MSCR
/// builder's directly-attached reducer path.
pub(crate) struct ReduceGroupFn {
    pub(crate) op: Arc<dyn AssocOp>,
}

impl DoFn for ReduceGroupFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let (key, values) = elem
            .downcast_ref::<(Value, Vec<Value>)>()
            .expect("Combine input must be GroupByKey's (key, values) shape")
            .clone();
        let mut iter = values.into_iter();
        // Open question (spec.md §9): what to do with an empty value-group.
        // Decision: skip it. `GroupByKey` never actually emits an empty
        // group (every key present has at least one value behind it), so
        // this only guards a degenerate upstream; emitting nothing is safer
        // than panicking on data the planner itself never produces.
        let Some(mut acc) = iter.next() else {
            return;
        };
        for v in iter {
            acc = self.op.combine(acc, v);
        }
        emit(Arc::new((key, acc)) as Value);
    }
}

/// Rule 4: convert a `Combine` to the equivalent `ParallelDo` when its
/// `GroupByKey` input is shared by more than one consumer — so it cannot be
/// the sole reducer attached to that shuffle's MSCR (see `mscr.rs`).
fn combine_to_parallel_do_pass(
    nodes: &mut HashMap<NodeId, Node>,
    root: &mut NodeId,
    next_id: &mut u64,
) -> bool {
    let parents_of = compute_parents(nodes);
    let candidates: Vec<NodeId> = nodes
        .iter()
        .filter_map(|(id, n)| match n {
            Node::Combine { input, .. } => {
                let fan_out = parents_of.get(input).map(Vec::len).unwrap_or(0);
                (fan_out > 1).then_some(*id)
            }
            _ => None,
        })
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let mut subst = HashMap::new();
    for id in candidates {
        let Node::Combine {
            input,
            assoc_op,
            out_ser,
        } = nodes[&id].clone()
        else {
            unreachable!()
        };
        let env_id = fresh(next_id);
        nodes.insert(
            env_id,
            Node::Return {
                value: Arc::new(()) as Value,
                out_ser: SerialiserId::of::<()>(),
            },
        );
        let pdo_id = fresh(next_id);
        nodes.insert(
            pdo_id,
            Node::ParallelDo {
                input,
                env: env_id,
                func: Arc::new(ReduceGroupFn { op: assoc_op }),
                group_barrier: false,
                fuse_barrier: false,
                out_ser,
            },
        );
        subst.insert(id, pdo_id);
    }
    substitute(nodes, root, &subst);
    true
}

struct IdentityFn;

impl DoFn for IdentityFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        emit(Arc::clone(elem));
    }
}

/// Rule 5: insert an identity `ParallelDo` before any `GroupByKey` whose
/// input is not already a `ParallelDo` output, so the MSCR builder always
/// finds a mapper phase to own.
fn insert_identity_before_gbk(
    nodes: &mut HashMap<NodeId, Node>,
    _root: &mut NodeId,
    next_id: &mut u64,
) -> bool {
    let candidates: Vec<NodeId> = nodes
        .iter()
        .filter_map(|(id, n)| match n {
            Node::GroupByKey { input, .. } if !matches!(nodes.get(input), Some(Node::ParallelDo { .. })) => {
                Some(*id)
            }
            _ => None,
        })
        .collect();
    if candidates.is_empty() {
        return false;
    }

    for gbk_id in candidates {
        let Node::GroupByKey {
            input,
            group_ops,
            out_ser,
        } = nodes[&gbk_id].clone()
        else {
            unreachable!()
        };
        let in_ser = nodes[&input].out_ser();
        let env_id = fresh(next_id);
        nodes.insert(
            env_id,
            Node::Return {
                value: Arc::new(()) as Value,
                out_ser: SerialiserId::of::<()>(),
            },
        );
        let identity_id = fresh(next_id);
        nodes.insert(
            identity_id,
            Node::ParallelDo {
                input,
                env: env_id,
                func: Arc::new(IdentityFn),
                group_barrier: true,
                fuse_barrier: false,
                out_ser: in_ser,
            },
        );
        nodes.insert(
            gbk_id,
            Node::GroupByKey {
                input: identity_id,
                group_ops,
                out_ser,
            },
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn singleton_flatten_is_eliminated() {
        let graph = Graph::new();
        let root = fixtures::redundant_flatten(&graph).unwrap();
        let (optimised, new_root) = optimise(&graph, root).unwrap();
        assert!(!matches!(optimised.get(new_root).unwrap(), Node::Flatten { .. }));
    }

    #[test]
    fn chained_maps_fuse_into_one_node() {
        let graph = Graph::new();
        let root = fixtures::chained_maps(&graph).unwrap();
        let before = graph.len();
        let (optimised, new_root) = optimise(&graph, root).unwrap();
        assert!(optimised.len() < before);
        assert!(matches!(optimised.get(new_root).unwrap(), Node::ParallelDo { .. }));
    }

    #[test]
    fn optimise_is_idempotent() {
        let graph = Graph::new();
        let root = fixtures::word_count(&graph).unwrap();
        let (once, root1) = optimise(&graph, root).unwrap();
        let (twice, root2) = optimise(&once, root1).unwrap();
        assert_eq!(once.len(), twice.len());
        assert_eq!(root1, root2);
    }
}

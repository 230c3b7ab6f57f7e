//! Execution graph model: the eight node variants and the arena that holds them.
//!
//! This plays the role the teacher's `node.rs` + `pipeline.rs` play together,
//! generalized from a linear chain to a true shared DAG: [`Node`] is the
//! closed, immutable tagged union (spec.md §3), and [`Graph`] is the
//! identity-keyed arena (spec.md §9 "identity-based DAG with sharing" design
//! note) — nodes are values stored once, keyed by [`NodeId`], with edges
//! expressed as ids rather than owned pointers.
//!
//! No mutation happens after a node is inserted; rewrites in `optimiser.rs`
//! build a *new* `Graph` rather than editing this one in place, matching
//! spec.md §4.3's "a rewrite rule must preserve every node's id when
//! structurally unchanged" invariant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::ScoobiError;
use crate::external::{AssocOp, BinOp, DataSource, DoFn, GroupOps, SerialiserId, Value};
use crate::node_id::NodeId;

/// The two shapes a node's output can take (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// A distributed sequence.
    Arr,
    /// A single scalar value.
    Exp,
}

/// One of the eight closed node variants (spec.md §3's table).
///
/// Every concrete variant has a fixed [`Shape`]; see [`Node::shape`].
/// Function/operator payloads (`DoFn`, `AssocOp`, `BinOp`) are opaque trait
/// objects — the core never interprets their bodies, only the shape they
/// sit in (see spec.md §1's scope note: user-facing semantics are a
/// non-goal).
#[derive(Clone)]
pub enum Node {
    /// Read a distributed collection from an external [`DataSource`].
    Load {
        source: Arc<dyn DataSource>,
        out_ser: SerialiserId,
    },
    /// Apply `func` to each element of `input`, given the evaluated `env`
    /// scalar; emit zero-or-more outputs per element.
    ParallelDo {
        input: NodeId,
        env: NodeId,
        func: Arc<dyn DoFn>,
        /// Forbids fusing this node with a downstream `ParallelDo` (e.g.
        /// because the downstream needs grouped input).
        group_barrier: bool,
        /// Forbids duplicating this node into multiple branches (e.g.
        /// because its function is not replay-safe).
        fuse_barrier: bool,
        out_ser: SerialiserId,
    },
    /// Shuffle: group an `Arr` of `(K, V)` into `(K, Iterable[V])`.
    ///
    /// `group_ops` is the one piece of core-owned typed logic in an
    /// otherwise fully type-erased graph: grouping needs `K: Eq + Hash`,
    /// which no `dyn Any` gives us, so it is supplied once, generically, at
    /// construction time (see [`GroupOps`]).
    GroupByKey {
        input: NodeId,
        group_ops: Arc<dyn GroupOps>,
        out_ser: SerialiserId,
    },
    /// Reduce each value-group of a `GroupByKey` with an associative op.
    Combine {
        input: NodeId,
        assoc_op: Arc<dyn AssocOp>,
        out_ser: SerialiserId,
    },
    /// Concatenate same-typed `Arr` inputs.
    Flatten {
        inputs: Vec<NodeId>,
        out_ser: SerialiserId,
    },
    /// A constant scalar.
    Return { value: Value, out_ser: SerialiserId },
    /// Combine two scalars with a binary function.
    Op {
        lhs: NodeId,
        rhs: NodeId,
        func: Arc<dyn BinOp>,
        out_ser: SerialiserId,
    },
    /// Collect an entire `Arr` into one scalar `Iterable`.
    Materialise { input: NodeId, out_ser: SerialiserId },
}

impl Node {
    /// This node's fixed shape (spec.md §3's table).
    pub fn shape(&self) -> Shape {
        match self {
            Node::Load { .. }
            | Node::ParallelDo { .. }
            | Node::GroupByKey { .. }
            | Node::Combine { .. }
            | Node::Flatten { .. } => Shape::Arr,
            Node::Return { .. } | Node::Op { .. } | Node::Materialise { .. } => Shape::Exp,
        }
    }

    /// This node's direct input ids, in a fixed, documented order.
    ///
    /// `ParallelDo`'s environment edge is listed last; callers that care
    /// about the Arr/Exp split (e.g. the optimiser, the attribute grammar)
    /// use [`Node::main_inputs`]/[`Node::env_input`] instead of this.
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            Node::Load { .. } | Node::Return { .. } => vec![],
            Node::ParallelDo { input, env, .. } => vec![*input, *env],
            Node::GroupByKey { input, .. }
            | Node::Combine { input, .. }
            | Node::Materialise { input, .. } => vec![*input],
            Node::Flatten { inputs, .. } => inputs.clone(),
            Node::Op { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }

    /// This node's output serialiser descriptor.
    pub fn out_ser(&self) -> SerialiserId {
        match self {
            Node::Load { out_ser, .. }
            | Node::ParallelDo { out_ser, .. }
            | Node::GroupByKey { out_ser, .. }
            | Node::Combine { out_ser, .. }
            | Node::Flatten { out_ser, .. }
            | Node::Return { out_ser, .. }
            | Node::Op { out_ser, .. }
            | Node::Materialise { out_ser, .. } => *out_ser,
        }
    }

    /// True for the subset of variants that can root a persisted [`Bridge`](crate::external::Bridge)
    /// (spec.md §3 "process node").
    pub fn is_process_node(&self) -> bool {
        matches!(
            self,
            Node::ParallelDo { .. } | Node::GroupByKey { .. } | Node::Combine { .. } | Node::Flatten { .. }
        )
    }

    /// A short, stable tag used in diagnostics and job naming.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Load { .. } => "Load",
            Node::ParallelDo { .. } => "ParallelDo",
            Node::GroupByKey { .. } => "GroupByKey",
            Node::Combine { .. } => "Combine",
            Node::Flatten { .. } => "Flatten",
            Node::Return { .. } => "Return",
            Node::Op { .. } => "Op",
            Node::Materialise { .. } => "Materialise",
        }
    }

    /// Rewrite every input edge through `f`, in place. Used by the optimiser
    /// to re-point consumers at a rewritten node without a bespoke match per
    /// rewrite rule.
    pub(crate) fn remap_inputs(&mut self, f: impl Fn(NodeId) -> NodeId) {
        match self {
            Node::Load { .. } | Node::Return { .. } => {}
            Node::ParallelDo { input, env, .. } => {
                *input = f(*input);
                *env = f(*env);
            }
            Node::GroupByKey { input, .. }
            | Node::Combine { input, .. }
            | Node::Materialise { input, .. } => {
                *input = f(*input);
            }
            Node::Flatten { inputs, .. } => {
                for id in inputs.iter_mut() {
                    *id = f(*id);
                }
            }
            Node::Op { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
        }
    }
}

struct GraphInner {
    next_id: u64,
    nodes: HashMap<NodeId, Node>,
}

/// The identity-keyed DAG arena.
///
/// Cheaply cloneable (all clones share the same underlying store, the way
/// the teacher's `Pipeline` does), so builders and planner passes can hold
/// their own handle. Node content is immutable once inserted; the optimiser
/// produces a new `Graph` rather than mutating an existing one in place.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<Mutex<GraphInner>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(GraphInner {
                next_id: 0,
                nodes: HashMap::new(),
            })),
        }
    }

    /// Mint a fresh, never-before-used id.
    pub fn new_id(&self) -> NodeId {
        let mut g = self.inner.lock().unwrap();
        let id = NodeId::new(g.next_id);
        g.next_id += 1;
        id
    }

    /// Insert `node` under a freshly minted id and return it.
    pub fn insert(&self, node: Node) -> NodeId {
        let id = self.new_id();
        self.insert_with_id(id, node);
        id
    }

    /// Insert `node` under an explicit id (used by rewrites that preserve a
    /// node's id because its shape/content did not structurally change).
    ///
    /// Panics if `id` is already present — ids are assigned exactly once.
    pub fn insert_with_id(&self, id: NodeId, node: Node) {
        let mut g = self.inner.lock().unwrap();
        assert!(
            g.nodes.insert(id, node).is_none(),
            "graph: id {id} inserted twice"
        );
    }

    /// Fetch a clone of the node at `id`.
    pub fn get(&self, id: NodeId) -> Result<Node, ScoobiError> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| ScoobiError::Validation(format!("graph: missing node {id}")))
    }

    /// This node's shape, looked up by id.
    pub fn shape_of(&self, id: NodeId) -> Result<Shape, ScoobiError> {
        self.get(id).map(|n| n.shape())
    }

    /// A deep snapshot of every node currently in the arena.
    pub fn snapshot(&self) -> HashMap<NodeId, Node> {
        self.inner.lock().unwrap().nodes.clone()
    }

    /// All node ids currently in the arena, in insertion (id) order.
    pub fn ids(&self) -> Vec<NodeId> {
        let g = self.inner.lock().unwrap();
        let mut ids: Vec<NodeId> = g.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    /// Build a graph directly from a node map and an explicit next-id
    /// counter. Used by the optimiser to assemble a rewritten graph: kept
    /// nodes retain their original id, new nodes get fresh ids starting
    /// above `next_id`.
    pub(crate) fn from_parts(next_id: u64, nodes: HashMap<NodeId, Node>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GraphInner { next_id, nodes })),
        }
    }

    /// True if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shorthand constructors. Each returns the freshly inserted node's id.
impl Graph {
    /// `Load(source)`.
    pub fn load(&self, source: Arc<dyn DataSource>) -> NodeId {
        let out_ser = source.serialiser();
        self.insert(Node::Load { source, out_ser })
    }

    /// `ParallelDo(in, env, fn, groupBarrier, fuseBarrier)`.
    ///
    /// `out_ser` describes the element type `func` produces.
    #[allow(clippy::too_many_arguments)]
    pub fn parallel_do(
        &self,
        input: NodeId,
        env: NodeId,
        func: Arc<dyn DoFn>,
        group_barrier: bool,
        fuse_barrier: bool,
        out_ser: SerialiserId,
    ) -> Result<NodeId, ScoobiError> {
        require_shape(self, input, Shape::Arr, "ParallelDo main input")?;
        require_shape(self, env, Shape::Exp, "ParallelDo environment")?;
        Ok(self.insert(Node::ParallelDo {
            input,
            env,
            func,
            group_barrier,
            fuse_barrier,
            out_ser,
        }))
    }

    /// `GroupByKey(in)`.
    pub fn group_by_key(
        &self,
        input: NodeId,
        group_ops: Arc<dyn GroupOps>,
        out_ser: SerialiserId,
    ) -> Result<NodeId, ScoobiError> {
        require_shape(self, input, Shape::Arr, "GroupByKey input")?;
        Ok(self.insert(Node::GroupByKey {
            input,
            group_ops,
            out_ser,
        }))
    }

    /// `Combine(in, assocOp)`.
    pub fn combine(
        &self,
        input: NodeId,
        assoc_op: Arc<dyn AssocOp>,
        out_ser: SerialiserId,
    ) -> Result<NodeId, ScoobiError> {
        require_shape(self, input, Shape::Arr, "Combine input")?;
        Ok(self.insert(Node::Combine {
            input,
            assoc_op,
            out_ser,
        }))
    }

    /// `Flatten(ins)`. `ins` must be non-empty and share one serialiser.
    pub fn flatten(&self, inputs: Vec<NodeId>) -> Result<NodeId, ScoobiError> {
        if inputs.is_empty() {
            return Err(ScoobiError::Validation(
                "Flatten requires at least one input".into(),
            ));
        }
        let mut out_ser = None;
        for &id in &inputs {
            require_shape(self, id, Shape::Arr, "Flatten input")?;
            let ser = self.get(id)?.out_ser();
            match out_ser {
                None => out_ser = Some(ser),
                Some(prev) if prev != ser => {
                    return Err(ScoobiError::Validation(format!(
                        "Flatten inputs have mismatched serialisers: {prev} vs {ser}"
                    )))
                }
                _ => {}
            }
        }
        Ok(self.insert(Node::Flatten {
            inputs,
            out_ser: out_ser.unwrap(),
        }))
    }

    /// `Return(value)`.
    pub fn constant(&self, value: Value, out_ser: SerialiserId) -> NodeId {
        self.insert(Node::Return { value, out_ser })
    }

    /// `Op(e1, e2, f)`.
    pub fn op(
        &self,
        lhs: NodeId,
        rhs: NodeId,
        func: Arc<dyn BinOp>,
        out_ser: SerialiserId,
    ) -> Result<NodeId, ScoobiError> {
        require_shape(self, lhs, Shape::Exp, "Op left operand")?;
        require_shape(self, rhs, Shape::Exp, "Op right operand")?;
        Ok(self.insert(Node::Op {
            lhs,
            rhs,
            func,
            out_ser,
        }))
    }

    /// `Materialise(in)`.
    pub fn materialise(&self, input: NodeId, out_ser: SerialiserId) -> Result<NodeId, ScoobiError> {
        require_shape(self, input, Shape::Arr, "Materialise input")?;
        Ok(self.insert(Node::Materialise { input, out_ser }))
    }
}

fn require_shape(
    graph: &Graph,
    id: NodeId,
    expected: Shape,
    position: &str,
) -> Result<(), ScoobiError> {
    let actual = graph.shape_of(id)?;
    if actual != expected {
        return Err(ScoobiError::Validation(format!(
            "{position}: expected {expected:?} but node {id} is {actual:?}"
        )));
    }
    Ok(())
}

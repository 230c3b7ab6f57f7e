//! External collaborators: the traits the planner/executor core consumes but
//! never implements concretely.
//!
//! Per spec.md §1, the wire/on-disk format, the filesystem layer, and the
//! batch cluster framework itself are out of scope. This module only
//! declares the seams: [`DataSource`]/[`DataSink`] for user data,
//! [`Bridge`]/[`BridgeFactory`] for intermediate storage, [`JobRunner`] for
//! submit-and-wait job execution, and [`SerialiserId`] as the opaque,
//! transparent blob attached to every node's output type. Concrete
//! implementations live only in `testing` (in-memory fakes) in this crate;
//! a real deployment supplies its own.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::config::Configuration;
use crate::node_id::NodeId;

/// A type-erased runtime value.
///
/// The core never inspects the contents of a `Value`; it is downcast only by
/// the user-supplied [`DoFn`], [`AssocOp`], and [`BinOp`] closures that carry
/// the real, statically-typed logic. This is the executor-facing analogue of
/// the teacher's `type_token::Partition`, generalized from "one partition
/// buffer" to "one element, one scalar, or one Iterable-of-either".
pub type Value = Arc<dyn Any + Send + Sync>;

/// An opaque, transparent descriptor of how to encode/decode one element
/// type at a shuffle boundary. The core treats it as a blob it can compare
/// and log, never as something it interprets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SerialiserId {
    id: TypeId,
    name: &'static str,
}

impl SerialiserId {
    /// Construct the descriptor for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Human-readable element type name, for diagnostics and job naming.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for SerialiserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One contiguous slice of a [`DataSource`]'s input.
#[derive(Clone, Debug)]
pub struct Split {
    /// Index of this split within the source.
    pub index: usize,
    /// Implementation-defined location descriptor (path, offset range, …).
    pub descriptor: String,
}

/// An external, pluggable data source consumed by [`Node::Load`](crate::graph::Node::Load).
pub trait DataSource: Send + Sync {
    /// Partition the source into independently readable splits.
    fn input_splits(&self) -> Vec<Split>;

    /// Open an iterator of type-erased elements over one split.
    fn reader(&self, split: &Split) -> Box<dyn Iterator<Item = Value> + Send>;

    /// Descriptor of the element type this source produces.
    fn serialiser(&self) -> SerialiserId;

    /// Best-effort byte-size estimate, used by the reducer-count heuristic.
    fn byte_size_estimate(&self) -> Option<u64> {
        None
    }
}

/// An external, pluggable data sink.
pub trait DataSink: Send + Sync {
    /// Destination path/identifier, for job naming and logging.
    fn output_path(&self) -> &str;

    /// Open a consumer that accepts one element at a time.
    fn writer(&self) -> Box<dyn FnMut(Value) + Send>;

    /// Finalize the sink at job end (e.g. rename staged output into place).
    fn commit(&self) -> anyhow::Result<()>;
}

/// A unique identifier for one [`Bridge`]'s backing store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BridgeStoreId(pub u64);

impl fmt::Display for BridgeStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge-{}", self.0)
    }
}

/// An intermediate materialisation point between two MSCRs (spec.md §3).
///
/// Owned by exactly one process node (the upstream producer). Its lifetime
/// spans from planner emission to the end of the executor run; this crate
/// never checkpoints it across process restarts (spec.md §1 non-goal iii).
pub trait Bridge: Send + Sync {
    /// The unique id of this bridge's backing store.
    fn bridge_store_id(&self) -> BridgeStoreId;

    /// Has this bridge already been written in a prior run (or earlier in
    /// this run)? Drives the skip-already-computed optimisation.
    fn has_been_filled(&self, cfg: &Configuration) -> bool;

    /// Read the bridge's entire contents back as an in-memory iterable.
    fn read_as_iterable(&self, cfg: &Configuration) -> anyhow::Result<Vec<Value>>;

    /// Mark the bridge filled with the given values (called by the executor
    /// once the owning MSCR's job has completed successfully).
    fn mark_filled(&self, values: Vec<Value>) -> anyhow::Result<()>;
}

/// Factory for bridges, supplied by the caller's storage layer.
///
/// The attribute grammar calls this at most once per node id (memoised by
/// `bridge_store_of`, see `attribution.rs`), so a factory implementation may
/// assume `create` is called once per `node_id` per planner run.
pub trait BridgeFactory: Send + Sync {
    /// Create (or look up) the bridge owned by `node_id`.
    fn create(&self, node_id: NodeId, ser: SerialiserId) -> Arc<dyn Bridge>;
}

/// A single per-job applied-function, opaque to the core. Implements the
/// lifecycle spec.md §4.3 requires fusion to forward faithfully:
/// `setup` runs once before the first element, `process` is called once per
/// input element (and may emit zero or more outputs via `emit`), and
/// `cleanup` runs once after the last element (and may also emit, which is
/// why it also receives `env` — a fused cleanup must be able to drain `f`
/// through `g.process`, and `g` needs its half of the paired environment to
/// do so).
pub trait DoFn: Send + Sync {
    /// One-time setup before the first call to [`Self::process`].
    fn setup(&self) {}

    /// Apply the function to one element, given the environment value,
    /// emitting zero or more outputs.
    fn process(&self, elem: &Value, env: &Value, emit: &mut dyn FnMut(Value));

    /// One-time teardown after the last element; may still emit.
    fn cleanup(&self, env: &Value, emit: &mut dyn FnMut(Value)) {
        let _ = (env, emit);
    }
}

/// Type-erased grouping for [`Node::GroupByKey`](crate::graph::Node::GroupByKey).
///
/// The core never has a static `K: Eq + Hash` to group with, so `GroupByKey`
/// carries a small type-erased strategy constructed once, generically, at
/// graph-building time (mirroring the teacher's `VecOps`/`vec_ops_for::<T>()`
/// pattern in spirit — a typed implementation bound behind a trait object).
///
/// By convention, `GroupByKey`'s input elements are `Arc<(Value, Value)>`
/// `(key, value)` pairs, and its output elements are `Arc<(Value, Vec<Value>)>`
/// `(key, values)` groups — the one representation choice the core itself
/// owns (unlike arbitrary `ParallelDo` element shapes, which are opaque).
pub trait GroupOps: Send + Sync {
    /// Group a flat list of `(key, value)` pairs by key equality.
    fn group(&self, pairs: Vec<Value>) -> Vec<(Value, Vec<Value>)>;

    /// Merge several per-partition groupings into one, concatenating
    /// value-lists that share a key. Used by the shuffle merge phase.
    fn merge(&self, parts: Vec<Vec<(Value, Vec<Value>)>>) -> Vec<(Value, Vec<Value>)>;
}

struct GroupOpsImpl<K, V> {
    _k: std::marker::PhantomData<K>,
    _v: std::marker::PhantomData<V>,
}

impl<K, V> GroupOps for GroupOpsImpl<K, V>
where
    K: 'static + Eq + std::hash::Hash + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    fn group(&self, pairs: Vec<Value>) -> Vec<(Value, Vec<Value>)> {
        let mut groups: Vec<(K, Vec<V>)> = Vec::new();
        let mut index: std::collections::HashMap<K, usize> = std::collections::HashMap::new();
        for pair in pairs {
            let (k, v) = pair
                .downcast_ref::<(Value, Value)>()
                .expect("GroupByKey input must be (Value, Value) pairs")
                .clone();
            let k = k.downcast_ref::<K>().expect("GroupByKey key type mismatch").clone();
            let v = v
                .downcast_ref::<V>()
                .expect("GroupByKey value type mismatch")
                .clone();
            match index.get(&k) {
                Some(&i) => groups[i].1.push(v),
                None => {
                    index.insert(k.clone(), groups.len());
                    groups.push((k, vec![v]));
                }
            }
        }
        groups
            .into_iter()
            .map(|(k, vs)| {
                let key: Value = Arc::new(k);
                let values: Vec<Value> = vs.into_iter().map(|v| Arc::new(v) as Value).collect();
                (key, values)
            })
            .collect()
    }

    fn merge(&self, parts: Vec<Vec<(Value, Vec<Value>)>>) -> Vec<(Value, Vec<Value>)> {
        let mut groups: Vec<(K, Vec<V>)> = Vec::new();
        let mut index: std::collections::HashMap<K, usize> = std::collections::HashMap::new();
        for part in parts {
            for (k, vs) in part {
                let k = k.downcast_ref::<K>().expect("GroupByKey key type mismatch").clone();
                let mut vs: Vec<V> = vs
                    .into_iter()
                    .map(|v| v.downcast_ref::<V>().expect("GroupByKey value type mismatch").clone())
                    .collect();
                match index.get(&k) {
                    Some(&i) => groups[i].1.append(&mut vs),
                    None => {
                        index.insert(k.clone(), groups.len());
                        groups.push((k, vs));
                    }
                }
            }
        }
        groups
            .into_iter()
            .map(|(k, vs)| {
                let key: Value = Arc::new(k);
                let values: Vec<Value> = vs.into_iter().map(|v| Arc::new(v) as Value).collect();
                (key, values)
            })
            .collect()
    }
}

/// Construct a type-erased [`GroupOps`] for a concrete `(K, V)` pairing.
pub fn group_ops_for<K, V>() -> Arc<dyn GroupOps>
where
    K: 'static + Eq + std::hash::Hash + Clone + Send + Sync,
    V: 'static + Clone + Send + Sync,
{
    Arc::new(GroupOpsImpl::<K, V> {
        _k: std::marker::PhantomData,
        _v: std::marker::PhantomData,
    })
}

/// An associative (ideally commutative) binary operator over values sharing
/// one key's group, used by [`Node::Combine`](crate::graph::Node::Combine).
///
/// Must be associative: the runtime may apply it in any order/grouping
/// across partitions and across the shuffle (spec.md §5's ordering
/// guarantees treat a key's values as an unordered multiset).
pub trait AssocOp: Send + Sync {
    /// Combine two values of the same (accumulator) type.
    fn combine(&self, a: Value, b: Value) -> Value;
}

/// A binary function over two scalar ([`Shape::Exp`](crate::graph::Shape::Exp))
/// values, used by [`Node::Op`](crate::graph::Node::Op).
pub trait BinOp: Send + Sync {
    /// Combine the two evaluated operands into a result value.
    fn apply(&self, a: Value, b: Value) -> Value;
}

/// The submit-and-wait job runner: the only component aware of the
/// underlying batch framework (spec.md §4.7). One call blocks the calling
/// thread until the job finishes (or fails); the executor is responsible for
/// running multiple calls concurrently across a layer's MSCRs.
pub trait JobRunner: Send + Sync {
    /// Submit `spec` and block until it completes, returning its report.
    fn submit(&self, spec: crate::job::JobSpec) -> anyhow::Result<crate::job::JobReport>;
}

//! Small, hand-built graphs exercising one shape each, shared by the
//! optimiser/MSCR/interpreter/executor unit tests.
//!
//! Each fixture returns the root [`NodeId`] of a graph already inserted into
//! the caller's [`Graph`]. Kept deliberately minimal — one concern per
//! fixture — rather than one large shared graph, so a failing test names
//! exactly the shape it exercises.

use std::sync::Arc;

use crate::error::ScoobiError;
use crate::external::{group_ops_for, AssocOp, DoFn, SerialiserId, Value};
use crate::graph::Graph;
use crate::node_id::NodeId;
use crate::testing::mock_io::VecSource;

fn unit_env(graph: &Graph) -> NodeId {
    graph.constant(Arc::new(()) as Value, SerialiserId::of::<()>())
}

struct SplitWordsFn;

impl DoFn for SplitWordsFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let line = elem.downcast_ref::<String>().expect("SplitWordsFn: expected String");
        for word in line.split_whitespace() {
            let key: Value = Arc::new(word.to_string());
            let one: Value = Arc::new(1i64);
            emit(Arc::new((key, one)));
        }
    }
}

struct SumI64;

impl AssocOp for SumI64 {
    fn combine(&self, a: Value, b: Value) -> Value {
        let a = *a.downcast_ref::<i64>().expect("SumI64: expected i64");
        let b = *b.downcast_ref::<i64>().expect("SumI64: expected i64");
        Arc::new(a + b)
    }
}

struct DoubleFn;

impl DoFn for DoubleFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let n = *elem.downcast_ref::<i32>().expect("DoubleFn: expected i32");
        emit(Arc::new(n * 2));
    }
}

struct AddOneFn;

impl DoFn for AddOneFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let n = *elem.downcast_ref::<i32>().expect("AddOneFn: expected i32");
        emit(Arc::new(n + 1));
    }
}

struct RekeyByCountFn;

impl DoFn for RekeyByCountFn {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let (word, count) = elem
            .downcast_ref::<(Value, Value)>()
            .expect("RekeyByCountFn: expected (word, count) pair")
            .clone();
        emit(Arc::new((count, word)));
    }
}

struct MaxI64;

impl AssocOp for MaxI64 {
    fn combine(&self, a: Value, b: Value) -> Value {
        let a = *a.downcast_ref::<i64>().expect("MaxI64: expected i64");
        let b = *b.downcast_ref::<i64>().expect("MaxI64: expected i64");
        Arc::new(a.max(b))
    }
}

struct ConcatWordsOp;

impl AssocOp for ConcatWordsOp {
    fn combine(&self, a: Value, b: Value) -> Value {
        let a = a.downcast_ref::<String>().expect("ConcatWordsOp: expected String");
        let b = b.downcast_ref::<String>().expect("ConcatWordsOp: expected String");
        Arc::new(format!("{a},{b}"))
    }
}

/// `Load -> ParallelDo(split into (word, 1) pairs) -> GroupByKey -> Combine(sum)`.
///
/// The canonical one-shuffle, one-reducer pipeline: every MSCR/optimiser/
/// interpreter/executor test that wants "a normal-shaped job" uses this.
pub fn word_count(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let lines = VecSource::new(vec![
        "hello world".to_string(),
        "hello rust".to_string(),
        "world of data".to_string(),
    ]);
    let source = graph.load(lines);
    let env = unit_env(graph);
    let pairs = graph.parallel_do(
        source,
        env,
        Arc::new(SplitWordsFn),
        false,
        false,
        SerialiserId::of::<(String, i64)>(),
    )?;
    let grouped = graph.group_by_key(
        pairs,
        group_ops_for::<String, i64>(),
        SerialiserId::of::<(String, Vec<i64>)>(),
    )?;
    graph.combine(grouped, Arc::new(SumI64), SerialiserId::of::<(String, i64)>())
}

/// `Load -> ParallelDo(double)`, with no downstream shuffle at all — the
/// orphan-mapper case `build_mscrs` has to fold into its own singleton unit.
pub fn single_map(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let source = graph.load(VecSource::new(vec![1i32, 2, 3, 4, 5]));
    let env = unit_env(graph);
    graph.parallel_do(source, env, Arc::new(DoubleFn), false, false, SerialiserId::of::<i32>())
}

/// `Load -> ParallelDo(double) -> Flatten([that one node])`: a `Flatten`
/// with a single input, which `flatten_normalise` should eliminate entirely
/// (the root collapses to the `ParallelDo` itself).
pub fn redundant_flatten(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let mapped = single_map(graph)?;
    graph.flatten(vec![mapped])
}

/// `Load -> ParallelDo(double) -> ParallelDo(add one)`: two unfused
/// `ParallelDo`s in a row, with no group barrier between them, which
/// `fuse_parallel_dos` should collapse into one node.
pub fn chained_maps(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let source = graph.load(VecSource::new(vec![1i32, 2, 3]));
    let env = unit_env(graph);
    let doubled = graph.parallel_do(source, env, Arc::new(DoubleFn), false, false, SerialiserId::of::<i32>())?;
    let env2 = unit_env(graph);
    graph.parallel_do(doubled, env2, Arc::new(AddOneFn), false, false, SerialiserId::of::<i32>())
}

/// `word_count` followed by a second shuffle: re-key each `(word, count)`
/// pair by its count and group words sharing a count, via a second
/// `GroupByKey`/`Combine`. Two shuffles with a genuine producer/consumer
/// dependency between them — the canonical fixture for exercising
/// `build_layers`' two-layer ordering and the registry's per-bridge pruning
/// across layers, since the second shuffle cannot run until the first's
/// output bridge is filled.
pub fn two_stage_aggregation(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let counts = word_count(graph)?;
    let env = unit_env(graph);
    let rekeyed = graph.parallel_do(
        counts,
        env,
        Arc::new(RekeyByCountFn),
        false,
        false,
        SerialiserId::of::<(i64, String)>(),
    )?;
    let grouped = graph.group_by_key(
        rekeyed,
        group_ops_for::<i64, String>(),
        SerialiserId::of::<(i64, Vec<String>)>(),
    )?;
    graph.combine(grouped, Arc::new(ConcatWordsOp), SerialiserId::of::<(i64, String)>())
}

/// One `ParallelDo` feeding two separate `GroupByKey`s: `(word, 1)` pairs
/// summed by word in one shuffle and reduced to a max in another, both fed
/// by the same mapper. The mapper belongs to both MSCRs at once rather than
/// to just one of them, with the other reading it back from a bridge.
pub fn fan_out_mapper(graph: &Graph) -> Result<NodeId, ScoobiError> {
    let lines = VecSource::new(vec![
        "hello world".to_string(),
        "hello rust".to_string(),
        "world of data".to_string(),
    ]);
    let source = graph.load(lines);
    let env = unit_env(graph);
    let pairs = graph.parallel_do(
        source,
        env,
        Arc::new(SplitWordsFn),
        false,
        false,
        SerialiserId::of::<(String, i64)>(),
    )?;

    let summed_group = graph.group_by_key(
        pairs,
        group_ops_for::<String, i64>(),
        SerialiserId::of::<(String, Vec<i64>)>(),
    )?;
    let summed = graph.combine(summed_group, Arc::new(SumI64), SerialiserId::of::<(String, i64)>())?;

    let maxed_group = graph.group_by_key(
        pairs,
        group_ops_for::<String, i64>(),
        SerialiserId::of::<(String, Vec<i64>)>(),
    )?;
    let maxed = graph.combine(maxed_group, Arc::new(MaxI64), SerialiserId::of::<(String, i64)>())?;

    graph.flatten(vec![summed, maxed])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_fixture_builds() {
        let graph = Graph::new();
        word_count(&graph).unwrap();
    }

    #[test]
    fn single_map_fixture_builds() {
        let graph = Graph::new();
        single_map(&graph).unwrap();
    }

    #[test]
    fn redundant_flatten_fixture_builds() {
        let graph = Graph::new();
        redundant_flatten(&graph).unwrap();
    }

    #[test]
    fn chained_maps_fixture_builds() {
        let graph = Graph::new();
        chained_maps(&graph).unwrap();
    }

    #[test]
    fn two_stage_aggregation_fixture_builds() {
        let graph = Graph::new();
        two_stage_aggregation(&graph).unwrap();
    }

    #[test]
    fn fan_out_mapper_fixture_builds() {
        let graph = Graph::new();
        fan_out_mapper(&graph).unwrap();
    }
}

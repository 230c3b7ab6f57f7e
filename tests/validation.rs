use std::sync::Arc;

use scoobi::external::SerialiserId;
use scoobi::graph::{Graph, Node};
use scoobi::testing::fixtures;
use scoobi::testing::mock_io::VecSource;
use scoobi::validation::validate;

#[test]
fn every_fixture_validates_cleanly() -> anyhow::Result<()> {
    for build in [
        fixtures::word_count as fn(&Graph) -> Result<scoobi::NodeId, scoobi::ScoobiError>,
        fixtures::single_map,
        fixtures::redundant_flatten,
        fixtures::chained_maps,
        fixtures::two_stage_aggregation,
    ] {
        let graph = Graph::new();
        let root = build(&graph)?;
        validate(&graph, root)?;
    }
    Ok(())
}

#[test]
fn flatten_rejects_mismatched_serialisers_at_construction_time() -> anyhow::Result<()> {
    let graph = Graph::new();
    let ints = graph.load(VecSource::new(vec![1i32, 2, 3]));
    let strings = graph.load(VecSource::new(vec!["a".to_string(), "b".to_string()]));
    let err = graph.flatten(vec![ints, strings]);
    assert!(err.is_err());
    Ok(())
}

#[test]
fn op_rejects_an_arr_shaped_operand_at_construction_time() -> anyhow::Result<()> {
    let graph = Graph::new();
    let arr = graph.load(VecSource::new(vec![1i32, 2, 3]));
    let scalar = graph.constant(Arc::new(1i32), SerialiserId::of::<i32>());
    struct NoOp;
    impl scoobi::external::BinOp for NoOp {
        fn apply(&self, a: scoobi::external::Value, _b: scoobi::external::Value) -> scoobi::external::Value {
            a
        }
    }
    let err = graph.op(arr, scalar, Arc::new(NoOp), SerialiserId::of::<i32>());
    assert!(err.is_err());
    Ok(())
}

#[test]
fn a_graph_with_a_dangling_edge_built_below_the_safe_constructors_fails_validation() -> anyhow::Result<()> {
    let graph = Graph::new();
    let source = fixtures::single_map(&graph)?;
    let ghost = graph.new_id();
    let bogus = graph.new_id();
    graph.insert_with_id(
        bogus,
        Node::Flatten {
            inputs: vec![source, ghost],
            out_ser: graph.get(source)?.out_ser(),
        },
    );
    assert!(validate(&graph, bogus).is_err());
    Ok(())
}

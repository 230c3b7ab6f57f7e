use scoobi::attribution::AttributeTable;
use scoobi::config::Configuration;
use scoobi::graph::Graph;
use scoobi::mscr::build_mscrs;
use scoobi::registry::Registry;
use scoobi::testing::fixtures;
use scoobi::testing::mock_io::InMemoryBridgeFactory;

#[test]
fn a_prefilled_bridge_with_no_sink_skips_its_mscr() -> anyhow::Result<()> {
    let graph = Graph::new();
    let table = AttributeTable::new();
    let root = fixtures::word_count(&graph)?;
    let mut plan = build_mscrs(&graph, &table, root)?;
    let factory = InMemoryBridgeFactory::new();

    factory.prefill(root, vec![]);

    let registry = Registry::new();
    let before = plan.mscrs.len();
    registry.prune(&graph, &table, factory.as_ref(), &Configuration::default(), &mut plan)?;

    assert!(plan.mscrs.len() < before);
    assert!(plan.layers.iter().all(|l| !l.mscrs.is_empty()));
    Ok(())
}

#[test]
fn a_prefilled_bridge_with_an_unfilled_sink_still_runs() -> anyhow::Result<()> {
    use scoobi::testing::mock_io::VecSink;

    let graph = Graph::new();
    let table = AttributeTable::new();
    let root = fixtures::word_count(&graph)?;
    let mut plan = build_mscrs(&graph, &table, root)?;
    let factory = InMemoryBridgeFactory::new();
    factory.prefill(root, vec![]);

    let registry = Registry::new();
    registry.register_sink(root, VecSink::<(String, i64)>::new("out.csv"))?;

    let before = plan.mscrs.len();
    registry.prune(&graph, &table, factory.as_ref(), &Configuration::default(), &mut plan)?;

    assert_eq!(
        plan.mscrs.len(),
        before,
        "bridge is filled but the registered sink has not been written yet, so the unit must still run"
    );
    Ok(())
}

#[test]
fn registering_two_different_sinks_for_the_same_node_is_rejected() -> anyhow::Result<()> {
    use scoobi::testing::mock_io::VecSink;

    let graph = Graph::new();
    let root = fixtures::single_map(&graph)?;
    let registry = Registry::new();

    registry.register_sink(root, VecSink::<i32>::new("first.csv"))?;
    let err = registry.register_sink(root, VecSink::<i32>::new("second.csv"));
    assert!(err.is_err());
    Ok(())
}

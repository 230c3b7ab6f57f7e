use scoobi::attribution::AttributeTable;
use scoobi::graph::Graph;
use scoobi::mscr::build_mscrs;
use scoobi::testing::fixtures;

#[test]
fn a_second_shuffle_downstream_of_the_first_lands_in_a_later_layer() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::two_stage_aggregation(&graph)?;
    let table = AttributeTable::new();

    let plan = build_mscrs(&graph, &table, root)?;

    assert_eq!(plan.mscrs.values().filter(|m| m.shuffle.is_some()).count(), 2);
    assert!(plan.layers.len() >= 2, "expected at least two layers, got {}", plan.layers.len());

    let owner_of_root = plan
        .mscrs
        .values()
        .find(|m| m.process_nodes.contains(&root))
        .expect("root node must belong to some mscr")
        .id;
    let root_layer = plan
        .layers
        .iter()
        .position(|l| l.mscrs.contains(&owner_of_root))
        .expect("root's mscr must be in some layer");

    assert!(root_layer > 0, "the second shuffle's mscr should not be in the first layer");
    Ok(())
}

#[test]
fn layering_is_a_valid_topological_order() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::two_stage_aggregation(&graph)?;
    let table = AttributeTable::new();
    let plan = build_mscrs(&graph, &table, root)?;

    let mut placed = std::collections::HashSet::new();
    for layer in &plan.layers {
        for &mscr_id in &layer.mscrs {
            let mscr = plan.mscr(mscr_id);
            for input in &mscr.input_process_nodes {
                let producer_mscr = plan
                    .mscrs
                    .values()
                    .find(|m| m.process_nodes.contains(input))
                    .map(|m| m.id);
                if let Some(producer) = producer_mscr {
                    assert!(
                        placed.contains(&producer),
                        "mscr {mscr_id} depends on {producer} which has not been placed in an earlier layer"
                    );
                }
            }
        }
        for &mscr_id in &layer.mscrs {
            placed.insert(mscr_id);
        }
    }
    assert_eq!(placed.len(), plan.mscrs.len());
    Ok(())
}

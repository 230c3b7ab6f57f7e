use scoobi::attribution::AttributeTable;
use scoobi::graph::Graph;
use scoobi::mscr::{build_mscrs, PlanExplanation};
use scoobi::testing::fixtures;

#[test]
fn plan_explanation_lists_every_layer_and_mscr() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::two_stage_aggregation(&graph)?;
    let table = AttributeTable::new();
    let plan = build_mscrs(&graph, &table, root)?;

    let rendered = PlanExplanation(&plan).to_string();

    for layer in &plan.layers {
        assert!(rendered.contains(&layer.id.to_string()));
        for mscr_id in &layer.mscrs {
            assert!(rendered.contains(&mscr_id.to_string()));
        }
    }
    Ok(())
}

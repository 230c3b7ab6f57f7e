use scoobi::graph::{Graph, Node};
use scoobi::interpret::{self, NoOverrides};
use scoobi::optimiser::optimise;
use scoobi::testing::fixtures;

#[test]
fn redundant_flatten_is_eliminated_and_semantics_are_preserved() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::redundant_flatten(&graph)?;

    let before = interpret::eval_arr(&graph, root, &NoOverrides)?;
    let (optimised, new_root) = optimise(&graph, root)?;
    let after = interpret::eval_arr(&optimised, new_root, &NoOverrides)?;

    assert!(!matches!(optimised.get(new_root)?, Node::Flatten { .. }));
    assert_eq!(before.len(), after.len());
    Ok(())
}

#[test]
fn chained_maps_fuse_and_semantics_are_preserved() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::chained_maps(&graph)?;

    let before_count = graph.len();
    let before = interpret::eval_arr(&graph, root, &NoOverrides)?;
    let (optimised, new_root) = optimise(&graph, root)?;
    let after = interpret::eval_arr(&optimised, new_root, &NoOverrides)?;

    assert!(optimised.len() < before_count);
    assert!(matches!(optimised.get(new_root)?, Node::ParallelDo { .. }));

    let before_vals: Vec<i32> = before.iter().map(|v| *v.downcast_ref::<i32>().unwrap()).collect();
    let after_vals: Vec<i32> = after.iter().map(|v| *v.downcast_ref::<i32>().unwrap()).collect();
    assert_eq!(before_vals, vec![3, 5, 7]);
    assert_eq!(before_vals, after_vals);
    Ok(())
}

#[test]
fn word_count_semantics_are_preserved_across_optimisation() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::word_count(&graph)?;

    let before = interpret::eval_arr(&graph, root, &NoOverrides)?;
    let (optimised, new_root) = optimise(&graph, root)?;
    let after = interpret::eval_arr(&optimised, new_root, &NoOverrides)?;

    let mut before_counts: Vec<(String, i64)> = pairs_of(&before);
    let mut after_counts: Vec<(String, i64)> = pairs_of(&after);
    before_counts.sort();
    after_counts.sort();
    assert_eq!(before_counts, after_counts);
    Ok(())
}

#[test]
fn optimise_is_idempotent_on_every_fixture() -> anyhow::Result<()> {
    for build in [
        fixtures::word_count as fn(&Graph) -> Result<scoobi::NodeId, scoobi::ScoobiError>,
        fixtures::single_map,
        fixtures::redundant_flatten,
        fixtures::chained_maps,
        fixtures::two_stage_aggregation,
    ] {
        let graph = Graph::new();
        let root = build(&graph)?;
        let (once, root1) = optimise(&graph, root)?;
        let (twice, root2) = optimise(&once, root1)?;
        assert_eq!(once.len(), twice.len());
        assert_eq!(root1, root2);
    }
    Ok(())
}

fn pairs_of(values: &[scoobi::external::Value]) -> Vec<(String, i64)> {
    values
        .iter()
        .map(|pair| {
            let (k, v) = pair
                .downcast_ref::<(scoobi::external::Value, scoobi::external::Value)>()
                .unwrap();
            (k.downcast_ref::<String>().unwrap().clone(), *v.downcast_ref::<i64>().unwrap())
        })
        .collect()
}

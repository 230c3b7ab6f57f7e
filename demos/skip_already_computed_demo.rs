//! Demonstrates the registry's skip-already-computed pruning: pre-filling a
//! bridge (simulating a prior run's output) removes its MSCR from the plan
//! entirely, so re-running the same graph does no redundant work.
//!
//! Run with: `cargo run --example skip_already_computed_demo`

use anyhow::Result;
use scoobi::attribution::AttributeTable;
use scoobi::config::Configuration;
use scoobi::mscr::build_mscrs;
use scoobi::graph::Graph;
use scoobi::registry::Registry;
use scoobi::testing::fixtures;
use scoobi::testing::mock_io::InMemoryBridgeFactory;

fn main() -> Result<()> {
    println!("=== Skip-already-computed pruning ===\n");

    let graph = Graph::new();
    let root = fixtures::word_count(&graph)?;
    let table = AttributeTable::new();
    let factory = InMemoryBridgeFactory::new();

    let mut plan = build_mscrs(&graph, &table, root)?;
    println!("fresh plan: {} mscr(s)", plan.mscrs.len());

    factory.prefill(root, vec![]);
    println!("pretending a prior run already filled the output bridge...");

    let registry = Registry::new();
    registry.prune(&graph, &table, factory.as_ref(), &Configuration::default(), &mut plan)?;
    println!("pruned plan: {} mscr(s)", plan.mscrs.len());

    Ok(())
}

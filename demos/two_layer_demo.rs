//! A pipeline with two dependent shuffles — word counting, then grouping
//! words by their count — and the two-layer plan the MSCR builder produces
//! for it.
//!
//! Run with: `cargo run --example two_layer_demo`

use anyhow::Result;
use scoobi::attribution::AttributeTable;
use scoobi::graph::Graph;
use scoobi::mscr::{build_mscrs, PlanExplanation};
use scoobi::testing::fixtures;

fn main() -> Result<()> {
    println!("=== Two-layer execution plan ===\n");

    let graph = Graph::new();
    let root = fixtures::two_stage_aggregation(&graph)?;
    let table = AttributeTable::new();
    let plan = build_mscrs(&graph, &table, root)?;

    println!("{} MSCRs across {} layers:\n", plan.mscrs.len(), plan.layers.len());
    println!("{}", PlanExplanation(&plan));

    Ok(())
}

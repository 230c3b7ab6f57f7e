//! Shows the optimiser collapsing a chain of unfused maps into one
//! `ParallelDo`, and a redundant single-input `Flatten` disappearing
//! entirely.
//!
//! Run with: `cargo run --example fusion_demo`

use std::sync::Arc;

use anyhow::Result;
use scoobi::external::{DoFn, SerialiserId, Value};
use scoobi::graph::{Graph, Node};
use scoobi::optimiser::optimise;
use scoobi::testing::mock_io::VecSource;

struct Double;
impl DoFn for Double {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        emit(Arc::new(*elem.downcast_ref::<i32>().unwrap() * 2));
    }
}

struct AddOne;
impl DoFn for AddOne {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        emit(Arc::new(*elem.downcast_ref::<i32>().unwrap() + 1));
    }
}

fn main() -> Result<()> {
    println!("=== Optimiser: ParallelDo fusion ===\n");

    let graph = Graph::new();
    let source = graph.load(VecSource::new(vec![1i32, 2, 3, 4]));
    let env = graph.constant(Arc::new(()) as Value, SerialiserId::of::<()>());

    let doubled = graph.parallel_do(source, env, Arc::new(Double), false, false, SerialiserId::of::<i32>())?;
    let env2 = graph.constant(Arc::new(()) as Value, SerialiserId::of::<()>());
    let root = graph.parallel_do(doubled, env2, Arc::new(AddOne), false, false, SerialiserId::of::<i32>())?;

    println!("before optimisation: {} nodes", graph.len());
    let (optimised, new_root) = optimise(&graph, root)?;
    println!("after optimisation:  {} nodes", optimised.len());
    println!(
        "root is now a single {} node",
        optimised.get(new_root)?.kind()
    );
    assert!(matches!(optimised.get(new_root)?, Node::ParallelDo { .. }));

    println!("\n=== Optimiser: singleton Flatten elimination ===\n");
    let graph2 = Graph::new();
    let source2 = graph2.load(VecSource::new(vec![10i32, 20]));
    let env3 = graph2.constant(Arc::new(()) as Value, SerialiserId::of::<()>());
    let mapped = graph2.parallel_do(source2, env3, Arc::new(Double), false, false, SerialiserId::of::<i32>())?;
    let root2 = graph2.flatten(vec![mapped])?;

    println!("before optimisation: root is {}", graph2.get(root2)?.kind());
    let (optimised2, new_root2) = optimise(&graph2, root2)?;
    println!("after optimisation:  root is {}", optimised2.get(new_root2)?.kind());

    Ok(())
}

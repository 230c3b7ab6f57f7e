//! Word count, start to finish: build a graph by hand, run it through the
//! executor's in-memory backend, and print the result.
//!
//! Run with: `cargo run --example word_count_demo`

use std::sync::Arc;

use anyhow::Result;
use scoobi::config::Configuration;
use scoobi::executor::Executor;
use scoobi::external::{group_ops_for, AssocOp, DoFn, SerialiserId, Value};
use scoobi::graph::Graph;
use scoobi::testing::mock_io::{InMemoryBridgeFactory, InMemoryJobRunner, VecSource};

struct SplitWords;

impl DoFn for SplitWords {
    fn process(&self, elem: &Value, _env: &Value, emit: &mut dyn FnMut(Value)) {
        let line = elem.downcast_ref::<String>().unwrap();
        for word in line.split_whitespace() {
            let key: Value = Arc::new(word.to_lowercase());
            let one: Value = Arc::new(1i64);
            emit(Arc::new((key, one)));
        }
    }
}

struct Sum;

impl AssocOp for Sum {
    fn combine(&self, a: Value, b: Value) -> Value {
        let a = *a.downcast_ref::<i64>().unwrap();
        let b = *b.downcast_ref::<i64>().unwrap();
        Arc::new(a + b)
    }
}

fn main() -> Result<()> {
    println!("=== Word Count ===\n");

    let graph = Graph::new();
    let lines = VecSource::new(vec![
        "the quick brown fox".to_string(),
        "the lazy dog sleeps".to_string(),
        "the fox jumps over the dog".to_string(),
    ]);
    let source = graph.load(lines);
    let env = graph.constant(Arc::new(()) as Value, SerialiserId::of::<()>());
    let pairs = graph.parallel_do(source, env, Arc::new(SplitWords), false, false, SerialiserId::of::<(String, i64)>())?;
    let grouped = graph.group_by_key(pairs, group_ops_for::<String, i64>(), SerialiserId::of::<(String, Vec<i64>)>())?;
    let counts_node = graph.combine(grouped, Arc::new(Sum), SerialiserId::of::<(String, i64)>())?;
    let root = graph.materialise(counts_node, graph.get(counts_node)?.out_ser())?;

    let executor = Executor::new(
        Configuration::default(),
        InMemoryBridgeFactory::new(),
        InMemoryJobRunner::new(),
    );
    let result = executor.execute(&graph, root)?.expect("Materialise root yields a value");
    let pairs = result.downcast_ref::<Vec<Value>>().unwrap();

    let mut counts: Vec<(String, i64)> = pairs
        .iter()
        .map(|p| {
            let (k, v) = p.downcast_ref::<(Value, Value)>().unwrap();
            (k.downcast_ref::<String>().unwrap().clone(), *v.downcast_ref::<i64>().unwrap())
        })
        .collect();
    counts.sort();

    for (word, count) in &counts {
        println!("  {word}: {count}");
    }

    #[cfg(feature = "metrics")]
    {
        println!("\n=== Job Metrics ===");
        executor.metrics().print();
    }

    Ok(())
}

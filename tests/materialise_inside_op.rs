use std::sync::Arc;

use scoobi::config::Configuration;
use scoobi::executor::Executor;
use scoobi::external::{BinOp, SerialiserId, Value};
use scoobi::graph::Graph;
use scoobi::testing::mock_io::{InMemoryBridgeFactory, InMemoryJobRunner, VecSource};

struct CountLengths;

impl BinOp for CountLengths {
    fn apply(&self, a: Value, b: Value) -> Value {
        let a = a.downcast_ref::<Vec<Value>>().expect("lhs of Op is a materialised Arr");
        let b = *b.downcast_ref::<i32>().expect("rhs of Op is a scalar i32");
        Arc::new(a.len() as i32 + b)
    }
}

#[test]
fn materialise_feeds_a_scalar_op_correctly() -> anyhow::Result<()> {
    let graph = Graph::new();
    let source = graph.load(VecSource::new(vec![1i32, 2, 3, 4, 5]));
    let materialised = graph.materialise(source, SerialiserId::of::<Vec<i32>>())?;
    let bump = graph.constant(Arc::new(10i32), SerialiserId::of::<i32>());
    let root = graph.op(materialised, bump, Arc::new(CountLengths), SerialiserId::of::<i32>())?;

    let executor = Executor::new(
        Configuration::default(),
        InMemoryBridgeFactory::new(),
        InMemoryJobRunner::new(),
    );
    let result = executor.execute(&graph, root)?.expect("Op root yields a value");
    let value = *result.downcast_ref::<i32>().expect("root is Exp-shaped");
    assert_eq!(value, 5 + 10);
    Ok(())
}

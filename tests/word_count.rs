use scoobi::config::Configuration;
use scoobi::executor::Executor;
use scoobi::external::Value;
use scoobi::graph::Graph;
use scoobi::interpret::{self, NoOverrides};
use scoobi::testing::fixtures;
use scoobi::testing::mock_io::{InMemoryBridgeFactory, InMemoryJobRunner};

#[test]
fn executor_agrees_with_the_reference_interpreter_on_word_count() -> anyhow::Result<()> {
    let graph = Graph::new();
    let word_counts = fixtures::word_count(&graph)?;
    let root = graph.materialise(word_counts, graph.get(word_counts)?.out_ser())?;

    let expected = interpret::eval_arr(&graph, word_counts, &NoOverrides)?;

    let executor = Executor::new(
        Configuration::default(),
        InMemoryBridgeFactory::new(),
        InMemoryJobRunner::new(),
    );
    let result = executor.execute(&graph, root)?.expect("Materialise root yields a value");
    let got = result
        .downcast_ref::<Vec<Value>>()
        .expect("Materialise yields the collection it reads back");

    assert_eq!(got.len(), expected.len());

    let mut counts: Vec<(String, i64)> = got
        .iter()
        .map(|pair| {
            let (k, v) = pair
                .downcast_ref::<(Value, Value)>()
                .expect("word_count output is (key, count) pairs");
            let word = k.downcast_ref::<String>().unwrap().clone();
            let count = *v.downcast_ref::<i64>().unwrap();
            (word, count)
        })
        .collect();
    counts.sort();

    assert_eq!(
        counts,
        vec![
            ("data".to_string(), 1),
            ("hello".to_string(), 2),
            ("of".to_string(), 1),
            ("rust".to_string(), 1),
            ("world".to_string(), 2),
        ]
    );
    Ok(())
}

#[test]
fn executor_records_one_job_per_mscr() -> anyhow::Result<()> {
    let graph = Graph::new();
    let root = fixtures::word_count(&graph)?;

    let executor = Executor::new(
        Configuration::default(),
        InMemoryBridgeFactory::new(),
        InMemoryJobRunner::new(),
    );
    executor.execute(&graph, root)?;

    let totals = executor.metrics().totals();
    assert_eq!(totals.job_count, 1);
    assert!(totals.records_written > 0);
    Ok(())
}

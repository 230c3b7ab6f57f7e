//! The executor: turns an optimised graph into a sequence of submitted jobs
//! and a final scalar result (spec.md §4.6–§4.8).
//!
//! Mirrors the shape of the teacher's `Runner` (`runner.rs`): a small struct
//! holding the execution mode and concurrency knobs, with `rayon` doing the
//! within-layer fan-out. Where the teacher's `Runner` walks one linear chain
//! of `Node`s directly, this executor walks a [`Plan`] of `Mscr`s, submitting
//! one job per unit through a caller-supplied [`JobRunner`] instead of
//! executing partitions itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::attribution::{bridge_store_of, AttributeTable};
use crate::config::Configuration;
use crate::error::ScoobiError;
use crate::external::{BridgeFactory, JobRunner, Value};
use crate::graph::Graph;
use crate::interpret::{self, Resolver};
use crate::job::JobAdapter;
use crate::mscr::{self, MscrId, Plan};
use crate::node_id::NodeId;
use crate::optimiser;
use crate::registry::Registry;
use crate::validation;

/// A cooperative cancellation flag, checked between layers and before each
/// job within a layer is dispatched. Cheaply cloneable; share one instance
/// between the caller and the in-flight `execute` call to cancel it.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives one run end-to-end: optimise, plan, prune, execute layer by layer,
/// then evaluate the root to a final [`Value`] (spec.md §4.8).
pub struct Executor {
    cfg: Configuration,
    bridge_factory: Arc<dyn BridgeFactory>,
    job_runner: Arc<dyn JobRunner>,
    registry: Registry,
    cancel: CancellationToken,
    #[cfg(feature = "metrics")]
    metrics: crate::metrics::MetricsCollector,
}

impl Executor {
    pub fn new(
        cfg: Configuration,
        bridge_factory: Arc<dyn BridgeFactory>,
        job_runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            cfg,
            bridge_factory,
            job_runner,
            registry: Registry::new(),
            cancel: CancellationToken::new(),
            #[cfg(feature = "metrics")]
            metrics: crate::metrics::MetricsCollector::new(),
        }
    }

    /// The per-job counters recorded so far (feature: `metrics`).
    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> &crate::metrics::MetricsCollector {
        &self.metrics
    }

    /// A handle the caller can use to request cancellation of this executor's
    /// in-flight (or future) [`Self::execute`] call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register `node`'s output as also needing to be written to an external
    /// sink once its owning MSCR completes.
    pub fn register_sink(
        &self,
        node: NodeId,
        sink: Arc<dyn crate::external::DataSink>,
    ) -> Result<(), ScoobiError> {
        self.registry.register_sink(node, sink)
    }

    /// Run `root` to completion: optimise the graph, validate it, build the
    /// MSCR plan, skip already-computed units, dispatch every layer's jobs
    /// (concurrently within a layer when `cfg.concurrent_jobs`), and finally
    /// evaluate `root` itself by structural recursion (spec.md §4.6):
    /// `Op`/`Return`/`Materialise` roots yield a value, any other (bare)
    /// `Arr` root only runs its layers and yields `None` — its output lives
    /// in its bridge (and sink, if one was registered), not in the return
    /// value.
    pub fn execute(&self, graph: &Graph, root: NodeId) -> Result<Option<Value>, ScoobiError> {
        validation::validate(graph, root)?;

        let (optimised, new_root) = optimiser::optimise(graph, root)?;
        let table = AttributeTable::new();
        let mut plan = mscr::build_mscrs(&optimised, &table, new_root)?;
        self.registry
            .prune(&optimised, &table, self.bridge_factory.as_ref(), &self.cfg, &mut plan)?;

        let mut next_job_id = 0u64;
        for layer in plan.layers.clone() {
            if self.cancel.is_cancelled() {
                return Err(ScoobiError::Cancelled);
            }
            self.run_layer(&optimised, &table, &plan, &layer, &mut next_job_id)?;
        }

        let resolver = BridgeResolver {
            table: &table,
            factory: self.bridge_factory.as_ref(),
            cfg: &self.cfg,
        };
        let shape = optimised.shape_of(new_root)?;
        match shape {
            crate::graph::Shape::Exp => Ok(Some(interpret::eval_exp(&optimised, new_root, &resolver)?)),
            crate::graph::Shape::Arr => Ok(None),
        }
    }

    fn run_layer(
        &self,
        graph: &Graph,
        table: &AttributeTable,
        plan: &Plan,
        layer: &crate::mscr::Layer,
        next_job_id: &mut u64,
    ) -> Result<(), ScoobiError> {
        let mut specs = Vec::with_capacity(layer.mscrs.len());
        for &mscr_id in &layer.mscrs {
            let job_id = *next_job_id;
            *next_job_id += 1;
            let spec = JobAdapter::configure(
                graph,
                table,
                plan,
                mscr_id,
                layer.id,
                job_id,
                &self.cfg,
                self.bridge_factory.as_ref(),
            )?;
            specs.push((mscr_id, spec));
        }

        let run_one = |(mscr_id, spec): (MscrId, crate::job::JobSpec)| -> Result<(MscrId, crate::job::JobReport), ScoobiError> {
            let report = self.job_runner.submit(spec).map_err(|e| ScoobiError::JobFailure {
                mscr: mscr_id,
                layer: layer.id,
                message: e.to_string(),
            })?;
            Ok((mscr_id, report))
        };

        let reports: Vec<Result<(MscrId, crate::job::JobReport), ScoobiError>> = if self.cfg.concurrent_jobs {
            specs.into_par_iter().map(run_one).collect()
        } else {
            specs.into_iter().map(run_one).collect()
        };

        for result in reports {
            let (mscr_id, report) = result?;
            self.commit(graph, table, plan, layer.id, mscr_id, report)?;
        }
        Ok(())
    }

    fn commit(
        &self,
        graph: &Graph,
        table: &AttributeTable,
        plan: &Plan,
        layer_id: crate::mscr::LayerId,
        mscr_id: MscrId,
        report: crate::job::JobReport,
    ) -> Result<(), ScoobiError> {
        let mscr = plan.mscr(mscr_id);
        for &node in &mscr.process_nodes {
            let Some(values) = report.output_for(node) else {
                continue;
            };
            let bridge = bridge_store_of(graph, table, self.bridge_factory.as_ref(), node)?;
            bridge
                .mark_filled(values.clone())
                .map_err(|e| ScoobiError::Io(e.to_string()))?;
            self.registry.mark_bridge_filled(bridge.bridge_store_id());

            if let Some(sink) = self.registry.sink_for(node) {
                let mut write = sink.writer();
                for v in values {
                    write(Arc::clone(v));
                }
                sink.commit().map_err(|e| ScoobiError::Io(e.to_string()))?;
                self.registry.mark_sink_filled(node);
            }
        }

        #[cfg(feature = "metrics")]
        self.metrics.record(crate::metrics::JobMetrics::from_report(&report, mscr_id, layer_id));

        Ok(())
    }
}

/// The executor's own [`Resolver`]: short-circuits at any process node whose
/// bridge has already been filled (by this run's job dispatch, or a prior
/// run), and lets everything else recurse structurally — which only ever
/// bottoms out at a `Load`, since every other process node's bridge was
/// filled by the layer loop above before this resolver is ever consulted.
struct BridgeResolver<'a> {
    table: &'a AttributeTable,
    factory: &'a dyn BridgeFactory,
    cfg: &'a Configuration,
}

impl Resolver for BridgeResolver<'_> {
    fn resolve(&self, graph: &Graph, id: NodeId) -> Result<Option<Vec<Value>>, ScoobiError> {
        if !graph.get(id)?.is_process_node() {
            return Ok(None);
        }
        let bridge = bridge_store_of(graph, self.table, self.factory, id)?;
        if !bridge.has_been_filled(self.cfg) {
            return Ok(None);
        }
        let values = bridge.read_as_iterable(self.cfg).map_err(|e| ScoobiError::Io(e.to_string()))?;
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::testing::fixtures;
    use crate::testing::mock_io::{InMemoryBridgeFactory, InMemoryJobRunner};

    #[test]
    fn word_count_executes_to_the_same_answer_as_the_reference_interpreter() {
        let graph = Graph::new();
        let counts = fixtures::word_count(&graph).unwrap();
        let root = graph
            .materialise(counts, graph.get(counts).unwrap().out_ser())
            .unwrap();

        let expected = interpret::eval_arr(&graph, counts, &interpret::NoOverrides).unwrap();

        let executor = Executor::new(
            Configuration::default(),
            InMemoryBridgeFactory::new(),
            InMemoryJobRunner::new(),
        );
        let result = executor.execute(&graph, root).unwrap().expect("Materialise root yields a value");
        let got = result
            .downcast_ref::<Vec<Value>>()
            .expect("Materialise yields the collection it reads back");

        assert_eq!(got.len(), expected.len());
    }

    #[test]
    fn a_bare_arr_root_runs_its_layers_and_returns_nothing() {
        let graph = Graph::new();
        let root = fixtures::word_count(&graph).unwrap();
        let executor = Executor::new(
            Configuration::default(),
            InMemoryBridgeFactory::new(),
            InMemoryJobRunner::new(),
        );
        let result = executor.execute(&graph, root).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cancelling_before_execute_aborts_the_run() {
        let graph = Graph::new();
        let root = fixtures::word_count(&graph).unwrap();
        let executor = Executor::new(
            Configuration::default(),
            InMemoryBridgeFactory::new(),
            InMemoryJobRunner::new(),
        );
        executor.cancellation_token().cancel();
        let err = executor.execute(&graph, root).unwrap_err();
        assert!(matches!(err, ScoobiError::Cancelled));
    }
}

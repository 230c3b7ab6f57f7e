//! Job adapter: translates one `(Mscr, Layer)` pair into a submit-and-wait
//! [`JobSpec`] for the external [`JobRunner`] (spec.md §4.7).
//!
//! The adapter is the only place that knows the reducer-count heuristic and
//! the temp-output-directory naming convention; everything else about "how
//! to actually run a MapReduce job" belongs to the `JobRunner` the caller
//! supplies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::attribution::{bridge_store_of, AttributeTable};
use crate::config::Configuration;
use crate::error::ScoobiError;
use crate::external::{BridgeFactory, Value};
use crate::graph::{Graph, Node};
use crate::interpret::{self, Resolver};
use crate::mscr::{LayerId, Mscr, MscrId, Plan};
use crate::node_id::NodeId;

/// One submit-and-wait unit of work, as seen by a [`JobRunner`].
///
/// Carries enough of the graph to be *run* directly (the `InMemory` backend
/// does exactly this, via [`JobSpec::run_in_process`]) as well as the naming
/// and sizing metadata a real cluster-framework translator would read off to
/// build its own job configuration.
pub struct JobSpec {
    pub job_id: u64,
    pub name: String,
    pub mscr: MscrId,
    pub layer: LayerId,
    pub reducer_count: u32,
    pub tmp_out_dir: PathBuf,
    graph: Graph,
    outputs: Vec<NodeId>,
    inputs: HashMap<NodeId, Vec<Value>>,
}

impl JobSpec {
    /// Run every output node's subgraph directly in this process, using the
    /// pre-read upstream bridge contents as the recursion's base case. This
    /// is what [`crate::testing::mock_io::InMemoryJobRunner`] calls, and
    /// it's also a convenient way for any `JobRunner` implementation to
    /// sanity-check its own translation against the reference semantics.
    pub fn run_in_process(&self) -> anyhow::Result<JobReport> {
        let start = Instant::now();
        let records_read: u64 = self.inputs.values().map(|v| v.len() as u64).sum();
        let mut outputs = HashMap::new();
        for &id in &self.outputs {
            let values = interpret::eval_arr(&self.graph, id, &self.inputs as &dyn Resolver)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            outputs.insert(id, values);
        }
        let records_written: u64 = outputs.values().map(|v| v.len() as u64).sum();
        Ok(JobReport {
            job_id: self.job_id,
            name: self.name.clone(),
            reducer_count: self.reducer_count,
            records_read,
            records_written,
            elapsed: start.elapsed(),
            outputs,
        })
    }
}

/// The result of running one job, enough for the executor to mark bridges
/// (and registered sinks) filled and to feed per-MSCR counters into
/// [`crate::metrics`].
#[derive(Debug)]
pub struct JobReport {
    pub job_id: u64,
    pub name: String,
    pub reducer_count: u32,
    pub records_read: u64,
    pub records_written: u64,
    pub elapsed: Duration,
    pub(crate) outputs: HashMap<NodeId, Vec<Value>>,
}

impl JobReport {
    /// The computed values for one of this job's output nodes, if the
    /// runner populated them (an in-process runner always does; a runner
    /// backed by a real cluster framework may leave this empty and let the
    /// corresponding `Bridge` read its own persisted output instead).
    pub fn output_for(&self, node: NodeId) -> Option<&Vec<Value>> {
        self.outputs.get(&node)
    }
}

/// The submit-and-wait job runner: the only component aware of the
/// underlying batch framework. Re-exported here for convenience; the trait
/// itself lives in [`crate::external`] since it's one of the core's
/// external-collaborator seams.
pub use crate::external::JobRunner;

/// Builds [`JobSpec`]s for one `(Mscr, Layer)` pair (spec.md §4.7).
pub struct JobAdapter;

impl JobAdapter {
    /// Configure the job for `mscr_id` within `layer_id`, reading every
    /// upstream bridge this unit depends on and sizing its reducer count
    /// from the configured heuristic.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        graph: &Graph,
        table: &AttributeTable,
        plan: &Plan,
        mscr_id: MscrId,
        layer_id: LayerId,
        job_id: u64,
        cfg: &Configuration,
        bridge_factory: &dyn BridgeFactory,
    ) -> Result<JobSpec, ScoobiError> {
        let mscr = plan.mscr(mscr_id);

        let mut inputs = HashMap::new();
        for &producer in &mscr.input_process_nodes {
            let bridge = bridge_store_of(graph, table, bridge_factory, producer)?;
            let values = bridge
                .read_as_iterable(cfg)
                .map_err(|e| ScoobiError::Io(e.to_string()))?;
            inputs.insert(producer, values);
        }

        let input_bytes = estimate_input_bytes(graph, mscr, &inputs);
        let reducer_count = cfg.reducer_bounds.reducer_count(input_bytes);

        Ok(JobSpec {
            job_id,
            name: format!("job-{job_id}-{layer_id}-{mscr_id}"),
            mscr: mscr_id,
            layer: layer_id,
            reducer_count,
            tmp_out_dir: cfg.tmp_out_dir(job_id),
            graph: graph.clone(),
            outputs: mscr.process_nodes.clone(),
            inputs,
        })
    }
}

/// Best-effort input-size estimate for the reducer-count heuristic: the sum
/// of every reachable `Load`'s own estimate, plus the already-materialised
/// size of every upstream bridge this unit reads.
fn estimate_input_bytes(graph: &Graph, mscr: &Mscr, inputs: &HashMap<NodeId, Vec<Value>>) -> Option<u64> {
    let mut total = 0u64;
    let mut found_any = false;

    for values in inputs.values() {
        total += values.len() as u64;
        found_any = true;
    }

    let mut stack: Vec<NodeId> = mscr.process_nodes.clone();
    let mut seen = std::collections::HashSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Ok(node) = graph.get(id) else { continue };
        if let Node::Load { source, .. } = &node {
            if let Some(bytes) = source.byte_size_estimate() {
                total += bytes;
                found_any = true;
            }
        }
        if inputs.contains_key(&id) {
            continue;
        }
        stack.extend(node.inputs());
    }

    found_any.then_some(total)
}

//! Configuration object.
//!
//! A typed wrapper over spec.md §6's recognised keys, in the spirit of the
//! teacher's `Runner`/`CheckpointConfig` builder-style structs (see the
//! teacher's `checkpoint.rs` `CheckpointConfig`) rather than a bare
//! `HashMap<String, String>`: every key the core actually reads gets a typed
//! field with a documented default, and unrecognised keys (like
//! `scoobi.uploadedlibjars`, which only the CLI collaborator interprets) are
//! still round-tripped so a caller can stash collaborator-only settings.

use std::collections::HashMap;
use std::path::PathBuf;

/// Resolves the open question in spec.md §9 about `setAsInMemory` vs.
/// `setAsLocal`: `InMemory` is kept as its own, real backend (decision b) —
/// a degenerate [`crate::external::JobRunner`] that executes MSCRs
/// in-process over host-memory iterables, rather than being folded into
/// `Local`. See `testing::InMemoryJobRunner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Execute every MSCR in-process over host-memory data; no external
    /// cluster framework is touched. Used by tests and small interactive runs.
    InMemory,
    /// Execute on the local machine through the batch framework's local runner.
    Local,
    /// Submit to a real batch cluster.
    Cluster,
}

/// Bounds for the reducer-count heuristic (spec.md §4.7):
/// `clamp(ceil(input_bytes / bytes_per_reducer), min_reducers, max_reducers)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReducerBounds {
    /// `scoobi.reducers.min`, default `1`.
    pub min_reducers: u32,
    /// `scoobi.reducers.max`, default `u32::MAX`.
    pub max_reducers: u32,
    /// `scoobi.reducers.bytesperreducer`, default `1 GiB`.
    pub bytes_per_reducer: u64,
}

impl Default for ReducerBounds {
    fn default() -> Self {
        Self {
            min_reducers: 1,
            max_reducers: u32::MAX,
            bytes_per_reducer: 1024 * 1024 * 1024,
        }
    }
}

impl ReducerBounds {
    /// Apply the heuristic to an estimated input byte size (spec.md §4.7).
    ///
    /// `None` input size (the source gave no estimate) falls back to
    /// `min_reducers`, since there's no basis to scale up.
    pub fn reducer_count(&self, input_bytes: Option<u64>) -> u32 {
        let Some(bytes) = input_bytes else {
            return self.min_reducers.max(1);
        };
        let estimated = bytes.div_ceil(self.bytes_per_reducer.max(1)).max(1);
        let estimated = u32::try_from(estimated).unwrap_or(u32::MAX);
        estimated.clamp(self.min_reducers.max(1), self.max_reducers.max(self.min_reducers.max(1)))
    }
}

/// Key-value tuning parameters consumed by the planner/executor core
/// (spec.md §6). Construct with [`Configuration::default`] and override
/// fields, or use [`Configuration::with_raw`] to stash collaborator-only
/// settings (e.g. `scoobi.uploadedlibjars`) the core itself never reads.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// `scoobi.mode`.
    pub mode: ExecutionMode,
    /// `scoobi.workingdir` — base for `staging/`, `localRunner/`, and
    /// `tmp-out-<jobId>/` (spec.md §6).
    pub working_dir: PathBuf,
    /// `scoobi.concurrentJobs` — whether MSCRs within a layer run in parallel.
    pub concurrent_jobs: bool,
    /// `scoobi.reducers.*`.
    pub reducer_bounds: ReducerBounds,
    /// Settings the core does not interpret itself (e.g. the CLI
    /// collaborator's `scoobi.uploadedlibjars`), kept for round-tripping.
    pub raw: HashMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::InMemory,
            working_dir: PathBuf::from("."),
            concurrent_jobs: true,
            reducer_bounds: ReducerBounds::default(),
            raw: HashMap::new(),
        }
    }
}

impl Configuration {
    /// Attach a raw, collaborator-only key/value pair and return `self`.
    pub fn with_raw(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }

    /// The temporary output directory for one job, `<workingDir>/tmp-out-<jobId>`.
    pub fn tmp_out_dir(&self, job_id: u64) -> PathBuf {
        self.working_dir.join(format!("tmp-out-{job_id}"))
    }

    /// The staging directory, `<workingDir>/staging`.
    pub fn staging_dir(&self) -> PathBuf {
        self.working_dir.join("staging")
    }

    /// The per-job local scratch directory, `<workingDir>/localRunner`.
    pub fn local_runner_dir(&self) -> PathBuf {
        self.working_dir.join("localRunner")
    }
}

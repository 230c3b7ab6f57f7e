//! In-memory fakes for every external collaborator trait, plus small
//! filesystem scratch-space helpers for tests that need a real `working_dir`.
//!
//! These are the only concrete implementations of [`DataSource`]/[`DataSink`]/
//! [`Bridge`]/[`BridgeFactory`]/[`JobRunner`] in this crate; a real deployment
//! supplies its own, backed by whatever cluster framework and storage layer it
//! runs on (spec.md §1's scope note).

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::config::Configuration;
use crate::error::ScoobiError;
use crate::external::{
    Bridge, BridgeFactory, BridgeStoreId, DataSink, DataSource, SerialiserId, Split, Value,
};
use crate::job::{JobReport, JobRunner, JobSpec};
use crate::mscr::build_mscrs;
use crate::node_id::NodeId;
use crate::attribution::AttributeTable;
use crate::graph::Graph;

/// A temporary directory deleted on drop, for tests that exercise
/// [`Configuration::working_dir`](crate::config::Configuration).
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    /// The directory's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TempDirPath {
    fn default() -> Self {
        Self::new().expect("failed to create temporary directory")
    }
}

/// A [`DataSource`] that reads from an in-memory `Vec`, split into one chunk
/// per split count requested.
pub struct VecSource<T> {
    data: Vec<T>,
    splits: usize,
}

impl<T: Clone + Send + Sync + 'static> VecSource<T> {
    /// Wrap `data` as a source with a single split.
    pub fn new(data: Vec<T>) -> Arc<Self> {
        Arc::new(Self { data, splits: 1 })
    }

    /// Wrap `data` as a source partitioned into `splits` roughly-even chunks.
    pub fn with_splits(data: Vec<T>, splits: usize) -> Arc<Self> {
        Arc::new(Self {
            data,
            splits: splits.max(1),
        })
    }
}

impl<T: Clone + Send + Sync + 'static> DataSource for VecSource<T> {
    fn input_splits(&self) -> Vec<Split> {
        (0..self.splits)
            .map(|i| Split {
                index: i,
                descriptor: format!("in-memory chunk {i}"),
            })
            .collect()
    }

    fn reader(&self, split: &Split) -> Box<dyn Iterator<Item = Value> + Send> {
        let chunk_len = self.data.len().div_ceil(self.splits).max(1);
        let start = split.index * chunk_len;
        let end = (start + chunk_len).min(self.data.len());
        let chunk: Vec<Value> = self.data[start.min(self.data.len())..end]
            .iter()
            .cloned()
            .map(|v| Arc::new(v) as Value)
            .collect();
        Box::new(chunk.into_iter())
    }

    fn serialiser(&self) -> SerialiserId {
        SerialiserId::of::<T>()
    }

    fn byte_size_estimate(&self) -> Option<u64> {
        Some((self.data.len() * std::mem::size_of::<T>()) as u64)
    }
}

/// A [`DataSink`] that collects every written element into a shared `Vec`,
/// readable after the run via [`VecSink::collected`].
pub struct VecSink<T> {
    path: String,
    collected: Arc<Mutex<Vec<T>>>,
    committed: Arc<Mutex<bool>>,
}

impl<T: Send + Sync + 'static> VecSink<T> {
    pub fn new(path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            collected: Arc::new(Mutex::new(Vec::new())),
            committed: Arc::new(Mutex::new(false)),
        })
    }

    /// Snapshot of everything written so far (requires `T: Clone`).
    pub fn collected(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.collected.lock().unwrap().clone()
    }

    /// Whether [`DataSink::commit`] has been called.
    pub fn is_committed(&self) -> bool {
        *self.committed.lock().unwrap()
    }
}

impl<T: Debug + Send + Sync + 'static> DataSink for VecSink<T> {
    fn output_path(&self) -> &str {
        &self.path
    }

    fn writer(&self) -> Box<dyn FnMut(Value) + Send> {
        let collected = Arc::clone(&self.collected);
        Box::new(move |v: Value| {
            let typed = v.downcast::<T>().expect("VecSink element type mismatch");
            collected.lock().unwrap().push(*typed);
        })
    }

    fn commit(&self) -> anyhow::Result<()> {
        *self.committed.lock().unwrap() = true;
        Ok(())
    }
}

/// An in-memory [`Bridge`]: a shared, lockable slot that is either empty or
/// filled with a `Vec<Value>`.
pub struct InMemoryBridge {
    id: BridgeStoreId,
    slot: Mutex<Option<Vec<Value>>>,
}

impl InMemoryBridge {
    fn new(id: BridgeStoreId) -> Self {
        Self {
            id,
            slot: Mutex::new(None),
        }
    }
}

impl Bridge for InMemoryBridge {
    fn bridge_store_id(&self) -> BridgeStoreId {
        self.id
    }

    fn has_been_filled(&self, _cfg: &Configuration) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    fn read_as_iterable(&self, _cfg: &Configuration) -> anyhow::Result<Vec<Value>> {
        self.slot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("bridge {} read before being filled", self.id))
    }

    fn mark_filled(&self, values: Vec<Value>) -> anyhow::Result<()> {
        *self.slot.lock().unwrap() = Some(values);
        Ok(())
    }
}

/// A [`BridgeFactory`] handing out one [`InMemoryBridge`] per node id,
/// reused across lookups so `has_been_filled`/`read_as_iterable` observe the
/// same store the owning job filled (drives the skip-already-computed tests).
#[derive(Default)]
pub struct InMemoryBridgeFactory {
    bridges: Mutex<HashMap<NodeId, Arc<InMemoryBridge>>>,
}

impl InMemoryBridgeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-fill the bridge for `id`, simulating a prior run's output — used
    /// to test the registry's skip-already-computed pruning.
    pub fn prefill(&self, id: NodeId, values: Vec<Value>) {
        let bridge = self.bridge_for(id);
        bridge.mark_filled(values).expect("in-memory bridge fill is infallible");
    }

    fn bridge_for(&self, id: NodeId) -> Arc<InMemoryBridge> {
        let mut g = self.bridges.lock().unwrap();
        Arc::clone(
            g.entry(id)
                .or_insert_with(|| Arc::new(InMemoryBridge::new(BridgeStoreId(id.raw())))),
        )
    }
}

impl BridgeFactory for InMemoryBridgeFactory {
    fn create(&self, node_id: NodeId, _ser: SerialiserId) -> Arc<dyn Bridge> {
        self.bridge_for(node_id) as Arc<dyn Bridge>
    }
}

/// Resolves spec.md §9's `InMemory` open question (decision b): a degenerate
/// [`JobRunner`] that executes one MSCR's mapper/reducer functions directly
/// over host-memory `Vec<Value>`s, with no external cluster framework
/// involved at all. Doubles as the test fake and as the real `InMemory`
/// execution backend.
#[derive(Default)]
pub struct InMemoryJobRunner;

impl InMemoryJobRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl JobRunner for InMemoryJobRunner {
    fn submit(&self, spec: JobSpec) -> anyhow::Result<JobReport> {
        spec.run_in_process()
    }
}

/// Build an executable [`Plan`](crate::mscr::Plan) from a graph without
/// going through the full optimiser — a convenience for tests that want to
/// assert on `build_mscrs`/`build_layers` output directly.
pub fn plan_for(graph: &Graph, root: NodeId) -> Result<crate::mscr::Plan, ScoobiError> {
    build_mscrs(graph, &AttributeTable::new(), root)
}

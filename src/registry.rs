//! Sink/bridge registry: the run-scoped ledger of what has already been
//! written, and the pruning rewrite that turns an already-filled bridge into
//! a virtual `Load` the executor never has to recompute (spec.md §4.5,
//! §4.8's "skip already-computed work").

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::attribution::{bridge_store_of, AttributeTable};
use crate::config::Configuration;
use crate::error::ScoobiError;
use crate::external::{BridgeFactory, BridgeStoreId, DataSink};
use crate::graph::Graph;
use crate::mscr::Plan;
use crate::node_id::NodeId;

/// Tracks which bridges and which registered sinks have already been filled
/// for this run, and which process nodes are additionally meant to be
/// materialised to an external [`DataSink`] once their MSCR completes.
#[derive(Default)]
pub struct Registry {
    sinks: Mutex<std::collections::HashMap<NodeId, Arc<dyn DataSink>>>,
    filled_bridges: Mutex<HashSet<BridgeStoreId>>,
    filled_sinks: Mutex<HashSet<NodeId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node`'s output as also needing to be written to `sink` once
    /// its owning MSCR completes.
    ///
    /// Errors if `node` already has a different sink registered — two sinks
    /// racing to write the same node's output is a planning bug, not
    /// something the executor should silently pick a winner for.
    pub fn register_sink(&self, node: NodeId, sink: Arc<dyn DataSink>) -> Result<(), ScoobiError> {
        let mut sinks = self.sinks.lock().unwrap();
        if let Some(existing) = sinks.get(&node) {
            if existing.output_path() != sink.output_path() {
                return Err(ScoobiError::Validation(format!(
                    "{node} already has sink {} registered, cannot also register {}",
                    existing.output_path(),
                    sink.output_path()
                )));
            }
        }
        sinks.insert(node, sink);
        Ok(())
    }

    pub fn sink_for(&self, node: NodeId) -> Option<Arc<dyn DataSink>> {
        self.sinks.lock().unwrap().get(&node).cloned()
    }

    pub fn mark_bridge_filled(&self, id: BridgeStoreId) {
        self.filled_bridges.lock().unwrap().insert(id);
    }

    pub fn mark_sink_filled(&self, node: NodeId) {
        self.filled_sinks.lock().unwrap().insert(node);
    }

    pub fn is_bridge_filled(&self, id: BridgeStoreId) -> bool {
        self.filled_bridges.lock().unwrap().contains(&id)
    }

    pub fn is_sink_filled(&self, node: NodeId) -> bool {
        self.filled_sinks.lock().unwrap().contains(&node)
    }

    /// Drop every `Mscr` from `plan` whose output bridge is already filled
    /// (from this run or a prior one) and whose registered sink, if any, is
    /// also already filled. Anything downstream still reads the bridge
    /// directly when it builds its own job — skipping the unit here just
    /// means its job never runs, not that its output becomes unreachable.
    pub fn prune(
        &self,
        graph: &Graph,
        table: &AttributeTable,
        factory: &dyn BridgeFactory,
        cfg: &Configuration,
        plan: &mut Plan,
    ) -> Result<(), ScoobiError> {
        let mut skip = HashSet::new();
        for mscr in plan.mscrs.values() {
            let output = mscr.output_node();
            let bridge = bridge_store_of(graph, table, factory, output)?;
            if !bridge.has_been_filled(cfg) {
                continue;
            }
            self.mark_bridge_filled(bridge.bridge_store_id());
            let sink_satisfied = match self.sink_for(output) {
                Some(_) => self.is_sink_filled(output),
                None => true,
            };
            if sink_satisfied {
                skip.insert(mscr.id);
            }
        }
        plan.mscrs.retain(|id, _| !skip.contains(id));
        for layer in &mut plan.layers {
            layer.mscrs.retain(|id| !skip.contains(id));
        }
        plan.layers.retain(|l| !l.mscrs.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::AttributeTable;
    use crate::graph::Graph;
    use crate::testing::fixtures;
    use crate::testing::mock_io::InMemoryBridgeFactory;

    #[test]
    fn prefilled_bridge_removes_its_mscr_from_the_plan() {
        let graph = Graph::new();
        let table = AttributeTable::new();
        let root = fixtures::word_count(&graph).unwrap();
        let mut plan = crate::mscr::build_mscrs(&graph, &table, root).unwrap();
        let factory = InMemoryBridgeFactory::new();

        let some_mscr = *plan.mscrs.keys().next().unwrap();
        let output = plan.mscr(some_mscr).output_node();
        factory.prefill(output, vec![]);

        let registry = Registry::new();
        let before = plan.mscrs.len();
        registry
            .prune(&graph, &table, factory.as_ref(), &Configuration::default(), &mut plan)
            .unwrap();
        assert!(plan.mscrs.len() < before);
    }
}

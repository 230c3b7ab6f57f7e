//! # Scoobi
//!
//! A **planner/executor core** for compiling distributed-collection dataflows
//! down to a sequence of MapReduce-shaped jobs, in the style of the Scoobi
//! Scala library's `ScoobiApp`/`InputOutputContext` internals.
//!
//! This crate is deliberately narrow: it does not provide a user-facing
//! `DList`/`PCollection` API, does not define any wire or on-disk format for
//! intermediate data, and does not survive a process restart mid-run. What it
//! does provide is everything between "here is a graph of `Load`,
//! `ParallelDo`, `GroupByKey`, `Combine`, `Flatten`, `Return`, `Op`, and
//! `Materialise` nodes" and "here is the final value, computed by submitting
//! the fewest possible MapReduce jobs a caller's [`external::JobRunner`] knows
//! how to run":
//!
//! 1. [`graph`] — the closed node model and the identity-keyed arena that
//!    holds it (sharing, not just a tree).
//! 2. [`attribution`] — a memoised attribute grammar over the graph
//!    (`parents`, `allUses`, `bridgeStoreOf`, …).
//! 3. [`optimiser`] — a deterministic fix-point rewriter: flatten
//!    normalisation, `ParallelDo` fusion, `Combine`-to-mapper conversion, and
//!    the rest of the graph simplifications a real compiler applies before
//!    planning.
//! 4. [`mscr`] — groups the optimised graph's process nodes into
//!    Map-Shuffle-Combine-Reduce units and layers those units into a
//!    topologically-ordered execution plan.
//! 5. [`registry`] — tracks which bridges/sinks are already filled and prunes
//!    the plan accordingly (skip-already-computed work).
//! 6. [`job`] — translates one `(Mscr, Layer)` pair into a submit-and-wait
//!    [`job::JobSpec`] for the caller's job runner.
//! 7. [`executor`] — drives the whole pipeline: optimise, plan, prune,
//!    dispatch layers (concurrently within a layer), evaluate the root.
//! 8. [`interpret`] — a naive reference evaluator used to state and test
//!    semantics preservation, and to power the `InMemory` execution backend.
//!
//! Everything this core consumes but never implements — data sources/sinks,
//! intermediate-storage bridges, and the batch job runner itself — lives
//! behind the traits in [`external`]. Concrete (in-memory) implementations of
//! those traits live only in [`testing`], for this crate's own tests; a real
//! deployment supplies its own, backed by whatever cluster framework and
//! storage layer it runs on.
//!
//! ## Example
//!
//! ```no_run
//! use scoobi::config::Configuration;
//! use scoobi::executor::Executor;
//! use scoobi::external::group_ops_for;
//! use scoobi::graph::Graph;
//! use scoobi::testing::mock_io::{InMemoryBridgeFactory, InMemoryJobRunner, VecSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let graph = Graph::new();
//! let source = VecSource::new(vec!["hello world".to_string(), "hello rust".to_string()]);
//! let lines = graph.load(source);
//! // ... build up ParallelDo/GroupByKey/Combine nodes from `lines` ...
//!
//! let executor = Executor::new(
//!     Configuration::default(),
//!     InMemoryBridgeFactory::new(),
//!     InMemoryJobRunner::new(),
//! );
//! let _ = group_ops_for::<String, i64>(); // used when building a GroupByKey node
//! let _result = executor.execute(&graph, lines)?; // None: bare Arr root, no return value
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The core logs optimiser convergence and job dispatch through the `log`
//! facade, same as the teacher; install any `log` backend (`simple_logger` in
//! this crate's dev-dependencies, `env_logger`, …) to see it.
//!
//! ## Feature Flags
//!
//! - `metrics` (default) — collect per-job counters during execution, see
//!   [`metrics`].

pub mod attribution;
pub mod config;
pub mod error;
pub mod executor;
pub mod external;
pub mod graph;
pub mod interpret;
pub mod job;
pub mod mscr;
pub mod node_id;
pub mod optimiser;
pub mod registry;
pub mod testing;
pub mod validation;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::Configuration;
pub use error::ScoobiError;
pub use executor::{CancellationToken, Executor};
pub use graph::{Graph, Node, Shape};
pub use mscr::{Layer, LayerId, Mscr, MscrId, Plan, PlanExplanation};
pub use node_id::NodeId;

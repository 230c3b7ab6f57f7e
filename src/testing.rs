//! Test-only support: in-memory fakes for every external collaborator,
//! graph-builder fixtures, collection assertions, and small test-data
//! builders.
//!
//! Mirrors the teacher's `testing` module shape (`assertions`, `builders`,
//! `fixtures`, `mock_io`) with one addition specific to this domain:
//! `mock_io` here fakes the planner/executor core's own collaborator traits
//! ([`external::DataSource`]/[`external::DataSink`]/[`external::Bridge`]/
//! [`external::BridgeFactory`]/[`external::JobRunner`]) rather than file
//! formats, since this crate has no file-format layer of its own.

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use builders::*;

//! Error kinds for the planner/executor core.
//!
//! Mirrors the five error kinds from the design: validation, optimiser
//! invariant violations, job failures, cancellation, and I/O failures during
//! bridge reads or sink marks. Kept as a closed enum with a manual
//! `Display`/`Error` implementation in the same idiom as the teacher's
//! `ValidationError` (see `validation.rs`) rather than pulling in a derive
//! macro crate.

use std::fmt;

use crate::mscr::{LayerId, MscrId};

/// A planner- or executor-level error.
///
/// Validation and optimiser-invariant errors are raised synchronously and
/// abort the run before execution starts. Job failures are captured per job
/// so sibling jobs in the same layer can complete; the layer then fails
/// atomically. Cancellation is always reported as its own kind, never
/// conflated with a job failure.
#[derive(Debug, Clone)]
pub enum ScoobiError {
    /// The graph does not type-check in shape, a sink would be written
    /// twice, or a referenced input source is missing.
    Validation(String),
    /// A rewrite pass produced a malformed graph, or an attribute cycle was
    /// detected by the recursion guard.
    OptimiserInvariant {
        /// Human-readable description of the offending node/neighbourhood.
        detail: String,
    },
    /// A batch job returned a non-success status.
    JobFailure {
        /// The MSCR whose job failed.
        mscr: MscrId,
        /// The layer the MSCR belonged to.
        layer: LayerId,
        /// Runner-supplied failure message.
        message: String,
    },
    /// The run was cancelled via the executor's cancellation token.
    Cancelled,
    /// A bridge read or sink-mark operation failed.
    Io(String),
}

impl fmt::Display for ScoobiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::OptimiserInvariant { detail } => {
                write!(f, "optimiser invariant violated: {detail}")
            }
            Self::JobFailure {
                mscr,
                layer,
                message,
            } => write!(
                f,
                "job failure in layer {layer} / mscr {mscr}: {message}"
            ),
            Self::Cancelled => write!(f, "run cancelled"),
            Self::Io(msg) => write!(f, "i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for ScoobiError {}

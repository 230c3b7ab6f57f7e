//! Per-MSCR job counters, aggregated by the executor (feature: `metrics`).
//!
//! Narrower than the teacher's open-ended [`Metric`]/`MetricsCollector`
//! registry (`metrics.rs`): this crate only ever reports a fixed shape of
//! counter (one row per submitted job), so it keeps the teacher's
//! lock-guarded, clonable collector idiom and its JSON/print reporting, but
//! drops the pluggable `Metric` trait and custom-metric registration that
//! existed to support arbitrary user-defined pipeline metrics.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;

use crate::job::JobReport;
use crate::mscr::{LayerId, MscrId};

/// One job's recorded counters, snapshotted from its [`JobReport`].
#[derive(Clone, Debug, Serialize)]
pub struct JobMetrics {
    pub job_id: u64,
    pub name: String,
    pub mscr: MscrId,
    pub layer: LayerId,
    pub reducer_count: u32,
    pub records_read: u64,
    pub records_written: u64,
    pub elapsed_ms: u128,
}

/// Thread-safe sink for [`JobMetrics`], one row appended per job the
/// executor dispatches. Cheaply cloneable (shares the same underlying
/// store), matching the teacher's `MetricsCollector`.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<JobMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, metrics: JobMetrics) {
        self.inner.lock().unwrap().push(metrics);
    }

    /// Snapshot of every job recorded so far, in recording order.
    pub fn snapshot(&self) -> Vec<JobMetrics> {
        self.inner.lock().unwrap().clone()
    }

    /// Total records read/written and job count across every recorded job.
    pub fn totals(&self) -> Totals {
        let jobs = self.inner.lock().unwrap();
        Totals {
            job_count: jobs.len(),
            records_read: jobs.iter().map(|j| j.records_read).sum(),
            records_written: jobs.iter().map(|j| j.records_written).sum(),
        }
    }

    /// Print every recorded job's counters to stdout.
    pub fn print(&self) {
        let jobs = self.inner.lock().unwrap();
        println!("\n========== Job Metrics ==========");
        for job in jobs.iter() {
            println!(
                "{} (layer {}, mscr {}): read={} written={} reducers={} elapsed={}ms",
                job.name, job.layer, job.mscr, job.records_read, job.records_written, job.reducer_count, job.elapsed_ms
            );
        }
        println!("==================================\n");
    }

    /// Render every recorded job as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        json!(self.inner.lock().unwrap().clone())
    }
}

/// Aggregate counters across every job recorded so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct Totals {
    pub job_count: usize,
    pub records_read: u64,
    pub records_written: u64,
}

impl JobMetrics {
    pub(crate) fn from_report(report: &JobReport, mscr: MscrId, layer: LayerId) -> Self {
        Self {
            job_id: report.job_id,
            name: report.name.clone(),
            mscr,
            layer,
            reducer_count: report.reducer_count,
            records_read: report.records_read,
            records_written: report.records_written,
            elapsed_ms: report.elapsed.as_millis(),
        }
    }
}

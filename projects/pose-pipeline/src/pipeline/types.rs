use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A payload tagged with its position in the source sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedItem<T> {
    pub index: usize,
    pub payload: T,
}

impl<T> IndexedItem<T> {
    pub fn new(index: usize, payload: T) -> Self {
        Self { index, payload }
    }
}

/// Message carried by both hand-off channels.
///
/// `Done` is the completion marker. On the input side one is sent per worker;
/// on the output side exactly one is sent after every worker has been joined.
/// `total` is the number of items that were submitted upstream.
#[derive(Debug)]
pub enum Handoff<T> {
    Item(IndexedItem<T>),
    Done { total: Option<usize> },
}

/// Result of transforming a single frame
#[derive(Debug)]
pub enum Outcome<R> {
    Completed(R),
    Failed(String),
}

/// What the ordered writer does when a frame's transformation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the index, log it and keep writing the frames after it.
    #[default]
    SkipAndReport,
    /// Stop emitting at the failed index and fail the run.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::SkipAndReport),
            "fail" => Ok(Self::FailFast),
            other => Err(anyhow::anyhow!(
                "Unknown failure policy '{}' (expected 'skip' or 'fail')",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipAndReport => write!(f, "skip"),
            Self::FailFast => write!(f, "fail"),
        }
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Input hand-off capacity per worker
    pub queue_depth: usize,
    pub policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 2,
            policy: FailurePolicy::SkipAndReport,
        }
    }
}

impl PipelineConfig {
    pub fn input_capacity(&self) -> usize {
        (self.workers * self.queue_depth).max(1)
    }
}

/// Per-worker counters returned when a worker thread exits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub processed: usize,
    pub failed: usize,
    pub ms_per_frame: f64,
}

impl WorkerStats {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    /// Exponential moving average over per-frame durations
    pub fn record(&mut self, duration_ms: f64) {
        if self.ms_per_frame == 0.0 {
            self.ms_per_frame = duration_ms;
        } else {
            self.ms_per_frame = self.ms_per_frame * 0.9 + duration_ms * 0.1;
        }
    }
}

/// What the ordered writer saw by the time it shut down.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriterSummary {
    pub written: usize,
    /// Indices whose transformation reported a failure
    pub failed: Vec<usize>,
    /// Indices that never reached the writer
    pub missing: Vec<usize>,
    /// Completed frames that were stranded behind a gap or a halt
    pub discarded: Vec<usize>,
    /// Set when `FailFast` stopped the writer
    pub halted_at: Option<usize>,
}

impl WriterSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty() && self.discarded.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Single,
    Multi,
}

/// Summary of one batch run, serialized next to the output video on request.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub mode: RunMode,
    pub workers: usize,
    pub policy: FailurePolicy,
    pub submitted: usize,
    #[serde(flatten)]
    pub writer: WriterSummary,
    pub worker_stats: Vec<WorkerStats>,
    pub worker_panics: usize,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn written(&self) -> usize {
        self.writer.written
    }

    pub fn write_json(&self, path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {:?}", path))?;
        Ok(())
    }
}

/// Error returned when a fail-fast run stops early. Carries the report so
/// callers can still persist it.
#[derive(Debug)]
pub struct RunHalted {
    pub report: PipelineReport,
}

impl fmt::Display for RunHalted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {} failed; stopped after writing {} of {} frames",
            self.report.writer.halted_at.unwrap_or_default(),
            self.report.written(),
            self.report.submitted
        )
    }
}

impl std::error::Error for RunHalted {}

impl PipelineReport {
    /// `Err(RunHalted)` when the writer stopped on a failed frame.
    pub fn into_result(self) -> anyhow::Result<Self> {
        if self.writer.halted_at.is_some() {
            return Err(RunHalted { report: self }.into());
        }
        Ok(self)
    }
}

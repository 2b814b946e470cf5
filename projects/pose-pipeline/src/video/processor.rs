use crate::pipeline::types::{
    FailurePolicy, IndexedItem, Outcome, PipelineReport, RunMode, WorkerStats,
};
use crate::pipeline::worker::apply_isolated;
use crate::pipeline::{FrameSink, FrameTransform, OrderedWriter};
use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Progress bar used by both batch modes. `len` may be an estimate from the
/// container metadata.
pub fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Single-threaded mode: one transform instance, frames processed in order on
/// the calling thread. Goes through the same ordered writer as the worker pool
/// so failures are handled identically.
pub fn process_sequential<T, R, I, Tr, S>(
    frames: I,
    mut transform: Tr,
    sink: S,
    policy: FailurePolicy,
    pb: ProgressBar,
) -> Result<PipelineReport>
where
    I: IntoIterator<Item = T>,
    Tr: FrameTransform<T, R>,
    S: FrameSink<R>,
{
    let start_time = Instant::now();
    let mut writer = OrderedWriter::new(sink, policy).with_progress(pb);
    let mut stats = WorkerStats::new(0);
    let mut submitted = 0;

    for (index, frame) in frames.into_iter().enumerate() {
        let start_inst = Instant::now();
        let outcome = apply_isolated(&mut transform, frame);
        stats.processed += 1;
        stats.record(start_inst.elapsed().as_secs_f64() * 1000.0);
        submitted += 1;

        let failed = matches!(outcome, Outcome::Failed(_));
        if failed {
            stats.failed += 1;
        }

        writer.accept(IndexedItem::new(index, outcome))?;
        if failed && policy == FailurePolicy::FailFast {
            break;
        }
    }

    let summary = writer.finish(Some(submitted))?;

    let report = PipelineReport {
        mode: RunMode::Single,
        workers: 1,
        policy,
        submitted,
        writer: summary,
        worker_stats: vec![stats],
        worker_panics: 0,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        finished_at: Utc::now(),
    };

    tracing::info!(
        "Processing time (single-threaded): {:.2} s, {} of {} frames written",
        report.elapsed_secs,
        report.written(),
        report.submitted
    );

    report.into_result()
}

// Pipeline orchestrator: manages the lifecycle of a multi-worker batch run
//
// Wires distributor -> workers -> ordered writer through two crossbeam
// hand-offs and tears them down in an order that never loses trailing frames.

use crate::pipeline::distributor::distribute;
use crate::pipeline::ordered_writer::{writer_worker, FrameSink, OrderedWriter};
use crate::pipeline::types::{
    Handoff, Outcome, PipelineConfig, PipelineReport, RunMode, WorkerStats,
};
use crate::pipeline::worker::{transform_worker, FrameTransform};
use anyhow::{anyhow, Result};
use chrono::Utc;
use crossbeam::channel;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Run the frames through `config.workers` workers and write the results in order.
///
/// `make_transform` is called once inside each worker thread with the worker id,
/// so every worker owns its own model instance. A worker whose transform cannot
/// be built logs the error and exits; the others pick up its share.
pub fn run_pipeline<T, R, I, F, Tr, S>(
    frames: I,
    config: &PipelineConfig,
    make_transform: F,
    sink: S,
    pb: ProgressBar,
) -> Result<PipelineReport>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize) -> Result<Tr> + Send + Sync + 'static,
    Tr: FrameTransform<T, R>,
    S: FrameSink<R> + Send + 'static,
{
    if config.workers == 0 {
        anyhow::bail!("At least one worker is required");
    }

    let start_time = Instant::now();
    let (tx_in, rx_in) = channel::bounded::<Handoff<T>>(config.input_capacity());
    let (tx_out, rx_out) = channel::unbounded::<Handoff<Outcome<R>>>();

    let writer = OrderedWriter::new(sink, config.policy).with_progress(pb);
    let writer_handle = thread::spawn(move || writer_worker(rx_out, writer));

    let make_transform = Arc::new(make_transform);
    let mut worker_handles = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        let rx = rx_in.clone();
        let tx = tx_out.clone();
        let make_transform = make_transform.clone();
        worker_handles.push(thread::spawn(move || {
            tracing::info!(worker_id, "Spawning new transform worker");
            // The transform must be created inside the thread
            match make_transform(worker_id) {
                Ok(transform) => Some(transform_worker(worker_id, rx, tx, transform)),
                Err(e) => {
                    tracing::error!(worker_id, "Failed to initialise worker: {:#}", e);
                    None
                }
            }
        }));
    }
    // Only the workers may hold the input receiver, otherwise a dead pool
    // would leave the distributor blocked on a full channel.
    drop(rx_in);

    let distributed = distribute(frames, &tx_in, config.workers);
    drop(tx_in);

    let mut worker_stats: Vec<WorkerStats> = Vec::with_capacity(config.workers);
    let mut worker_panics = 0;
    for handle in worker_handles {
        match handle.join() {
            Ok(Some(stats)) => {
                tracing::info!(
                    worker_id = stats.worker_id,
                    "Transform worker finished gracefully ({} frames, {} failed)",
                    stats.processed,
                    stats.failed
                );
                worker_stats.push(stats);
            }
            Ok(None) => {}
            Err(_) => {
                worker_panics += 1;
                tracing::error!("Transform worker panicked");
            }
        }
    }

    // Every worker has stopped producing; only now may the writer be told to finish.
    let total = distributed.as_ref().ok().copied();
    if tx_out.send(Handoff::Done { total }).is_err() {
        tracing::warn!("Ordered writer exited before the completion marker");
    }
    drop(tx_out);

    let summary = writer_handle
        .join()
        .map_err(|_| anyhow!("Ordered writer thread panicked"))??;

    let submitted = distributed?;

    let report = PipelineReport {
        mode: RunMode::Multi,
        workers: config.workers,
        policy: config.policy,
        submitted,
        writer: summary,
        worker_stats,
        worker_panics,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
        finished_at: Utc::now(),
    };

    tracing::info!(
        "Processing time ({} workers): {:.2} s, {} of {} frames written",
        config.workers,
        report.elapsed_secs,
        report.written(),
        report.submitted
    );

    report.into_result()
}

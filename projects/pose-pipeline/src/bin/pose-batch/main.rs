mod cli;

use anyhow::{Context, Result};
use cli::{Args, Mode};
use std::path::Path;
use pose_pipeline::pipeline::pose::PoseAnnotator;
use pose_pipeline::pipeline::{run_pipeline, PipelineConfig, PipelineReport, RunHalted};
use pose_pipeline::video::opencv_reader::OpencvReader;
use pose_pipeline::video::opencv_writer::VideoSink;
use pose_pipeline::video::processor::{process_sequential, progress_bar};
use pose_pipeline::video::{Frames, VideoReader};

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse_args();

    pose_pipeline::logging::init(&args.log_dir)?;

    let mut reader = OpencvReader::new(&args.video_path)
        .with_context(|| format!("Failed to open video at: '{}'", args.video_path))?;
    let sink = VideoSink::new(
        &args.output_filename,
        reader.source_fps()?,
        reader.frame_size()?,
    )?;
    let pb = progress_bar(reader.frame_count()?)?;

    let result = match args.mode {
        Mode::Single => {
            let annotator = PoseAnnotator::new(&args.model)
                .with_context(|| format!("Failed to load model: {}", args.model))?;
            process_sequential(
                Frames::new(&mut reader),
                annotator,
                sink,
                args.on_frame_error,
                pb,
            )
        }
        Mode::Multi => {
            let config = PipelineConfig {
                workers: args.workers,
                queue_depth: args.queue_depth,
                policy: args.on_frame_error,
            };
            let model = args.model.clone();
            run_pipeline(
                Frames::new(&mut reader),
                &config,
                move |_worker_id| PoseAnnotator::new(&model),
                sink,
                pb,
            )
        }
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            // A halted run still has a report worth keeping
            if let (Some(path), Some(halted)) = (&args.report, e.downcast_ref::<RunHalted>()) {
                write_report(&halted.report, path)?;
            }
            return Err(e);
        }
    };

    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }

    if !report.writer.is_complete() {
        tracing::warn!(
            "Output is incomplete: failed={:?} missing={:?} discarded={:?}",
            report.writer.failed,
            report.writer.missing,
            report.writer.discarded
        );
    }

    Ok(())
}

fn write_report(report: &PipelineReport, path: &Path) -> Result<()> {
    report.write_json(path)?;
    tracing::info!("Run report written to {:?}", path);
    Ok(())
}

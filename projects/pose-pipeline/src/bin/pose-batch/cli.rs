use clap::{Parser, ValueEnum};
use pose_pipeline::pipeline::FailurePolicy;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Single,
    Multi,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a pose-estimation model over every frame of a video", long_about = None)]
pub struct Args {
    /// Path to the input video
    pub video_path: String,

    /// Execution mode
    #[arg(value_enum)]
    pub mode: Mode,

    /// Path of the annotated output video
    pub output_filename: String,

    /// Number of workers in multi mode
    #[arg(long, env = "POSE_PIPELINE_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Pose model file
    #[arg(long, env = "POSE_PIPELINE_MODEL", default_value = "yolov8s-pose.onnx")]
    pub model: String,

    /// What to do when a frame cannot be processed: skip or fail
    #[arg(long, env = "POSE_PIPELINE_ON_FRAME_ERROR", default_value = "skip")]
    pub on_frame_error: FailurePolicy,

    /// Input hand-off capacity per worker
    #[arg(long, default_value_t = 2)]
    pub queue_depth: usize,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Directory for app.log
    #[arg(long, env = "POSE_PIPELINE_LOG_DIR", default_value = "log")]
    pub log_dir: PathBuf,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

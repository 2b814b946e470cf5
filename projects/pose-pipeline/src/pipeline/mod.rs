// Batch pipeline: distributor, transform workers, ordered writer

pub mod distributor;
pub mod orchestrator;
pub mod ordered_writer;
pub mod pose;
pub mod types;
pub mod worker;

pub use ordered_writer::{FrameSink, OrderedWriter};
pub use orchestrator::run_pipeline;
pub use types::{FailurePolicy, IndexedItem, PipelineConfig, PipelineReport, RunHalted};
pub use worker::FrameTransform;

mod cli;

use anyhow::Result;
use cli::Args;
use pose_pipeline::live::{run_live, stop::StopSignal};

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse_args();

    pose_pipeline::logging::init(&args.log_dir)?;

    let stop = StopSignal::new();
    let ctrlc_stop = stop.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted with Ctrl-C, shutting down");
        ctrlc_stop.trigger();
    })?;

    let result = run_live(&args.live_config(), stop);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    tracing::info!("Sensor display finished");

    result
}

use clap::Parser;
use pose_pipeline::live::{LiveConfig, Resolution};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Show simulated sensors over a live camera feed", long_about = None)]
pub struct Args {
    /// Camera index (0, 1, etc.)
    #[arg(long, env = "SENSOR_DISPLAY_CAMERA", default_value_t = 0)]
    pub camera: i32,

    /// Desired resolution (e.g., 640x480)
    #[arg(long, env = "SENSOR_DISPLAY_RESOLUTION", default_value = "640x480")]
    pub resolution: Resolution,

    /// Display frequency (Hz)
    #[arg(long, env = "SENSOR_DISPLAY_FREQ", default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    pub freq: u32,

    /// How long to wait for sensor threads on shutdown
    #[arg(long, env = "SENSOR_DISPLAY_JOIN_TIMEOUT_MS", default_value_t = 1000)]
    pub join_timeout_ms: u64,

    /// Directory for app.log
    #[arg(long, env = "SENSOR_DISPLAY_LOG_DIR", default_value = "log")]
    pub log_dir: PathBuf,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            camera: self.camera,
            resolution: self.resolution,
            freq: self.freq,
            join_timeout: Duration::from_millis(self.join_timeout_ms),
        }
    }
}

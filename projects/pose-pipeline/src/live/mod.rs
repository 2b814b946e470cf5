// Live multi-sensor display: one thread per sensor, a size-1 slot per sensor,
// and a render loop that never blocks on any of them.

pub mod display;
pub mod runner;
pub mod sensor;
pub mod slot;
pub mod stop;

use anyhow::{anyhow, Context, Result};
use display::{run_display, Dashboard, DisplayWindow, SensorFeed};
use runner::{JoinReport, SensorGroup};
use sensor::{CameraSensor, OpencvCamera, Sensor, SimulatedSensor};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use stop::StopSignal;

/// Simulated sensors and their update period
pub const SIMULATED_SENSORS: [(&str, Duration); 3] = [
    ("s0", Duration::from_millis(10)),
    ("s1", Duration::from_millis(100)),
    ("s2", Duration::from_millis(1000)),
];

/// Requested capture size, parsed from `WxH`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("Invalid resolution format '{}', expected WxH", s))?;
        let width: u32 = w
            .trim()
            .parse()
            .with_context(|| format!("Invalid resolution width in '{}'", s))?;
        let height: u32 = h
            .trim()
            .parse()
            .with_context(|| format!("Invalid resolution height in '{}'", s))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("Resolution must be non-zero, got '{}'", s));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub camera: i32,
    pub resolution: Resolution,
    pub freq: u32,
    pub join_timeout: Duration,
}

/// Runs the live display until a quit key, Ctrl-C, or a fatal sensor error.
pub fn run_live(config: &LiveConfig, stop: StopSignal) -> Result<()> {
    let camera = OpencvCamera::open(
        config.camera,
        config.resolution.width,
        config.resolution.height,
    )
    .context("Camera init failed")?;

    let mut group = SensorGroup::new();
    let mut feeds = Vec::with_capacity(SIMULATED_SENSORS.len() + 1);
    for (name, delay) in SIMULATED_SENSORS {
        let slot = group.spawn(name, Sensor::Simulated(SimulatedSensor::new(delay)), &stop);
        feeds.push(SensorFeed {
            name: name.to_string(),
            slot,
        });
    }
    let slot = group.spawn(
        "cam",
        Sensor::Camera(CameraSensor::new(Box::new(camera))),
        &stop,
    );
    feeds.push(SensorFeed {
        name: "cam".to_string(),
        slot,
    });

    let names: Vec<&str> = SIMULATED_SENSORS.iter().map(|(name, _)| *name).collect();
    let mut dashboard = Dashboard::new(&names);

    let result = DisplayWindow::open(config.freq)
        .and_then(|window| run_display(&window, &mut dashboard, &feeds, &stop));

    stop.trigger();
    tracing::info!("Synchronising sensor threads");
    let report = group.join(config.join_timeout);
    tracing::info!(
        "{} sensor threads stopped, {} still running",
        report.stopped.len(),
        report.lingering.len()
    );

    session_result(result, &report)
}

/// A session that ended because a sensor failed is an error even though the
/// display loop itself returned cleanly.
fn session_result(display: Result<()>, report: &JoinReport) -> Result<()> {
    display?;
    if let Some((name, error)) = report.failures.first() {
        anyhow::bail!("Sensor {} failed: {}", name, error);
    }
    Ok(())
}

use crate::live::stop::StopSignal;
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::time::Duration;

/// A single value produced by a sensor
#[derive(Debug)]
pub enum Reading {
    Count(u64),
    Frame(Mat),
}

/// Timer-driven sensor that counts up once per `delay`.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    delay: Duration,
    counter: u64,
}

impl SimulatedSensor {
    pub fn new(delay: Duration) -> Self {
        Self { delay, counter: 0 }
    }

    pub fn produce(&mut self, stop: &StopSignal) -> Option<u64> {
        if !stop.sleep(self.delay) {
            return None;
        }
        self.counter += 1;
        Some(self.counter)
    }
}

/// Source of camera frames. `Ok(None)` is a failed read the caller may retry.
pub trait CaptureDevice: Send {
    fn read(&mut self) -> Result<Option<Mat>>;
}

/// Capture device backed by `opencv::videoio::VideoCapture`.
pub struct OpencvCamera {
    capture: VideoCapture,
}

impl OpencvCamera {
    pub fn open(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut capture = open_capture(index)?;

        capture.set(CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(CAP_PROP_FRAME_HEIGHT, height as f64)?;
        tracing::info!(
            "Camera {} opened, requested {}x{}, got {}x{}",
            index,
            width,
            height,
            capture.get(CAP_PROP_FRAME_WIDTH)?,
            capture.get(CAP_PROP_FRAME_HEIGHT)?
        );

        Ok(Self { capture })
    }
}

/// Opens the platform's preferred backend first, then whatever OpenCV picks.
fn open_capture(index: i32) -> Result<VideoCapture> {
    #[cfg(target_os = "macos")]
    {
        if let Ok(capture) = VideoCapture::new(index, opencv::videoio::CAP_AVFOUNDATION) {
            if capture.is_opened().unwrap_or(false) {
                return Ok(capture);
            }
        }
    }

    let capture = VideoCapture::new(index, CAP_ANY)
        .with_context(|| format!("Camera {} not found", index))?;
    if !capture.is_opened()? {
        return Err(anyhow!("Camera {} not found", index));
    }
    Ok(capture)
}

impl CaptureDevice for OpencvCamera {
    fn read(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for OpencvCamera {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release camera: {}", e);
        }
    }
}

/// Camera sensor. Tolerates one failed read; a second consecutive one means
/// the device is gone.
pub struct CameraSensor {
    device: Box<dyn CaptureDevice>,
    consecutive_failures: u32,
}

impl CameraSensor {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            consecutive_failures: 0,
        }
    }

    pub fn produce(&mut self) -> Result<Option<Mat>> {
        let cause = match self.device.read() {
            Ok(Some(frame)) => {
                self.consecutive_failures = 0;
                return Ok(Some(frame));
            }
            Ok(None) => "empty frame".to_string(),
            Err(e) => format!("{:#}", e),
        };

        self.consecutive_failures += 1;
        if self.consecutive_failures > 1 {
            tracing::error!("Camera disconnected or failed: {}", cause);
            return Err(anyhow!("Camera disconnected: {}", cause));
        }
        tracing::warn!("Failed to read frame from camera: {}", cause);
        Ok(None)
    }
}

/// Every kind of sensor the display loop can poll.
pub enum Sensor {
    Simulated(SimulatedSensor),
    Camera(CameraSensor),
}

impl Sensor {
    /// Blocks until the sensor has a value, the stop signal fires, or the
    /// sensor fails. `Ok(None)` means "nothing this time".
    pub fn produce(&mut self, stop: &StopSignal) -> Result<Option<Reading>> {
        match self {
            Sensor::Simulated(sensor) => Ok(sensor.produce(stop).map(Reading::Count)),
            Sensor::Camera(sensor) => Ok(sensor.produce()?.map(Reading::Frame)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Replays a fixed sequence of reads, then keeps failing.
    pub(crate) struct ScriptedCamera {
        pub reads: VecDeque<bool>,
    }

    impl CaptureDevice for ScriptedCamera {
        fn read(&mut self) -> Result<Option<Mat>> {
            match self.reads.pop_front() {
                Some(true) => Ok(Some(Mat::default())),
                _ => Ok(None),
            }
        }
    }

    /// Every read returns a backend error.
    struct BrokenCamera;

    impl CaptureDevice for BrokenCamera {
        fn read(&mut self) -> Result<Option<Mat>> {
            Err(anyhow!("device busy"))
        }
    }

    fn camera(reads: &[bool]) -> CameraSensor {
        CameraSensor::new(Box::new(ScriptedCamera {
            reads: reads.iter().copied().collect(),
        }))
    }

    #[test]
    fn test_simulated_sensor_counts_up() {
        let stop = StopSignal::new();
        let mut sensor = Sensor::Simulated(SimulatedSensor::new(Duration::from_millis(1)));

        let values: Vec<u64> = (0..3)
            .map(|_| match sensor.produce(&stop).unwrap() {
                Some(Reading::Count(v)) => v,
                other => panic!("unexpected reading {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_simulated_sensor_wakes_on_stop() {
        let stop = StopSignal::new();
        stop.trigger();
        let mut sensor = SimulatedSensor::new(Duration::from_secs(10));

        let start = Instant::now();
        assert_eq!(sensor.produce(&stop), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_camera_tolerates_single_failure() {
        let mut sensor = camera(&[true, false, true, false, true]);
        assert!(sensor.produce().unwrap().is_some());
        assert!(sensor.produce().unwrap().is_none());
        assert!(sensor.produce().unwrap().is_some());
        assert!(sensor.produce().unwrap().is_none());
        assert!(sensor.produce().unwrap().is_some());
    }

    #[test]
    fn test_camera_fails_after_two_consecutive_misses() {
        let mut sensor = camera(&[true, false, false]);
        assert!(sensor.produce().unwrap().is_some());
        assert!(sensor.produce().unwrap().is_none());
        assert!(sensor.produce().is_err());
    }

    #[test]
    fn test_camera_read_error_is_kept_as_cause() {
        let mut sensor = CameraSensor::new(Box::new(BrokenCamera));
        assert!(sensor.produce().unwrap().is_none());
        let err = sensor.produce().unwrap_err();
        assert!(err.to_string().contains("device busy"));
    }
}

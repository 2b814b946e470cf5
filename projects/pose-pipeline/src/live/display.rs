use crate::live::sensor::Reading;
use crate::live::slot::LatestSlot;
use crate::live::stop::StopSignal;
use anyhow::Result;
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{put_text, FONT_HERSHEY_SIMPLEX, LINE_8};
use opencv::{highgui, prelude::*};

const WINDOW_NAME: &str = "Sensor Display";
const ESC_KEY: i32 = 27;

/// A named sensor slot polled by the render loop
pub struct SensorFeed {
    pub name: String,
    pub slot: LatestSlot<Reading>,
}

/// Latest value from every feed, refreshed once per display tick.
pub struct Dashboard {
    counters: Vec<(String, u64)>,
    last_frame: Option<Mat>,
}

impl Dashboard {
    /// `counter_names` fixes the order of values in the overlay.
    pub fn new<S: AsRef<str>>(counter_names: &[S]) -> Self {
        Self {
            counters: counter_names
                .iter()
                .map(|n| (n.as_ref().to_string(), 0))
                .collect(),
            last_frame: None,
        }
    }

    /// Drains each feed without blocking. Feeds with nothing new keep their
    /// previous value.
    pub fn poll(&mut self, feeds: &[SensorFeed]) {
        for feed in feeds {
            match feed.slot.take() {
                Some(Reading::Count(value)) => self.set_counter(&feed.name, value),
                Some(Reading::Frame(frame)) => self.last_frame = Some(frame),
                None => {}
            }
        }
    }

    pub fn set_counter(&mut self, name: &str, value: u64) {
        if let Some(entry) = self.counters.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        }
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn overlay_text(&self) -> String {
        self.counters
            .iter()
            .map(|(name, value)| format!("{}: {}", name.to_uppercase(), value))
            .collect::<Vec<_>>()
            .join("  ")
    }

    pub fn has_frame(&self) -> bool {
        self.last_frame.is_some()
    }

    /// Copy of the last camera frame with the counters drawn along the bottom.
    pub fn compose(&self) -> Result<Option<Mat>> {
        let Some(frame) = &self.last_frame else {
            return Ok(None);
        };

        let mut img = frame.try_clone()?;
        let origin = Point::new(50, img.rows() - 20);
        put_text(
            &mut img,
            &self.overlay_text(),
            origin,
            FONT_HERSHEY_SIMPLEX,
            0.7,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            LINE_8,
            false,
        )?;
        Ok(Some(img))
    }
}

/// Milliseconds to wait per shown frame at `freq` Hz
pub fn frame_interval_ms(freq: u32) -> i32 {
    (1000 / freq.max(1)).max(1) as i32
}

pub fn is_quit_key(key: i32) -> bool {
    key == 'q' as i32 || key == ESC_KEY
}

/// The highgui window; destroyed on drop.
pub struct DisplayWindow {
    interval_ms: i32,
}

impl DisplayWindow {
    pub fn open(freq: u32) -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_NORMAL)?;
        Ok(Self {
            interval_ms: frame_interval_ms(freq),
        })
    }

    /// Shows `img` and waits one display interval. Returns the pressed key or -1.
    pub fn show(&self, img: &Mat) -> Result<i32> {
        highgui::imshow(WINDOW_NAME, img)?;
        Ok(highgui::wait_key(self.interval_ms)?)
    }

    /// Keeps the UI responsive while no frame is available yet.
    pub fn idle(&self) -> Result<i32> {
        Ok(highgui::wait_key(1)?)
    }
}

impl Drop for DisplayWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(WINDOW_NAME) {
            tracing::warn!("Failed to destroy window: {}", e);
        }
    }
}

/// Render loop: polls every feed once per tick and never waits on a single
/// sensor. Returns when the stop signal fires or a quit key is pressed.
pub fn run_display(
    window: &DisplayWindow,
    dashboard: &mut Dashboard,
    feeds: &[SensorFeed],
    stop: &StopSignal,
) -> Result<()> {
    while !stop.is_triggered() {
        dashboard.poll(feeds);

        let key = match dashboard.compose()? {
            Some(img) => window.show(&img)?,
            None => window.idle()?,
        };

        if is_quit_key(key & 0xFF) {
            tracing::info!("Quit key pressed, shutting down");
            stop.trigger();
            break;
        }
    }
    Ok(())
}

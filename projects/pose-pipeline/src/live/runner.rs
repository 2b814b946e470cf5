// Sensor threads: each sensor polls continuously into its own LatestSlot

use crate::live::sensor::{Reading, Sensor};
use crate::live::slot::LatestSlot;
use crate::live::stop::StopSignal;
use anyhow::Result;
use crossbeam::channel::{self, Receiver, Sender};
use std::collections::HashSet;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sensor thread body. Publishes every reading until the stop signal fires.
/// A sensor error stops the whole session and is returned.
pub fn sensor_worker(
    name: &str,
    mut sensor: Sensor,
    slot: LatestSlot<Reading>,
    stop: StopSignal,
) -> Result<()> {
    while !stop.is_triggered() {
        match sensor.produce(&stop) {
            Ok(Some(reading)) => {
                slot.publish(reading);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(sensor = name, "Sensor error: {:#}", e);
                stop.trigger();
                return Err(e);
            }
        }
    }
    tracing::debug!(sensor = name, "Sensor thread exiting");
    Ok(())
}

/// Running sensor threads plus the channel they report their exit on.
pub struct SensorGroup {
    handles: Vec<(String, JoinHandle<()>)>,
    exited_tx: Sender<(String, Option<String>)>,
    exited_rx: Receiver<(String, Option<String>)>,
}

/// Which threads stopped within the join timeout
#[derive(Debug, Default)]
pub struct JoinReport {
    pub stopped: Vec<String>,
    pub lingering: Vec<String>,
    /// Sensors that exited on an error, with the error
    pub failures: Vec<(String, String)>,
}

impl Default for SensorGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorGroup {
    pub fn new() -> Self {
        let (exited_tx, exited_rx) = channel::unbounded();
        Self {
            handles: Vec::new(),
            exited_tx,
            exited_rx,
        }
    }

    /// Starts `sensor` on its own thread and returns the slot it publishes to.
    pub fn spawn(&mut self, name: &str, sensor: Sensor, stop: &StopSignal) -> LatestSlot<Reading> {
        let slot = LatestSlot::new();
        let thread_slot = slot.clone();
        let thread_stop = stop.clone();
        let exited_tx = self.exited_tx.clone();
        let thread_name = name.to_string();

        let handle = thread::spawn(move || {
            tracing::info!(sensor = thread_name.as_str(), "Spawning sensor thread");
            let failure = sensor_worker(&thread_name, sensor, thread_slot, thread_stop)
                .err()
                .map(|e| format!("{:#}", e));
            let _ = exited_tx.send((thread_name, failure));
        });

        self.handles.push((name.to_string(), handle));
        slot
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits up to `timeout` for every sensor thread to exit.
    ///
    /// Threads still running at the deadline are detached and reported.
    pub fn join(self, timeout: Duration) -> JoinReport {
        let deadline = Instant::now() + timeout;
        let mut exited = HashSet::new();
        let mut report = JoinReport::default();
        while exited.len() < self.handles.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exited_rx.recv_timeout(remaining) {
                Ok((name, failure)) => {
                    if let Some(error) = failure {
                        report.failures.push((name.clone(), error));
                    }
                    exited.insert(name);
                }
                Err(_) => break,
            }
        }

        for (name, handle) in self.handles {
            if exited.contains(&name) || handle.is_finished() {
                if handle.join().is_err() {
                    tracing::error!(sensor = name.as_str(), "Sensor thread panicked");
                }
                report.stopped.push(name);
            } else {
                tracing::warn!(
                    sensor = name.as_str(),
                    "Sensor thread did not stop within {:?}",
                    timeout
                );
                report.lingering.push(name);
            }
        }
        report
    }
}

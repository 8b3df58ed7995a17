//! One-shot measurement of how far the marker model hangs below its origin.
//!
//! The measurement is started once per process. Until it settles every
//! consumer reads the configured default; a failed measurement is never
//! retried.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{info, warn};

use crate::model::{DisplayOrientation, ModelLoader};

/// Calibration state shared by every tracked marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FootOffset {
    Pending,
    Resolved(f64),
    Failed,
}

impl FootOffset {
    pub fn value(&self) -> Option<f64> {
        match self {
            FootOffset::Resolved(value) => Some(*value),
            FootOffset::Pending | FootOffset::Failed => None,
        }
    }
}

type Measurement = Result<f64, String>;

pub struct FootOffsetCalibrator {
    state: FootOffset,
    default_m: f64,
    source: String,
    orientation: DisplayOrientation,
    in_flight: Option<Receiver<Measurement>>,
}

impl FootOffsetCalibrator {
    pub fn new(source: impl Into<String>, orientation: DisplayOrientation, default_m: f64) -> Self {
        Self {
            state: FootOffset::Pending,
            default_m,
            source: source.into(),
            orientation,
            in_flight: None,
        }
    }

    pub fn state(&self) -> FootOffset {
        self.state
    }

    /// The measured offset, `None` while pending or after a failure.
    pub fn value(&self) -> Option<f64> {
        self.state.value()
    }

    pub fn current_value_or_default(&self) -> f64 {
        self.value().unwrap_or(self.default_m)
    }

    pub fn set_default(&mut self, default_m: f64) {
        self.default_m = default_m;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether this calibrator measures `source` under `orientation`.
    pub fn measures(&self, source: &str, orientation: &DisplayOrientation) -> bool {
        self.source == source && self.orientation == *orientation
    }

    /// Point a calibration that has not started yet at another model or
    /// rotation. Returns `false` once a measurement is running or settled.
    pub fn retarget(&mut self, source: impl Into<String>, orientation: DisplayOrientation) -> bool {
        if self.state != FootOffset::Pending || self.in_flight.is_some() {
            return false;
        }
        self.source = source.into();
        self.orientation = orientation;
        true
    }

    /// Measure on the calling thread. Idempotent: a settled calibration
    /// returns immediately and an in-flight one is waited for.
    pub fn ensure_foot_offset_with(&mut self, loader: &dyn ModelLoader) -> f64 {
        if self.state == FootOffset::Pending {
            let measurement = match self.in_flight.take() {
                Some(receiver) => receiver
                    .recv()
                    .unwrap_or_else(|_| Err("calibration worker exited without a result".into())),
                None => measure(loader, &self.source, &self.orientation),
            };
            self.settle(measurement);
        }
        self.current_value_or_default()
    }

    /// Start the measurement on a worker thread. Returns `false` when a
    /// measurement is already running or has settled.
    pub fn spawn(&mut self, loader: Arc<dyn ModelLoader>) -> bool {
        if self.state != FootOffset::Pending || self.in_flight.is_some() {
            return false;
        }

        let (sender, receiver) = bounded::<Measurement>(1);
        let source = self.source.clone();
        let orientation = self.orientation;
        let spawned = thread::Builder::new()
            .name("foot-offset-calibration".into())
            .spawn(move || {
                let _ = sender.send(measure(loader.as_ref(), &source, &orientation));
            });

        match spawned {
            Ok(_) => {
                self.in_flight = Some(receiver);
                true
            }
            Err(err) => {
                self.settle(Err(format!("failed to start calibration worker: {err}")));
                false
            }
        }
    }

    /// Collect a finished background measurement. Returns the new state on
    /// the single call where calibration settles.
    pub fn poll(&mut self) -> Option<FootOffset> {
        let receiver = self.in_flight.as_ref()?;
        let measurement = match receiver.try_recv() {
            Ok(measurement) => measurement,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err("calibration worker exited without a result".into())
            }
        };
        self.in_flight = None;
        Some(self.settle(measurement))
    }

    fn settle(&mut self, measurement: Measurement) -> FootOffset {
        if self.state != FootOffset::Pending {
            return self.state;
        }
        self.state = match measurement {
            Ok(offset) => {
                info!(
                    target: "terrain_markers::foot_offset",
                    source = %self.source,
                    offset_m = offset,
                    "foot_offset.resolved"
                );
                FootOffset::Resolved(offset)
            }
            Err(error) => {
                warn!(
                    target: "terrain_markers::foot_offset",
                    source = %self.source,
                    %error,
                    default_m = self.default_m,
                    "foot_offset.failed -- keeping default for this process"
                );
                FootOffset::Failed
            }
        };
        self.state
    }
}

fn measure(loader: &dyn ModelLoader, source: &str, orientation: &DisplayOrientation) -> Measurement {
    loader
        .load(source)
        .and_then(|geometry| geometry.foot_offset(orientation))
        .map_err(|err| err.to_string())
}

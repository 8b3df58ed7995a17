use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

/// One marker as handed to the render surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSnapshot {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub z: f64,
    pub bearing: f64,
    pub color: String,
    /// `[pitch, yaw, roll]` in degrees.
    pub orientation: [f64; 3],
}

/// Full layer state pushed to the surface in one go.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotFrame {
    pub sequence: u64,
    pub scale: f64,
    pub markers: Vec<MarkerSnapshot>,
}

/// Whatever draws the markers: a map layer, a network client, a test double.
pub trait RenderSurface: Send + Sync {
    fn push_snapshot(&mut self, frame: &SnapshotFrame);

    fn set_visible(&mut self, visible: bool);
}

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<SnapshotFrame>,
    visible: Option<bool>,
}

/// Surface that keeps every pushed frame. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_count(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<SnapshotFrame> {
        self.lock().frames.last().cloned()
    }

    pub fn frames(&self) -> Vec<SnapshotFrame> {
        self.lock().frames.clone()
    }

    /// Last visibility requested, `None` if never set.
    pub fn visible(&self) -> Option<bool> {
        self.lock().visible
    }
}

impl RenderSurface for RecordingSurface {
    fn push_snapshot(&mut self, frame: &SnapshotFrame) {
        self.lock().frames.push(frame.clone());
    }

    fn set_visible(&mut self, visible: bool) {
        self.lock().visible = Some(visible);
    }
}

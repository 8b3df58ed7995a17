use std::collections::HashMap;
use std::slice;

use crate::geo::planar_distance_m;
use crate::model::DisplayOrientation;
use crate::render::MarkerSnapshot;
use crate::stabilizer::VerticalState;

/// Position report for one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub bearing: Option<f64>,
    pub color: Option<String>,
}

impl PositionUpdate {
    pub fn new(id: impl Into<String>, lng: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            lng,
            lat,
            bearing: None,
            color: None,
        }
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedMarker {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub bearing: f64,
    pub color: String,
    pub vertical: VerticalState,
}

/// How an upsert affected an existing marker's smoothing state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    Created,
    /// Moved far enough to be shown at the new height immediately.
    Relocated { moved_m: f64 },
    /// Small move; smoothing state carried over.
    Refined { moved_m: f64 },
    /// Non-finite coordinates or bearing; nothing was stored.
    Rejected,
}

/// Tracked markers in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    markers: Vec<TrackedMarker>,
    index: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedMarker> {
        self.index.get(id).map(|&slot| &self.markers[slot])
    }

    pub fn iter(&self) -> slice::Iter<'_, TrackedMarker> {
        self.markers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> slice::IterMut<'_, TrackedMarker> {
        self.markers.iter_mut()
    }

    /// Insert or move a marker whose ideal height at the new position is
    /// `target_z`.
    pub fn upsert(
        &mut self,
        update: PositionUpdate,
        target_z: f64,
        unlock_move_m: f64,
        default_color: &str,
    ) -> UpsertOutcome {
        let PositionUpdate {
            id,
            lng,
            lat,
            bearing,
            color,
        } = update;
        if !lng.is_finite() || !lat.is_finite() || bearing.is_some_and(|b| !b.is_finite()) {
            return UpsertOutcome::Rejected;
        }

        let Some(&slot) = self.index.get(&id) else {
            self.index.insert(id.clone(), self.markers.len());
            self.markers.push(TrackedMarker {
                id,
                lng,
                lat,
                bearing: bearing.unwrap_or(0.0),
                color: color.unwrap_or_else(|| default_color.to_string()),
                vertical: VerticalState::placed_at(target_z),
            });
            return UpsertOutcome::Created;
        };

        let marker = &mut self.markers[slot];
        let moved_m = planar_distance_m((marker.lng, marker.lat), (lng, lat));
        let outcome = if moved_m > unlock_move_m {
            marker.vertical = VerticalState::placed_at(target_z);
            UpsertOutcome::Relocated { moved_m }
        } else {
            marker.vertical.raw_target_z = target_z;
            UpsertOutcome::Refined { moved_m }
        };

        marker.lng = lng;
        marker.lat = lat;
        if let Some(bearing) = bearing {
            marker.bearing = bearing;
        }
        if let Some(color) = color {
            marker.color = color;
        }
        outcome
    }

    /// Update only the heading of a known marker. Non-finite headings are
    /// ignored.
    pub fn set_bearing(&mut self, id: &str, bearing_deg: f64) -> bool {
        if !bearing_deg.is_finite() {
            return false;
        }
        match self.index.get(id) {
            Some(&slot) => {
                self.markers[slot].bearing = bearing_deg;
                true
            }
            None => false,
        }
    }

    /// Lazy view of every marker as the render surface sees it. Each call
    /// starts a fresh pass.
    pub fn snapshot(&self, view: SnapshotView) -> SnapshotIter<'_> {
        SnapshotIter {
            markers: self.markers.iter(),
            view,
        }
    }
}

/// Display settings applied while building snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotView {
    pub orientation: DisplayOrientation,
    pub apply_bearing: bool,
}

pub struct SnapshotIter<'a> {
    markers: slice::Iter<'a, TrackedMarker>,
    view: SnapshotView,
}

impl<'a> SnapshotIter<'a> {
    fn project(&self, marker: &TrackedMarker) -> MarkerSnapshot {
        let heading = if self.view.apply_bearing {
            marker.bearing
        } else {
            0.0
        };
        MarkerSnapshot {
            id: marker.id.clone(),
            lng: marker.lng,
            lat: marker.lat,
            z: marker.vertical.displayed_z,
            bearing: marker.bearing,
            color: marker.color.clone(),
            orientation: self.view.orientation.with_heading(heading),
        }
    }
}

impl<'a> Iterator for SnapshotIter<'a> {
    type Item = MarkerSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let marker = self.markers.next()?;
        Some(self.project(marker))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.markers.size_hint()
    }
}

impl<'a> ExactSizeIterator for SnapshotIter<'a> {}

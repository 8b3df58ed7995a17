use bevy::prelude::*;

use crate::foot_offset::FootOffset;
use crate::layer::MarkerLayer;

#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct PlacementMetrics {
    pub frame: u64,
    pub markers: usize,
    pub locked_markers: usize,
    pub refreshes: u64,
    pub pushes: u64,
    pub fallback_samples: usize,
    pub foot_offset_m: Option<f64>,
    pub calibration_failed: bool,
}

pub fn collect_metrics(layer: Res<MarkerLayer>, mut metrics: ResMut<PlacementMetrics>) {
    let stats = layer.stats();
    metrics.frame += 1;
    metrics.markers = layer.len();
    metrics.locked_markers = layer
        .registry()
        .iter()
        .filter(|marker| marker.vertical.is_locked())
        .count();
    metrics.refreshes = stats.refreshes;
    metrics.pushes = stats.pushes;
    metrics.fallback_samples = stats.last_summary.fallback_samples;
    metrics.foot_offset_m = layer.foot_offset();
    metrics.calibration_failed = layer.foot_offset_state() == FootOffset::Failed;
}

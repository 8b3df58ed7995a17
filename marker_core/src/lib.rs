//! Terrain-aware vertical placement for 3D map markers.
//!
//! Markers report horizontal positions; the crate works out how high above
//! the terrain each model has to sit so it neither clips into the ground nor
//! jitters as terrain tiles stream in, and pushes full snapshots to a render
//! surface. [`MarkerLayer`] is the entry point; [`build_headless_app`] wires
//! it into a Bevy app driven by [`Time`](bevy::time::Time).

pub mod config;
pub mod config_watch;
mod elevation;
pub mod foot_offset;
pub mod geo;
mod layer;
pub mod metrics;
pub mod model;
pub mod network;
mod registry;
pub mod render;
mod scheduler;
mod stabilizer;
mod systems;
mod target_z;
pub mod terrain;

use bevy::prelude::*;

pub use config::{
    load_placement_config_from_env, GroundConfig, LiftConfig, ModelConfig, PlacementConfig,
    PlacementConfigError, PlacementPreset, ScheduleConfig, SmoothingConfig,
};
pub use config_watch::{ConfigWatchError, ConfigWatcher};
pub use elevation::ElevationSampler;
pub use foot_offset::{FootOffset, FootOffsetCalibrator};
pub use layer::{LayerStats, MarkerLayer};
pub use metrics::PlacementMetrics;
pub use model::{DisplayOrientation, GltfModelLoader, ModelGeometry, ModelLoadError, ModelLoader};
pub use registry::{
    EntityRegistry, PositionUpdate, SnapshotIter, SnapshotView, TrackedMarker, UpsertOutcome,
};
pub use render::{MarkerSnapshot, RecordingSurface, RenderSurface, SnapshotFrame};
pub use scheduler::{RefreshScheduler, RefreshTrigger, SurfaceEvent};
pub use stabilizer::{
    PlacementPhase, RefreshOutcome, RefreshSummary, StabilizationEngine, VerticalState,
};
pub use target_z::{TargetZ, TargetZResolver};
pub use terrain::{
    ElevationQuery, GeoBounds, GridTerrain, NoisyTerrain, Relief, TerrainError, TerrainProvider,
};

/// Construct a Bevy [`App`] that drives `layer` once per update.
///
/// Surface lifecycle notifications are sent as [`SurfaceEvent`]s; config
/// reloads are picked up when a [`ConfigWatcher`] resource is present.
pub fn build_headless_app(layer: MarkerLayer) -> App {
    let mut app = App::new();

    app.insert_resource(layer)
        .insert_resource(PlacementMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_event::<SurfaceEvent>()
        .add_systems(
            Update,
            (
                systems::apply_config_reloads,
                systems::forward_surface_events,
                systems::drive_marker_layer,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Run one frame of the marker pipeline.
///
/// Each call processes the chained systems configured in
/// [`build_headless_app`] (config reload → surface events → scheduled
/// refresh → metrics).
pub fn run_frame(app: &mut App) {
    app.update();
}

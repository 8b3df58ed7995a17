//! The marker layer: everything a host needs to keep terrain-hugging 3D
//! markers on a map.
//!
//! A [`MarkerLayer`] owns the registry, the smoothing state and the one-shot
//! foot-offset calibration. Hosts feed it positions and surface events and
//! call [`MarkerLayer::tick`] once per frame; the layer decides when to
//! recompute heights and pushes full snapshots to the attached
//! [`RenderSurface`].

use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::Resource;
use tracing::{debug, info, trace, warn};

use crate::config::PlacementConfig;
use crate::foot_offset::{FootOffset, FootOffsetCalibrator};
use crate::model::ModelLoader;
use crate::registry::{EntityRegistry, PositionUpdate, SnapshotView, TrackedMarker, UpsertOutcome};
use crate::render::{MarkerSnapshot, RenderSurface, SnapshotFrame};
use crate::scheduler::{RefreshScheduler, RefreshTrigger, SurfaceEvent};
use crate::stabilizer::{RefreshSummary, StabilizationEngine};
use crate::target_z::{TargetZ, TargetZResolver};
use crate::terrain::TerrainProvider;

/// Running totals kept by the layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub refreshes: u64,
    pub pushes: u64,
    pub last_trigger: RefreshTrigger,
    pub last_summary: RefreshSummary,
}

#[derive(Resource)]
pub struct MarkerLayer {
    config: PlacementConfig,
    terrain: Box<dyn TerrainProvider>,
    calibrator: FootOffsetCalibrator,
    registry: EntityRegistry,
    scheduler: RefreshScheduler,
    surface: Option<Box<dyn RenderSurface>>,
    visible: bool,
    attached_once: bool,
    sequence: u64,
    stats: LayerStats,
}

impl MarkerLayer {
    pub fn new(config: PlacementConfig, terrain: impl TerrainProvider + 'static) -> Self {
        let calibrator = FootOffsetCalibrator::new(
            config.model.source.clone(),
            config.model.orientation,
            config.model.default_foot_offset_m,
        );
        let scheduler = RefreshScheduler::new(&config.schedule);
        Self {
            config,
            terrain: Box::new(terrain),
            calibrator,
            registry: EntityRegistry::new(),
            scheduler,
            surface: None,
            visible: true,
            attached_once: false,
            sequence: 0,
            stats: LayerStats::default(),
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn stats(&self) -> LayerStats {
        self.stats
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn marker(&self, id: &str) -> Option<&TrackedMarker> {
        self.registry.get(id)
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn bootstrap_remaining(&self) -> u32 {
        self.scheduler.bootstrap_remaining()
    }

    /// Connect the layer to a render surface. The first attach starts the
    /// bootstrap burst and, when a loader is supplied, the background
    /// foot-offset measurement. Re-attaching only swaps the surface.
    pub fn attach(
        &mut self,
        surface: Box<dyn RenderSurface>,
        loader: Option<Arc<dyn ModelLoader>>,
        now: Duration,
    ) {
        let first_attach = !self.attached_once;
        self.attached_once = true;
        self.surface = Some(surface);

        if first_attach {
            self.scheduler.start_bootstrap(now);
            if let Some(loader) = loader {
                self.calibrator.spawn(loader);
            }
        }

        info!(
            target: "terrain_markers::layer",
            markers = self.registry.len(),
            first_attach,
            "layer.attached"
        );

        let visible = self.visible;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(visible);
        }
        self.push_snapshot();
    }

    /// Disconnect the surface. Markers keep their state.
    pub fn detach(&mut self) -> Option<Box<dyn RenderSurface>> {
        self.surface.take()
    }

    pub fn compute_target_z(&self, lng: f64, lat: f64) -> f64 {
        self.resolve_target(lng, lat).value
    }

    fn resolve_target(&self, lng: f64, lat: f64) -> TargetZ {
        TargetZResolver::new(
            &self.config,
            self.terrain.as_ref(),
            self.calibrator.current_value_or_default(),
        )
        .resolve(lng, lat)
    }

    /// Insert or move a marker and push the new state to the surface.
    pub fn upsert(&mut self, update: PositionUpdate) -> UpsertOutcome {
        if !update.lng.is_finite() || !update.lat.is_finite() {
            warn!(
                target: "terrain_markers::layer",
                id = %update.id,
                lng = update.lng,
                lat = update.lat,
                "marker.rejected -- non-finite position"
            );
            return UpsertOutcome::Rejected;
        }
        let target = self.resolve_target(update.lng, update.lat);
        let id = update.id.clone();
        let outcome = self.registry.upsert(
            update,
            target.value,
            self.config.smoothing.unlock_move_m,
            &self.config.model.default_color,
        );
        trace!(
            target: "terrain_markers::layer",
            %id,
            target_z = target.value,
            fallback = target.used_fallback(),
            ?outcome,
            "marker.upserted"
        );
        if outcome != UpsertOutcome::Rejected {
            self.push_snapshot();
        }
        outcome
    }

    /// Change a marker's heading. Unknown ids are ignored.
    pub fn set_bearing(&mut self, id: &str, bearing_deg: f64) -> bool {
        if !self.registry.set_bearing(id, bearing_deg) {
            return false;
        }
        self.push_snapshot();
        true
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(visible);
        }
    }

    /// Markers as the surface would draw them, in first-seen order.
    pub fn snapshot(&self) -> impl ExactSizeIterator<Item = MarkerSnapshot> + '_ {
        self.registry.snapshot(self.snapshot_view())
    }

    fn snapshot_view(&self) -> SnapshotView {
        SnapshotView {
            orientation: self.config.model.orientation,
            apply_bearing: self.config.model.apply_bearing,
        }
    }

    pub fn foot_offset(&self) -> Option<f64> {
        self.calibrator.value()
    }

    pub fn foot_offset_state(&self) -> FootOffset {
        self.calibrator.state()
    }

    /// Measure the foot offset on the calling thread, refreshing markers if
    /// this call is the one that resolves it.
    pub fn ensure_foot_offset_with(&mut self, loader: &dyn ModelLoader) -> f64 {
        let was_pending = self.calibrator.state() == FootOffset::Pending;
        let offset = self.calibrator.ensure_foot_offset_with(loader);
        if was_pending && self.calibrator.value().is_some() {
            self.refresh(RefreshTrigger::CALIBRATED);
        }
        offset
    }

    pub fn set_ground_clearance(&mut self, meters: f64) -> bool {
        self.config.ground.clearance_m = finite_or_zero(meters).max(0.0);
        self.tuned("ground.clearance_m", self.config.ground.clearance_m)
    }

    pub fn set_base_lift(&mut self, meters: f64) -> bool {
        self.config.lift.hard_lift_m = finite_or_zero(meters).max(0.0);
        self.tuned("lift.hard_lift_m", self.config.lift.hard_lift_m)
    }

    pub fn set_extra_lift(&mut self, meters: f64) -> bool {
        self.config.lift.extra_lift_m = finite_or_zero(meters);
        self.tuned("lift.extra_lift_m", self.config.lift.extra_lift_m)
    }

    /// Shift every marker by `delta_m` on top of the current extra lift.
    pub fn nudge(&mut self, delta_m: f64) -> bool {
        self.config.lift.extra_lift_m += finite_or_zero(delta_m);
        self.tuned("lift.extra_lift_m", self.config.lift.extra_lift_m)
    }

    pub fn force_refresh(&mut self) -> bool {
        self.refresh(RefreshTrigger::MANUAL)
    }

    fn tuned(&mut self, field: &'static str, value: f64) -> bool {
        info!(target: "terrain_markers::layer", field, value, "placement.tuned");
        self.refresh(RefreshTrigger::TUNING)
    }

    /// Swap in a new configuration. Smoothing state and calibration are
    /// kept. The model source and orientation can only change before
    /// calibration starts, since the foot offset must be measured under the
    /// rotation the surface renders with.
    pub fn apply_config(&mut self, mut config: PlacementConfig) -> bool {
        let model = &mut config.model;
        if !self.calibrator.measures(&model.source, &model.orientation)
            && !self.calibrator.retarget(model.source.clone(), model.orientation)
        {
            warn!(
                target: "terrain_markers::layer",
                source = %model.source,
                orientation = ?model.orientation,
                "placement_config.model_change_ignored -- calibration already started"
            );
            model.source = self.config.model.source.clone();
            model.orientation = self.config.model.orientation;
        }
        self.calibrator.set_default(config.model.default_foot_offset_m);
        self.scheduler.reconfigure(&config.schedule);
        self.config = config;
        self.refresh(RefreshTrigger::CONFIG_RELOAD)
    }

    /// Queue a debounced refresh for a surface lifecycle event.
    pub fn handle_surface_event(&mut self, event: SurfaceEvent, now: Duration) -> bool {
        let queued = self.scheduler.notify(event, now);
        trace!(target: "terrain_markers::layer", ?event, queued, "surface.event");
        queued
    }

    /// Per-frame driver: settles a finished calibration and runs whatever
    /// refresh is due. Returns whether any marker moved.
    pub fn tick(&mut self, now: Duration) -> bool {
        let mut due = RefreshTrigger::empty();
        if let Some(FootOffset::Resolved(_)) = self.calibrator.poll() {
            due |= RefreshTrigger::CALIBRATED;
        }
        if let Some(trigger) = self.scheduler.poll(now) {
            due |= trigger;
        }
        !due.is_empty() && self.refresh(due)
    }

    fn refresh(&mut self, trigger: RefreshTrigger) -> bool {
        let resolver = TargetZResolver::new(
            &self.config,
            self.terrain.as_ref(),
            self.calibrator.current_value_or_default(),
        );
        let summary = StabilizationEngine::new(&self.config.smoothing)
            .refresh_all(&mut self.registry, &resolver);

        self.stats.refreshes += 1;
        self.stats.last_trigger = trigger;
        self.stats.last_summary = summary;
        debug!(
            target: "terrain_markers::layer",
            ?trigger,
            examined = summary.examined,
            changed = summary.changed,
            locked = summary.locked,
            fallback_samples = summary.fallback_samples,
            "placement.refresh"
        );

        if summary.changed_any() {
            self.push_snapshot();
        }
        summary.changed_any()
    }

    fn push_snapshot(&mut self) {
        if self.surface.is_none() {
            return;
        }
        self.sequence += 1;
        let frame = SnapshotFrame {
            sequence: self.sequence,
            scale: self.config.model.scale,
            markers: self.snapshot().collect(),
        };
        if let Some(surface) = self.surface.as_mut() {
            surface.push_snapshot(&frame);
            self.stats.pushes += 1;
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::geo::meters_to_degrees;
    use crate::model::{DisplayOrientation, ModelGeometry, ModelLoadError};
    use crate::render::RecordingSurface;
    use crate::stabilizer::PlacementPhase;
    use crate::terrain::{ElevationQuery, TerrainError};

    #[derive(Clone, Default)]
    struct SettableGround(Arc<Mutex<f64>>);

    impl SettableGround {
        fn at(height: f64) -> Self {
            Self(Arc::new(Mutex::new(height)))
        }

        fn set(&self, height: f64) {
            *self.0.lock().unwrap() = height;
        }
    }

    impl TerrainProvider for SettableGround {
        fn query_elevation(&self, _: f64, _: f64, _: ElevationQuery) -> Result<f64, TerrainError> {
            Ok(*self.0.lock().unwrap())
        }
    }

    struct FixedLoader(f32);

    impl ModelLoader for FixedLoader {
        fn load(&self, _source: &str) -> Result<ModelGeometry, ModelLoadError> {
            Ok(ModelGeometry::new(vec![
                bevy::math::Vec3::new(0.0, -self.0, 0.0),
                bevy::math::Vec3::new(0.0, 1.0, 0.0),
            ]))
        }
    }

    fn probe_config() -> PlacementConfig {
        let mut config = PlacementConfig::default();
        config.model.orientation = crate::model::DisplayOrientation {
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
        };
        config
    }

    fn attached(ground: &SettableGround) -> (MarkerLayer, RecordingSurface) {
        let mut layer = MarkerLayer::new(probe_config(), ground.clone());
        let surface = RecordingSurface::new();
        layer.attach(Box::new(surface.clone()), None, Duration::ZERO);
        (layer, surface)
    }

    #[test]
    fn probe_scenario_places_then_smooths() {
        let ground = SettableGround::at(10.0);
        let (mut layer, _) = attached(&ground);
        layer.upsert(PositionUpdate::new("probe", 139.7, 35.6));
        let z = layer.marker("probe").unwrap().vertical.displayed_z;
        assert!((z - 52.1).abs() < 1e-9);

        ground.set(11.0);
        assert!(layer.force_refresh());
        let z = layer.marker("probe").unwrap().vertical.displayed_z;
        assert!((z - 52.65).abs() < 1e-9);
    }

    #[test]
    fn upsert_and_bearing_push_when_attached() {
        let ground = SettableGround::at(10.0);
        let (mut layer, surface) = attached(&ground);
        assert_eq!(surface.push_count(), 1);
        assert_eq!(surface.visible(), Some(true));

        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        assert_eq!(surface.push_count(), 2);
        assert!(layer.set_bearing("bus-1", 45.0));
        assert_eq!(surface.push_count(), 3);
        assert!(!layer.set_bearing("ghost", 45.0));
        assert_eq!(surface.push_count(), 3);

        let sequences: Vec<u64> = surface.frames().iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, [1, 2, 3]);
        let frame = surface.last_frame().unwrap();
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.markers[0].bearing, 45.0);
    }

    #[test]
    fn detached_layer_tracks_without_pushing() {
        let mut layer = MarkerLayer::new(probe_config(), SettableGround::at(10.0));
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.stats().pushes, 0);
        layer.set_visible(false);
        assert!(!layer.is_visible());

        let surface = RecordingSurface::new();
        layer.attach(Box::new(surface.clone()), None, Duration::ZERO);
        assert_eq!(surface.visible(), Some(false));
        assert_eq!(surface.last_frame().unwrap().markers.len(), 1);
    }

    #[test]
    fn converged_layer_does_not_push() {
        let ground = SettableGround::at(10.0);
        let (mut layer, surface) = attached(&ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        for _ in 0..6 {
            assert!(!layer.force_refresh());
        }
        assert!(layer.marker("bus-1").unwrap().vertical.is_locked());

        let pushes = surface.push_count();
        ground.set(10.5);
        assert!(!layer.force_refresh());
        assert_eq!(surface.push_count(), pushes);
        assert_eq!(layer.stats().last_summary.locked, 1);
    }

    #[test]
    fn tuning_refreshes_immediately() {
        let ground = SettableGround::at(10.0);
        let (mut layer, surface) = attached(&ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        let before = layer.marker("bus-1").unwrap().vertical.displayed_z;

        assert!(layer.nudge(2.0));
        let after = layer.marker("bus-1").unwrap().vertical.displayed_z;
        assert!((after - (before + 0.55 * 2.0)).abs() < 1e-9);
        assert_eq!(layer.stats().last_trigger, RefreshTrigger::TUNING);
        assert_eq!(surface.push_count(), 3);
    }

    #[test]
    fn tuning_inputs_are_sanitised() {
        let mut layer = MarkerLayer::new(probe_config(), SettableGround::at(0.0));
        layer.set_ground_clearance(-3.0);
        assert_eq!(layer.config().ground.clearance_m, 0.0);
        layer.set_base_lift(f64::NAN);
        assert_eq!(layer.config().lift.hard_lift_m, 0.0);
        layer.set_extra_lift(-1.5);
        assert_eq!(layer.config().lift.extra_lift_m, -1.5);
        layer.nudge(f64::INFINITY);
        assert_eq!(layer.config().lift.extra_lift_m, -1.5);
        layer.nudge(0.5);
        assert_eq!(layer.config().lift.extra_lift_m, -1.0);
    }

    #[test]
    fn relocation_bypasses_smoothing() {
        let ground = SettableGround::at(10.0);
        let (mut layer, _) = attached(&ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        ground.set(30.0);

        let (d_lng, _) = meters_to_degrees(35.6, 20.0, 0.0);
        let outcome = layer.upsert(PositionUpdate::new("bus-1", 139.7 + d_lng, 35.6));
        assert!(matches!(outcome, UpsertOutcome::Relocated { .. }));
        let vertical = layer.marker("bus-1").unwrap().vertical;
        assert!((vertical.displayed_z - 72.1).abs() < 1e-9);
        assert_eq!(vertical.phase, PlacementPhase::Tracking);
    }

    #[test]
    fn calibration_swaps_default_for_measured_offset() {
        let ground = SettableGround::at(10.0);
        let mut layer = MarkerLayer::new(probe_config(), ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        assert_eq!(layer.foot_offset(), None);
        assert!((layer.compute_target_z(139.7, 35.6) - 52.1).abs() < 1e-9);

        assert_eq!(layer.ensure_foot_offset_with(&FixedLoader(3.0)), 3.0);
        assert_eq!(layer.foot_offset(), Some(3.0));
        assert!((layer.compute_target_z(139.7, 35.6) - 53.4).abs() < 1e-9);
        assert_eq!(layer.stats().last_trigger, RefreshTrigger::CALIBRATED);
    }

    #[test]
    fn background_calibration_refreshes_once_on_tick() {
        let ground = SettableGround::at(10.0);
        let mut layer = MarkerLayer::new(probe_config(), ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        let surface = RecordingSurface::new();
        layer.attach(
            Box::new(surface.clone()),
            Some(Arc::new(FixedLoader(3.0))),
            Duration::ZERO,
        );

        let mut refreshed = false;
        for _ in 0..2_500 {
            refreshed |= layer.tick(Duration::from_millis(1));
            if layer.foot_offset().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(layer.foot_offset(), Some(3.0));
        assert!(refreshed);
        assert_eq!(layer.stats().last_trigger, RefreshTrigger::CALIBRATED);
    }

    #[test]
    fn surface_events_refresh_after_debounce() {
        let ground = SettableGround::at(10.0);
        let (mut layer, _) = attached(&ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        ground.set(12.0);

        assert!(layer.handle_surface_event(SurfaceEvent::MoveEnd, Duration::from_millis(100)));
        assert!(!layer.tick(Duration::from_millis(150)));
        assert!(layer.tick(Duration::from_millis(220)));
        assert_eq!(layer.stats().last_trigger, RefreshTrigger::MOVE_END);
    }

    #[test]
    fn bootstrap_runs_after_first_attach() {
        let ground = SettableGround::at(10.0);
        let (mut layer, _) = attached(&ground);
        assert_eq!(layer.bootstrap_remaining(), 10);
        for step in 1..=10u64 {
            layer.tick(Duration::from_millis(step * 500));
        }
        assert_eq!(layer.bootstrap_remaining(), 0);
        assert_eq!(layer.stats().refreshes, 10);

        layer.detach();
        layer.attach(Box::new(RecordingSurface::new()), None, Duration::from_secs(10));
        assert_eq!(layer.bootstrap_remaining(), 0);
    }

    /// A 4 m by 2 m slab lying in the XY plane.
    struct SlabLoader;

    impl ModelLoader for SlabLoader {
        fn load(&self, _source: &str) -> Result<ModelGeometry, ModelLoadError> {
            Ok(ModelGeometry::new(vec![
                bevy::math::Vec3::new(-2.0, -1.0, 0.0),
                bevy::math::Vec3::new(2.0, 1.0, 0.0),
            ]))
        }
    }

    #[test]
    fn reload_retargets_calibration_that_has_not_started() {
        let mut layer = MarkerLayer::new(PlacementConfig::default(), SettableGround::at(10.0));
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));

        layer.apply_config(probe_config());
        assert_eq!(layer.stats().refreshes, 1);
        assert_eq!(layer.stats().last_trigger, RefreshTrigger::CONFIG_RELOAD);
        let offset = layer.ensure_foot_offset_with(&SlabLoader);
        assert!((offset - 1.0).abs() < 1e-5);
        assert_eq!(layer.snapshot().next().unwrap().orientation, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn reload_keeps_the_orientation_a_settled_offset_was_measured_under() {
        let mut layer = MarkerLayer::new(PlacementConfig::default(), SettableGround::at(10.0));
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        let offset = layer.ensure_foot_offset_with(&SlabLoader);
        assert!((offset - 2.0).abs() < 1e-5);

        let mut reloaded = probe_config();
        reloaded.ground.clearance_m = 1.0;
        reloaded.model.source = "tram.glb".into();
        layer.apply_config(reloaded);

        assert_eq!(layer.config().ground.clearance_m, 1.0);
        assert_eq!(layer.config().model.orientation, DisplayOrientation::default());
        assert_eq!(layer.config().model.source, PlacementConfig::default().model.source);
        assert_eq!(layer.snapshot().next().unwrap().orientation, [0.0, 0.0, 90.0]);
        assert_eq!(layer.foot_offset(), Some(offset));
    }

    #[test]
    fn calibration_and_scheduled_work_share_one_refresh() {
        let ground = SettableGround::at(10.0);
        let mut layer = MarkerLayer::new(probe_config(), ground.clone());
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        let before = layer.marker("bus-1").unwrap().vertical.displayed_z;
        layer.attach(
            Box::new(RecordingSurface::new()),
            Some(Arc::new(FixedLoader(0.0))),
            Duration::ZERO,
        );
        // Let the worker finish without collecting its result.
        std::thread::sleep(Duration::from_millis(300));

        ground.set(0.0);
        layer.handle_surface_event(SurfaceEvent::MoveEnd, Duration::from_millis(10));
        layer.tick(Duration::from_secs(1));

        let stats = layer.stats();
        assert_eq!(stats.refreshes, 1);
        assert!(stats.last_trigger.contains(RefreshTrigger::CALIBRATED | RefreshTrigger::MOVE_END));
        let after = layer.marker("bus-1").unwrap().vertical.displayed_z;
        let max_drop = layer.config().smoothing.max_drop_per_refresh_m;
        assert!((before - after - max_drop).abs() < 1e-9);
    }

    #[test]
    fn non_finite_positions_are_rejected_without_a_push() {
        let ground = SettableGround::at(10.0);
        let (mut layer, surface) = attached(&ground);
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));
        let pushes = surface.push_count();

        let outcome = layer.upsert(PositionUpdate::new("bus-1", f64::NAN, 35.6));
        assert_eq!(outcome, UpsertOutcome::Rejected);
        let outcome = layer.upsert(PositionUpdate::new("bus-2", 139.7, f64::NEG_INFINITY));
        assert_eq!(outcome, UpsertOutcome::Rejected);
        assert_eq!(surface.push_count(), pushes);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.marker("bus-1").unwrap().lng, 139.7);
    }

    #[test]
    fn route_preset_turns_models_with_bearing() {
        let config = PlacementConfig::builtin(crate::config::PlacementPreset::Route);
        let mut layer = MarkerLayer::new(config, SettableGround::at(0.0));
        layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6).with_bearing(120.0));
        let snapshot: Vec<_> = layer.snapshot().collect();
        assert_eq!(snapshot[0].orientation, [0.0, 120.0, 90.0]);
    }
}

mod common;

use std::time::Duration;

use marker_core::{build_headless_app, run_frame, MarkerLayer, PositionUpdate, RecordingSurface};

#[test]
fn app_initializes() {
    let config = common::test_config();
    let mut layer = MarkerLayer::new(config, common::StepGround::new(10.0));
    layer.attach(Box::new(RecordingSurface::new()), None, Duration::ZERO);
    layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));

    let mut app = build_headless_app(layer);
    // run a single update tick to ensure schedule executes without panic
    run_frame(&mut app);
}

#[test]
fn fixture_config_matches_probe_constants() {
    let config = common::test_config();
    assert_eq!(config.ground.clearance_m, 0.4);
    assert_eq!(config.lift.hard_lift_m, 40.0);
    assert_eq!(config.model.scale, 1.0);
    assert_eq!(config.model.default_foot_offset_m, 1.7);
    assert_eq!(config.schedule.bootstrap_ticks, 3);
    // Sections the fixture leaves out keep their defaults.
    assert_eq!(config.smoothing.stable_lock_ticks, 6);
    assert_eq!(config.model.default_color, "#38bdf8");
}

#[test]
fn bootstrap_from_fixture_schedule_finishes() {
    use bevy::time::TimeUpdateStrategy;
    use marker_core::PlacementMetrics;

    let config = common::test_config();
    let mut layer = MarkerLayer::new(config, common::StepGround::new(10.0));
    layer.attach(Box::new(RecordingSurface::new()), None, Duration::ZERO);
    layer.upsert(PositionUpdate::new("bus-1", 139.7, 35.6));

    let mut app = build_headless_app(layer);
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)));
    // Three ticks at 200 ms; the first update only starts the clock.
    for _ in 0..12 {
        run_frame(&mut app);
    }

    let metrics = app.world.resource::<PlacementMetrics>();
    assert_eq!(metrics.frame, 12);
    assert_eq!(metrics.refreshes, 3);
    assert_eq!(metrics.markers, 1);
    assert_eq!(app.world.resource::<MarkerLayer>().bootstrap_remaining(), 0);
}

#[derive(Debug, serde::Deserialize)]
struct WireMarker {
    id: String,
    z: f64,
    orientation: [f64; 3],
}

#[derive(Debug, serde::Deserialize)]
struct WireFrame {
    sequence: u64,
    markers: Vec<WireMarker>,
}

#[test]
fn pushed_frames_decode_as_plain_json() -> anyhow::Result<()> {
    let config = common::test_config();
    let mut layer = MarkerLayer::new(config, common::StepGround::new(10.0));
    let surface = RecordingSurface::new();
    layer.attach(Box::new(surface.clone()), None, Duration::ZERO);
    layer.upsert(PositionUpdate::new("probe", 139.7, 35.6));

    let frame = surface.last_frame().expect("upsert pushed a frame");
    let wire: WireFrame = serde_json::from_str(&serde_json::to_string(&frame)?)?;
    assert_eq!(wire.sequence, 2);
    assert_eq!(wire.markers.len(), 1);
    assert_eq!(wire.markers[0].id, "probe");
    assert!((wire.markers[0].z - 52.1).abs() < 1e-9);
    assert_eq!(wire.markers[0].orientation, [0.0, 0.0, 90.0]);
    Ok(())
}

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use marker_core::config::CONFIG_PATH_ENV;
use marker_core::{
    load_placement_config_from_env, ElevationQuery, PlacementConfig, PlacementPreset,
    TerrainError, TerrainProvider,
};

static INIT: Once = Once::new();

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixtures_dir().join("test_placement_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test placement config at {}",
            config_path.display()
        );

        std::env::set_var(CONFIG_PATH_ENV, &config_path);
    });
}

/// The fixture config, loaded the way hosts load theirs.
pub fn test_config() -> PlacementConfig {
    ensure_test_config();
    let (config, source) = load_placement_config_from_env(PlacementPreset::Overlay);
    assert!(source.is_some(), "fixture config was not picked up");
    config
}

/// Ground at one height everywhere, adjustable from the test.
#[derive(Clone)]
pub struct StepGround(Arc<Mutex<f64>>);

impl StepGround {
    pub fn new(height: f64) -> Self {
        Self(Arc::new(Mutex::new(height)))
    }

    pub fn set(&self, height: f64) {
        *self.0.lock().unwrap() = height;
    }
}

impl TerrainProvider for StepGround {
    fn query_elevation(&self, _: f64, _: f64, _: ElevationQuery) -> Result<f64, TerrainError> {
        Ok(*self.0.lock().unwrap())
    }
}

//! Vertical placement tuning.
//!
//! Loaded from JSON with per-section defaults, so a file only needs to name
//! the values it changes. Two builtin presets ship with the crate: `overlay`
//! (tall lift, used over 3D buildings) and `route` (hugs the road and turns
//! the model to the vehicle's bearing).

use std::{
    env, fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::model::DisplayOrientation;

pub const BUILTIN_OVERLAY_CONFIG: &str = include_str!("data/placement_overlay.json");
pub const BUILTIN_ROUTE_CONFIG: &str = include_str!("data/placement_route.json");

pub const CONFIG_PATH_ENV: &str = "MARKER_PLACEMENT_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPreset {
    #[default]
    Overlay,
    Route,
}

impl PlacementPreset {
    fn json(self) -> &'static str {
        match self {
            PlacementPreset::Overlay => BUILTIN_OVERLAY_CONFIG,
            PlacementPreset::Route => BUILTIN_ROUTE_CONFIG,
        }
    }
}

impl fmt::Display for PlacementPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementPreset::Overlay => write!(f, "overlay"),
            PlacementPreset::Route => write!(f, "route"),
        }
    }
}

impl FromStr for PlacementPreset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "overlay" => Ok(PlacementPreset::Overlay),
            "route" => Ok(PlacementPreset::Route),
            other => Err(format!("unknown placement preset `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub ground: GroundConfig,
    pub lift: LiftConfig,
    pub model: ModelConfig,
    pub smoothing: SmoothingConfig,
    pub schedule: ScheduleConfig,
}

impl PlacementConfig {
    pub fn builtin(preset: PlacementPreset) -> Self {
        serde_json::from_str(preset.json()).expect("builtin placement config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, PlacementConfigError> {
        let config: PlacementConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PlacementConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| PlacementConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        PlacementConfig::from_json_str(&contents)
    }

    /// Reject values the stabilizer cannot work with.
    pub fn validate(&self) -> Result<(), PlacementConfigError> {
        let s = &self.smoothing;
        check_factor("smoothing.ema_up", s.ema_up)?;
        check_factor("smoothing.ema_down", s.ema_down)?;
        check_non_negative("smoothing.hysteresis_m", s.hysteresis_m)?;
        check_non_negative("smoothing.unlock_move_m", s.unlock_move_m)?;
        check_non_negative("smoothing.unlock_drift_m", s.unlock_drift_m)?;
        check_non_negative("smoothing.max_drop_per_refresh_m", s.max_drop_per_refresh_m)?;
        check_non_negative("smoothing.commit_epsilon_m", s.commit_epsilon_m)?;
        if s.stable_lock_ticks == 0 {
            return Err(PlacementConfigError::invalid(
                "smoothing.stable_lock_ticks",
                "must be at least 1",
            ));
        }

        check_non_negative("ground.clearance_m", self.ground.clearance_m)?;
        check_finite("ground.fallback_z_m", self.ground.fallback_z_m)?;
        check_non_negative("ground.neighbor_radius_m", self.ground.neighbor_radius_m)?;
        check_non_negative("lift.hard_lift_m", self.lift.hard_lift_m)?;
        check_finite("lift.extra_lift_m", self.lift.extra_lift_m)?;
        check_non_negative("model.scale", self.model.scale)?;
        check_non_negative("model.default_foot_offset_m", self.model.default_foot_offset_m)?;
        if self.schedule.bootstrap_interval_ms == 0 && self.schedule.bootstrap_ticks > 0 {
            return Err(PlacementConfigError::invalid(
                "schedule.bootstrap_interval_ms",
                "must be positive while bootstrap_ticks > 0",
            ));
        }
        Ok(())
    }

    /// Sum of every additive term above the model's foot.
    pub fn vertical_bias_m(&self) -> f64 {
        self.ground.clearance_m + self.lift.hard_lift_m + self.lift.extra_lift_m
    }
}

fn check_factor(field: &'static str, value: f64) -> Result<(), PlacementConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PlacementConfigError::invalid(field, "must lie in (0, 1]"))
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), PlacementConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PlacementConfigError::invalid(field, "must be finite and >= 0"))
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), PlacementConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PlacementConfigError::invalid(field, "must be finite"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    /// Constant margin kept between the model's foot and the ground.
    pub clearance_m: f64,
    /// Base height used when no terrain sample is available at all.
    pub fallback_z_m: f64,
    pub neighbor_radius_m: f64,
    pub use_exaggerated: bool,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            clearance_m: 0.40,
            fallback_z_m: 6.0,
            neighbor_radius_m: 2.0,
            use_exaggerated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LiftConfig {
    pub hard_lift_m: f64,
    pub extra_lift_m: f64,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            hard_lift_m: 40.0,
            extra_lift_m: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub source: String,
    pub scale: f64,
    pub orientation: DisplayOrientation,
    pub default_foot_offset_m: f64,
    /// Add each marker's bearing to the model yaw.
    pub apply_bearing: bool,
    pub default_color: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: "models/bus.glb".to_string(),
            scale: 1.0,
            orientation: DisplayOrientation::default(),
            default_foot_offset_m: 1.7,
            apply_bearing: false,
            default_color: "#38bdf8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub ema_up: f64,
    pub ema_down: f64,
    pub hysteresis_m: f64,
    pub stable_lock_ticks: u32,
    pub unlock_move_m: f64,
    pub unlock_drift_m: f64,
    pub max_drop_per_refresh_m: f64,
    pub commit_epsilon_m: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            ema_up: 0.55,
            ema_down: 0.10,
            hysteresis_m: 0.03,
            stable_lock_ticks: 6,
            unlock_move_m: 0.6,
            unlock_drift_m: 1.0,
            max_drop_per_refresh_m: 0.15,
            commit_epsilon_m: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub debounce_ms: u64,
    pub bootstrap_interval_ms: u64,
    pub bootstrap_ticks: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 120,
            bootstrap_interval_ms: 500,
            bootstrap_ticks: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn bootstrap_interval(&self) -> Duration {
        Duration::from_millis(self.bootstrap_interval_ms)
    }
}

#[derive(Debug, Error)]
pub enum PlacementConfigError {
    #[error("failed to parse placement config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read placement config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid placement config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl PlacementConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        PlacementConfigError::Invalid { field, reason }
    }
}

/// Load the placement config named by `MARKER_PLACEMENT_CONFIG_PATH`, falling
/// back to the builtin `preset`. Returns the path the config came from.
pub fn load_placement_config_from_env(
    preset: PlacementPreset,
) -> (PlacementConfig, Option<PathBuf>) {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        match PlacementConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "terrain_markers::config",
                    path = %path.display(),
                    "placement_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "terrain_markers::config",
                    path = %path.display(),
                    error = %err,
                    "placement_config.load_failed"
                );
            }
        }
    }

    tracing::info!(
        target: "terrain_markers::config",
        %preset,
        "placement_config.loaded=builtin"
    );
    (PlacementConfig::builtin(preset), None)
}

use crate::config::PlacementConfig;
use crate::elevation::ElevationSampler;
use crate::terrain::TerrainProvider;

/// Ideal vertical coordinate for a horizontal position, before smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetZ {
    pub value: f64,
    /// Neighbourhood ground height, `None` when the fallback base was used.
    pub ground: Option<f64>,
}

impl TargetZ {
    pub fn used_fallback(&self) -> bool {
        self.ground.is_none()
    }
}

/// Combines ground height, model foot offset and the configured vertical
/// terms:
///
/// `ground_or_fallback + foot * scale + clearance + hard_lift + extra_lift`
pub struct TargetZResolver<'a> {
    config: &'a PlacementConfig,
    sampler: ElevationSampler<'a>,
    foot_offset_m: f64,
}

impl<'a> TargetZResolver<'a> {
    pub fn new(
        config: &'a PlacementConfig,
        terrain: &'a dyn TerrainProvider,
        foot_offset_m: f64,
    ) -> Self {
        Self {
            config,
            sampler: ElevationSampler::new(terrain, config.ground.use_exaggerated),
            foot_offset_m,
        }
    }

    pub fn resolve(&self, lng: f64, lat: f64) -> TargetZ {
        let ground = self
            .sampler
            .sample_max_around(lng, lat, self.config.ground.neighbor_radius_m);
        let base = ground.unwrap_or(self.config.ground.fallback_z_m);
        let value =
            base + self.foot_offset_m * self.config.model.scale + self.config.vertical_bias_m();
        TargetZ { value, ground }
    }

    pub fn compute_target_z(&self, lng: f64, lat: f64) -> f64 {
        self.resolve(lng, lat).value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{ElevationQuery, TerrainError};

    fn probe_config() -> PlacementConfig {
        let mut config = PlacementConfig::default();
        config.ground.clearance_m = 0.4;
        config.lift.hard_lift_m = 40.0;
        config.lift.extra_lift_m = 0.0;
        config.model.scale = 1.0;
        config
    }

    #[test]
    fn sums_ground_foot_and_lifts() {
        let config = probe_config();
        let ground = |_: f64, _: f64, _: ElevationQuery| -> Result<f64, TerrainError> { Ok(10.0) };
        let resolver = TargetZResolver::new(&config, &ground, 1.7);
        let target = resolver.resolve(139.7, 35.6);
        assert_eq!(target.ground, Some(10.0));
        assert!((target.value - 52.1).abs() < 1e-9);
    }

    #[test]
    fn foot_offset_is_scaled() {
        let mut config = probe_config();
        config.model.scale = 0.6;
        config.lift.hard_lift_m = 0.8;
        let ground = |_: f64, _: f64, _: ElevationQuery| -> Result<f64, TerrainError> { Ok(0.0) };
        let resolver = TargetZResolver::new(&config, &ground, 2.0);
        assert!((resolver.compute_target_z(0.0, 0.0) - (1.2 + 0.4 + 0.8)).abs() < 1e-9);
    }

    #[test]
    fn missing_terrain_falls_back() {
        let config = probe_config();
        let offline = |lng: f64, lat: f64, _: ElevationQuery| -> Result<f64, TerrainError> {
            Err(TerrainError::NotLoaded { lng, lat })
        };
        let resolver = TargetZResolver::new(&config, &offline, 1.7);
        let target = resolver.resolve(139.7, 35.6);
        assert!(target.used_fallback());
        assert!((target.value - (6.0 + 1.7 + 0.4 + 40.0)).abs() < 1e-9);
    }

    #[test]
    fn extra_lift_shifts_the_target() {
        let mut config = probe_config();
        let ground = |_: f64, _: f64, _: ElevationQuery| -> Result<f64, TerrainError> { Ok(10.0) };
        let before = TargetZResolver::new(&config, &ground, 1.7).compute_target_z(0.0, 0.0);
        config.lift.extra_lift_m = -0.25;
        let after = TargetZResolver::new(&config, &ground, 1.7).compute_target_z(0.0, 0.0);
        assert!((before - after - 0.25).abs() < 1e-9);
    }
}

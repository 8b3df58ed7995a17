use tracing::trace;

use crate::geo::meters_to_degrees;
use crate::terrain::{ElevationQuery, TerrainProvider};

/// Cardinal offsets (east, north) sampled around a marker, in units of the
/// neighbourhood radius. The centre comes first.
const NEIGHBOURHOOD: [(f64, f64); 5] = [(0.0, 0.0), (1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)];

/// Ground-height queries that never fail past their call site.
///
/// Provider errors and non-finite heights are reported as `None`.
#[derive(Clone, Copy)]
pub struct ElevationSampler<'a> {
    terrain: &'a dyn TerrainProvider,
    query: ElevationQuery,
}

impl<'a> ElevationSampler<'a> {
    pub fn new(terrain: &'a dyn TerrainProvider, exaggerated: bool) -> Self {
        Self {
            terrain,
            query: ElevationQuery { exaggerated },
        }
    }

    /// Ground height at a single point.
    pub fn sample_ground(&self, lng: f64, lat: f64) -> Option<f64> {
        match self.terrain.query_elevation(lng, lat, self.query) {
            Ok(height) if height.is_finite() => Some(height),
            Ok(height) => {
                trace!(
                    target: "terrain_markers::elevation",
                    lng,
                    lat,
                    height,
                    "elevation.sample_rejected=non_finite"
                );
                None
            }
            Err(err) => {
                trace!(
                    target: "terrain_markers::elevation",
                    lng,
                    lat,
                    error = %err,
                    "elevation.sample_rejected=provider_error"
                );
                None
            }
        }
    }

    /// Highest finite ground height among the centre and the four cardinal
    /// points `radius_m` away.
    ///
    /// Taking the maximum keeps a marker's base out of small depressions
    /// directly underneath it, at the price of riding slightly high on bumps.
    pub fn sample_max_around(&self, lng: f64, lat: f64, radius_m: f64) -> Option<f64> {
        NEIGHBOURHOOD
            .iter()
            .filter_map(|&(ux, uy)| {
                let (d_lng, d_lat) = meters_to_degrees(lat, ux * radius_m, uy * radius_m);
                self.sample_ground(lng + d_lng, lat + d_lat)
            })
            .reduce(f64::max)
    }
}

//! Terrain height providers.
//!
//! The render surface owns the real digital elevation model; the layer only
//! sees it through [`TerrainProvider`]. [`GridTerrain`] is a geo-referenced
//! height grid used by the headless server and tests, and [`NoisyTerrain`]
//! wraps any provider to model tiles that are still streaming in.

use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Options forwarded with every elevation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElevationQuery {
    /// Ask for heights scaled by the surface's terrain exaggeration.
    pub exaggerated: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerrainError {
    #[error("terrain tile not loaded at ({lng:.6}, {lat:.6})")]
    NotLoaded { lng: f64, lat: f64 },
    #[error("position ({lng:.6}, {lat:.6}) is outside terrain coverage")]
    OutOfBounds { lng: f64, lat: f64 },
    #[error("terrain provider failure: {0}")]
    Provider(String),
}

/// Best-effort ground height lookup.
///
/// Implementations may fail or return non-finite values at any time; callers
/// go through [`crate::elevation::ElevationSampler`], which absorbs both.
pub trait TerrainProvider: Send + Sync {
    fn query_elevation(
        &self,
        lng: f64,
        lat: f64,
        query: ElevationQuery,
    ) -> Result<f64, TerrainError>;
}

impl<F> TerrainProvider for F
where
    F: Fn(f64, f64, ElevationQuery) -> Result<f64, TerrainError> + Send + Sync,
{
    fn query_elevation(
        &self,
        lng: f64,
        lat: f64,
        query: ElevationQuery,
    ) -> Result<f64, TerrainError> {
        self(lng, lat, query)
    }
}

/// Axis-aligned geographic rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Square of `half_span_deg` around a centre point.
    pub fn around(lng: f64, lat: f64, half_span_deg: f64) -> Self {
        Self::new(
            lng - half_span_deg,
            lat - half_span_deg,
            lng + half_span_deg,
            lat + half_span_deg,
        )
    }

    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        lng >= self.west && lng <= self.east && lat >= self.south && lat <= self.north
    }

    fn normalise(&self, lng: f64, lat: f64) -> (f64, f64) {
        let span_x = (self.east - self.west).max(f64::EPSILON);
        let span_y = (self.north - self.south).max(f64::EPSILON);
        ((lng - self.west) / span_x, (lat - self.south) / span_y)
    }
}

/// Relief parameters for [`GridTerrain::generate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relief {
    pub base_m: f32,
    pub amplitude_m: f32,
    pub roughness: f32,
}

impl Default for Relief {
    fn default() -> Self {
        Self {
            base_m: 20.0,
            amplitude_m: 60.0,
            roughness: 0.6,
        }
    }
}

/// Height grid in metres covering [`GeoBounds`]. Row 0 is the southern edge.
#[derive(Debug, Clone)]
pub struct GridTerrain {
    bounds: GeoBounds,
    width: u32,
    height: u32,
    values: Arc<Vec<f32>>,
    exaggeration: f64,
}

impl GridTerrain {
    pub fn new(bounds: GeoBounds, width: u32, height: u32, values: Vec<f32>) -> Self {
        debug_assert!(width >= 2 && height >= 2);
        debug_assert_eq!(values.len(), (width * height) as usize);
        Self {
            bounds,
            width,
            height,
            values: Arc::new(values),
            exaggeration: 1.0,
        }
    }

    pub fn flat(bounds: GeoBounds, elevation_m: f32) -> Self {
        Self::new(bounds, 2, 2, vec![elevation_m; 4])
    }

    /// Deterministic fractal relief seeded by `seed`.
    pub fn generate(bounds: GeoBounds, width: u32, height: u32, relief: Relief, seed: u64) -> Self {
        let width = width.max(2);
        let height = height.max(2);
        let hills_seed = mix_seed(0x9E37_0001, seed, 0);
        let ridge_seed = mix_seed(0xC0F3_0001, seed, 0x85EB);
        let roughness = relief.roughness.clamp(0.1, 2.5);

        let mut values = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let nx = x as f32 / (width - 1) as f32;
                let ny = y as f32 / (height - 1) as f32;

                let hills = fbm_noise(nx * 3.0, ny * 3.0, 4, 2.0, 0.5, hills_seed);
                let ridge_source = fbm_noise(
                    nx * (4.0 + roughness * 8.0),
                    ny * (4.0 + roughness * 8.0),
                    3,
                    2.1,
                    0.45,
                    ridge_seed,
                );
                let ridged = (1.0 - (ridge_source - 0.5).abs() * 2.0)
                    .clamp(0.0, 1.0)
                    .powf(1.6);
                let shape = (hills * 0.75 + ridged * 0.25 * roughness).clamp(0.0, 1.0);
                values.push(relief.base_m + shape * relief.amplitude_m);
            }
        }

        Self::new(bounds, width, height, values)
    }

    /// Scale applied to heights when a query asks for exaggerated terrain.
    pub fn with_exaggeration(mut self, exaggeration: f64) -> Self {
        self.exaggeration = exaggeration;
        self
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    #[inline]
    pub fn sample(&self, x: u32, y: u32) -> f32 {
        debug_assert!(x < self.width && y < self.height);
        self.values[(y * self.width + x) as usize]
    }

    /// Bilinear height at a geographic position, `None` outside the grid.
    pub fn height_at(&self, lng: f64, lat: f64) -> Option<f64> {
        if !self.bounds.contains(lng, lat) {
            return None;
        }
        let (nx, ny) = self.bounds.normalise(lng, lat);
        let px = nx * (self.width - 1) as f64;
        let py = ny * (self.height - 1) as f64;

        let x0 = (px.floor() as u32).min(self.width - 1);
        let y0 = (py.floor() as u32).min(self.height - 1);
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let wx = px - x0 as f64;
        let wy = py - y0 as f64;

        let h00 = self.sample(x0, y0) as f64;
        let h10 = self.sample(x1, y0) as f64;
        let h01 = self.sample(x0, y1) as f64;
        let h11 = self.sample(x1, y1) as f64;

        let south = h00 * (1.0 - wx) + h10 * wx;
        let north = h01 * (1.0 - wx) + h11 * wx;
        Some(south * (1.0 - wy) + north * wy)
    }
}

impl TerrainProvider for GridTerrain {
    fn query_elevation(
        &self,
        lng: f64,
        lat: f64,
        query: ElevationQuery,
    ) -> Result<f64, TerrainError> {
        let height = self
            .height_at(lng, lat)
            .ok_or(TerrainError::OutOfBounds { lng, lat })?;
        Ok(if query.exaggerated {
            height * self.exaggeration
        } else {
            height
        })
    }
}

/// Wraps a provider with seeded vertical jitter and random missing samples.
pub struct NoisyTerrain<T> {
    inner: T,
    jitter_m: f64,
    dropout: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl<T: TerrainProvider> NoisyTerrain<T> {
    pub fn new(inner: T, jitter_m: f64, dropout: f64, seed: u64) -> Self {
        Self {
            inner,
            jitter_m: jitter_m.abs(),
            dropout: dropout.clamp(0.0, 1.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl<T: TerrainProvider> TerrainProvider for NoisyTerrain<T> {
    fn query_elevation(
        &self,
        lng: f64,
        lat: f64,
        query: ElevationQuery,
    ) -> Result<f64, TerrainError> {
        let (dropped, jitter) = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let dropped = rng.gen_bool(self.dropout);
            let jitter = rng.gen_range(-self.jitter_m..=self.jitter_m);
            (dropped, jitter)
        };
        if dropped {
            return Err(TerrainError::NotLoaded { lng, lat });
        }
        Ok(self.inner.query_elevation(lng, lat, query)? + jitter)
    }
}

fn fbm_noise(x: f32, y: f32, octaves: u32, lacunarity: f32, gain: f32, seed: u32) -> f32 {
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut sum = 0.0;
    let mut normaliser = 0.0;
    for octave in 0..octaves {
        sum += value_noise(x * frequency, y * frequency, seed.wrapping_add(octave)) * amplitude;
        normaliser += amplitude;
        frequency *= lacunarity;
        amplitude *= gain;
    }
    (sum / normaliser).clamp(0.0, 1.0)
}

fn value_noise(x: f32, y: f32, seed: u32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let tx = smooth_step(x - x0 as f32);
    let ty = smooth_step(y - y0 as f32);

    let south = lerp(hash2(x0, y0, seed), hash2(x0 + 1, y0, seed), tx);
    let north = lerp(hash2(x0, y0 + 1, seed), hash2(x0 + 1, y0 + 1, seed), tx);
    lerp(south, north, ty)
}

fn smooth_step(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn hash2(x: i32, y: i32, seed: u32) -> f32 {
    let mut n = (x as u32).wrapping_mul(0x6C8E_9CF5) ^ (y as u32).wrapping_mul(0xB529_7A4D) ^ seed;
    n ^= n >> 13;
    n = n.wrapping_mul(0x1B56_C4E9);
    n ^= n >> 11;
    ((n >> 8) & 0xFFFF) as f32 / 65535.0
}

fn mix_seed(base: u32, seed: u64, salt: u32) -> u32 {
    base ^ (seed as u32).rotate_left(7) ^ ((seed >> 32) as u32).rotate_left(11) ^ salt
}

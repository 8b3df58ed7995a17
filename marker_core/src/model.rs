//! Model geometry loading and the display orientation shared with the
//! render surface.

use std::path::{Path, PathBuf};

use bevy::math::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed model rotation in degrees, applied as intrinsic X→Y→Z Euler angles
/// in a Y-up frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayOrientation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Default for DisplayOrientation {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            yaw: 0.0,
            roll: 90.0,
        }
    }
}

impl DisplayOrientation {
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.pitch.to_radians(),
            self.yaw.to_radians(),
            self.roll.to_radians(),
        )
    }

    /// `[pitch, yaw, roll]` with an additional heading folded into yaw.
    pub fn with_heading(&self, bearing_deg: f64) -> [f64; 3] {
        [
            self.pitch as f64,
            self.yaw as f64 + bearing_deg,
            self.roll as f64,
        ]
    }
}

/// Vertex positions of a model in its own frame, node transforms applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelGeometry {
    pub positions: Vec<Vec3>,
}

impl ModelGeometry {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self { positions }
    }

    /// Lowest Y reached by any vertex once `rotation` is applied about the
    /// model origin.
    pub fn min_height_under(&self, rotation: Quat) -> Option<f32> {
        self.positions
            .iter()
            .map(|p| (rotation * *p).y)
            .filter(|y| y.is_finite())
            .reduce(f32::min)
    }

    /// Distance from the origin down to the lowest point under `orientation`,
    /// never negative.
    pub fn foot_offset(&self, orientation: &DisplayOrientation) -> Result<f64, ModelLoadError> {
        let min_y = self
            .min_height_under(orientation.rotation())
            .ok_or(ModelLoadError::EmptyGeometry)?;
        Ok((-(min_y as f64)).max(0.0))
    }
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to import glTF model from {path:?}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("glTF model {0:?} contains no scene")]
    NoScene(PathBuf),
    #[error("model contains no vertex positions")]
    EmptyGeometry,
    #[error("model source unavailable: {0}")]
    Unavailable(String),
}

/// Source of model geometry for foot-offset calibration.
pub trait ModelLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<ModelGeometry, ModelLoadError>;
}

/// Loads `.glb`/`.gltf` files relative to an asset root.
#[derive(Debug, Clone, Default)]
pub struct GltfModelLoader {
    root: Option<PathBuf>,
}

impl GltfModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        match &self.root {
            Some(root) if Path::new(source).is_relative() => root.join(source),
            _ => PathBuf::from(source),
        }
    }
}

impl ModelLoader for GltfModelLoader {
    fn load(&self, source: &str) -> Result<ModelGeometry, ModelLoadError> {
        let path = self.resolve(source);
        let (document, buffers, _images) =
            gltf::import(&path).map_err(|source| ModelLoadError::Import {
                path: path.clone(),
                source,
            })?;
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| ModelLoadError::NoScene(path.clone()))?;

        let mut positions = Vec::new();
        for node in scene.nodes() {
            collect_node_positions(&node, Mat4::IDENTITY, &buffers, &mut positions);
        }
        if positions.is_empty() {
            return Err(ModelLoadError::EmptyGeometry);
        }
        Ok(ModelGeometry::new(positions))
    }
}

fn collect_node_positions(
    node: &gltf::Node<'_>,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Vec<Vec3>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|b| buffers.get(b.index()).map(|data| data.0.as_slice()));
            if let Some(iter) = reader.read_positions() {
                out.extend(iter.map(|p| world.transform_point3(Vec3::from_array(p))));
            }
        }
    }
    for child in node.children() {
        collect_node_positions(&child, world, buffers, out);
    }
}

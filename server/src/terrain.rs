//! Terrain collaborator: turns a named asset into a static collision mesh.
//!
//! Meshes are generated once per zone load and handed straight to the shard's
//! physics world.

use crate::error::TerrainError;
use glam::Vec3;
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

pub trait TerrainSource: Send + Sync {
    fn generate_mesh(&self, asset_name: &str, origin: Vec3) -> Result<TerrainMesh, TerrainError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeightProfile {
    Flat,
    /// Parallel ridges running along X, `wavelength` metres apart.
    Ridged { wavelength: f32 },
    /// Raw little-endian signed 16-bit samples, row-major.
    RawHeightmap(PathBuf),
}

/// Grid layout of a heightfield asset.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainAssetInfo {
    pub rows: usize,
    pub cols: usize,
    pub height_scale: f32,
    pub horizontal_scale: f32,
    pub profile: HeightProfile,
}

impl TerrainAssetInfo {
    fn sample_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Normalized heights in `[-1, 1]`, row-major.
    fn samples(&self, asset: &str) -> Result<Vec<f32>, TerrainError> {
        match &self.profile {
            HeightProfile::Flat => Ok(vec![0.0; self.sample_count()]),
            HeightProfile::Ridged { wavelength } => {
                let wavelength = wavelength.max(f32::EPSILON);
                let mut samples = Vec::with_capacity(self.sample_count());
                for row in 0..self.rows {
                    let y = row as f32 * self.horizontal_scale;
                    let phase = (y / wavelength) * std::f32::consts::TAU;
                    let ridge = 1.0 - phase.sin().abs() * 2.0;
                    samples.extend(std::iter::repeat(ridge).take(self.cols));
                }
                Ok(samples)
            }
            HeightProfile::RawHeightmap(path) => {
                let bytes = std::fs::read(path)?;
                let samples: Vec<f32> = bytes
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
                    .collect();
                if samples.len() != self.sample_count() {
                    return Err(TerrainError::SampleCount {
                        asset: asset.to_string(),
                        expected: self.sample_count(),
                        actual: samples.len(),
                    });
                }
                Ok(samples)
            }
        }
    }
}

/// Builds heightfield meshes from registered asset descriptions.
#[derive(Debug, Clone, Default)]
pub struct ProceduralTerrain {
    assets: HashMap<String, TerrainAssetInfo>,
}

impl ProceduralTerrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assets shipped with the server.
    pub fn with_builtin_assets() -> Self {
        let mut terrain = Self::new();
        terrain.register_asset(
            "training_grounds",
            TerrainAssetInfo {
                rows: 65,
                cols: 65,
                height_scale: 0.0,
                horizontal_scale: 2.0,
                profile: HeightProfile::Flat,
            },
        );
        terrain.register_asset(
            "ridged_terrain",
            TerrainAssetInfo {
                rows: 129,
                cols: 129,
                height_scale: 3.0,
                horizontal_scale: 2.0,
                profile: HeightProfile::Ridged { wavelength: 64.0 },
            },
        );
        terrain
    }

    pub fn register_asset(&mut self, name: impl Into<String>, info: TerrainAssetInfo) {
        self.assets.insert(name.into(), info);
    }
}

impl TerrainSource for ProceduralTerrain {
    /// Lays the grid out centred on `origin` in X/Y, two triangles per cell.
    fn generate_mesh(&self, asset_name: &str, origin: Vec3) -> Result<TerrainMesh, TerrainError> {
        let info = self
            .assets
            .get(asset_name)
            .ok_or_else(|| TerrainError::UnknownAsset(asset_name.to_string()))?;

        if info.rows < 2 || info.cols < 2 {
            return Ok(TerrainMesh::default());
        }

        let samples = info.samples(asset_name)?;
        let half_width = (info.cols - 1) as f32 * info.horizontal_scale * 0.5;
        let half_depth = (info.rows - 1) as f32 * info.horizontal_scale * 0.5;

        let mut vertices = Vec::with_capacity(info.sample_count());
        for row in 0..info.rows {
            for col in 0..info.cols {
                let height = samples[row * info.cols + col] * info.height_scale;
                vertices.push(Vec3::new(
                    origin.x - half_width + col as f32 * info.horizontal_scale,
                    origin.y - half_depth + row as f32 * info.horizontal_scale,
                    origin.z + height,
                ));
            }
        }

        let mut indices = Vec::with_capacity((info.rows - 1) * (info.cols - 1) * 6);
        for row in 0..info.rows - 1 {
            for col in 0..info.cols - 1 {
                let top_left = (row * info.cols + col) as u32;
                let top_right = top_left + 1;
                let bottom_left = top_left + info.cols as u32;
                let bottom_right = bottom_left + 1;
                indices.extend_from_slice(&[top_left, bottom_left, top_right]);
                indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
            }
        }

        info!(
            "Generated terrain '{}' with {} vertices, {} triangles",
            asset_name,
            vertices.len(),
            indices.len() / 3
        );
        Ok(TerrainMesh { vertices, indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_flat_grid_dimensions() {
        let terrain = ProceduralTerrain::with_builtin_assets();
        let mesh = terrain.generate_mesh("training_grounds", Vec3::ZERO).unwrap();
        assert_eq!(mesh.vertices.len(), 65 * 65);
        assert_eq!(mesh.triangle_count(), 64 * 64 * 2);
        assert!(mesh.vertices.iter().all(|v| v.z == 0.0));
        assert_approx_eq!(mesh.vertices[0].x, -64.0);
        assert_approx_eq!(mesh.vertices[0].y, -64.0);
    }

    #[test]
    fn test_origin_offsets_mesh() {
        let terrain = ProceduralTerrain::with_builtin_assets();
        let mesh = terrain
            .generate_mesh("training_grounds", Vec3::new(10.0, 0.0, -2.0))
            .unwrap();
        assert_approx_eq!(mesh.vertices[0].x, -54.0);
        assert_approx_eq!(mesh.vertices[0].z, -2.0);
    }

    #[test]
    fn test_ridged_heights_stay_within_scale() {
        let terrain = ProceduralTerrain::with_builtin_assets();
        let mesh = terrain.generate_mesh("ridged_terrain", Vec3::ZERO).unwrap();
        assert!(mesh.vertices.iter().all(|v| v.z.abs() <= 3.0 + 1e-4));
        assert!(mesh.vertices.iter().any(|v| v.z > 2.0));
    }

    #[test]
    fn test_indices_reference_valid_vertices() {
        let terrain = ProceduralTerrain::with_builtin_assets();
        let mesh = terrain.generate_mesh("training_grounds", Vec3::ZERO).unwrap();
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.indices.iter().all(|i| (*i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_unknown_asset() {
        let terrain = ProceduralTerrain::new();
        assert!(matches!(
            terrain.generate_mesh("nowhere", Vec3::ZERO),
            Err(TerrainError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_degenerate_grid_yields_empty_mesh() {
        let mut terrain = ProceduralTerrain::new();
        terrain.register_asset(
            "sliver",
            TerrainAssetInfo {
                rows: 1,
                cols: 10,
                height_scale: 1.0,
                horizontal_scale: 1.0,
                profile: HeightProfile::Flat,
            },
        );
        assert!(terrain.generate_mesh("sliver", Vec3::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_missing_heightmap_file() {
        let mut terrain = ProceduralTerrain::new();
        terrain.register_asset(
            "missing",
            TerrainAssetInfo {
                rows: 2,
                cols: 2,
                height_scale: 1.0,
                horizontal_scale: 1.0,
                profile: HeightProfile::RawHeightmap(PathBuf::from("/nonexistent/heights.raw")),
            },
        );
        assert!(matches!(
            terrain.generate_mesh("missing", Vec3::ZERO),
            Err(TerrainError::Io(_))
        ));
    }
}

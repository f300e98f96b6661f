//! Terrain model configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How point clouds are fused into the terrain model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    /// Fold every in-range point straight into the terrain statistics.
    #[default]
    Static,
    /// Accumulate each cloud separately, classify cells as flat or
    /// vertical by their in-frame z variance, and keep a shadow ground
    /// model so transient obstacles do not pollute the terrain.
    Dynamic,
}

/// Configuration for the terrain model.
///
/// The window should cover roughly three times the sensor range; for a
/// Velodyne, 90m x 90m at 0.1 m/pixel works well. The derived pixel
/// dimensions must come out divisible by 3 so the window splits into a
/// 3x3 grid of tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Window width in meters.
    pub size_x: f64,

    /// Window height in meters.
    pub size_y: f64,

    /// Pixel size in meters.
    pub scale: f64,

    /// UTM easting of the window's top-left pixel.
    pub utm_x: f64,

    /// UTM northing of the window's top-left pixel.
    pub utm_y: f64,

    /// UTM easting of the custom (robot) frame origin.
    pub custom_x: f64,

    /// UTM northing of the custom (robot) frame origin.
    pub custom_y: f64,

    /// Multiplier on the mean per-cloud variance that separates flat
    /// cells from vertical ones.
    pub variance_factor: f32,

    /// Fusion path selection.
    pub mode: FusionMode,

    /// Directory where tile files are stored.
    pub tile_dir: PathBuf,

    /// Tile file name prefix; files are named `<prefix>.<tx>x<ty>.bhumi`.
    pub tile_prefix: String,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size_x: 90.0,
            size_y: 90.0,
            scale: 0.1,
            utm_x: 0.0,
            utm_y: 0.0,
            custom_x: 0.0,
            custom_y: 0.0,
            variance_factor: 3.0,
            mode: FusionMode::Static,
            tile_dir: PathBuf::from("."),
            tile_prefix: "dtm".to_string(),
        }
    }
}

impl TerrainConfig {
    /// Parse a configuration from a TOML string.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Window width in pixels.
    pub(crate) fn pixel_width(&self) -> usize {
        (self.size_x / self.scale).ceil() as usize
    }

    /// Window height in pixels.
    pub(crate) fn pixel_height(&self) -> usize {
        (self.size_y / self.scale).ceil() as usize
    }
}

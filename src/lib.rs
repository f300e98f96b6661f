//! # bhumi-dtm: Online Digital Terrain Model
//!
//! Maintains a terrain elevation model around a mobile robot by
//! incrementally fusing 3D point clouds into a geo-referenced raster of
//! per-cell statistics (count, min, max, mean, spread, timestamp).
//!
//! The active window is a 3x3 grid of tiles sliding across a larger
//! virtual world: when the robot leaves the window's central square,
//! tiles scrolling out are persisted to disk and previously saved tiles
//! scrolling in are restored. A dynamic fusion mode classifies cells as
//! flat or vertical by their per-frame z variance, parking the ground
//! statistics aside while an obstacle occludes them.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bhumi_dtm::{PointCloud, Point3D, TerrainConfig, TerrainModel, TransformMatrix};
//!
//! let config = TerrainConfig {
//!     size_x: 90.0,
//!     size_y: 90.0,
//!     scale: 0.1,
//!     tile_dir: "/var/lib/dtm".into(),
//!     ..Default::default()
//! };
//! let mut model = TerrainModel::new(config)?;
//!
//! // One sensor frame: points in the sensor frame plus the
//! // sensor-to-world transform.
//! let mut cloud = PointCloud::from_points(&[
//!     Point3D::new(1.2, 0.4, 0.1),
//!     Point3D::new(1.3, 0.4, 0.1),
//! ]);
//! let sensor_to_world = TransformMatrix::from_pose6d(0.3, 0.0, 0.0, 12.0, 7.5, 0.6);
//! model.merge(&mut cloud, &sensor_to_world)?;
//!
//! // Geo-referenced raster, synced on demand.
//! model.raster().save("terrain.bhumi")?;
//! # Ok::<(), bhumi_dtm::DtmError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  terrain/                   │  ← model, fusion, window,
//! │   (TerrainModel, slide_to, merge, tiles)    │    tile persistence
//! └─────────────────────────────────────────────┘
//!                       │
//! ┌─────────────────────────────────────────────┐
//! │                  raster/                    │  ← geo-referenced bands,
//! │       (GeoRaster, .bhumi file format)       │    coordinate mapping
//! └─────────────────────────────────────────────┘
//!                       │
//! ┌─────────────────────────────────────────────┐
//! │                   core/                     │  ← cell statistics,
//! │  (CellStats, PointCloud, TransformMatrix)   │    points, transforms
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! A model is single-threaded and non-reentrant; every entry point takes
//! `&mut self` and runs to completion. Drive distinct models from
//! distinct threads if needed.

pub mod core;
pub mod error;
pub mod raster;
pub mod terrain;

pub use crate::core::{CellStats, Point3D, PointCloud, TransformMatrix};
pub use error::{DtmError, Result};
pub use raster::{Band, GeoRaster, BAND_NAMES};
pub use terrain::{
    EventSink, FusionMode, LogSink, Maplet, TerrainConfig, TerrainEvent, TerrainModel, TileStore,
};

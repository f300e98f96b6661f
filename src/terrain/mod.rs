//! Online digital terrain model.
//!
//! [`TerrainModel`] owns a geo-referenced raster window and the in-memory
//! cell grids fused from incoming point clouds. The window is a 3x3 grid
//! of tiles that slides across the world as the robot moves
//! ([`TerrainModel::slide_to`]); fusion entry points live in
//! [`TerrainModel::merge`] and [`TerrainModel::dynamic_merge`].
//!
//! # Data flow
//!
//! ```text
//! cloud -> transform to world -> slide window (tile save/load)
//!       -> fold points into cells -> raster marked stale
//!       -> sync on demand (raster(), save_all())
//! ```

mod config;
mod events;
mod fusion;
mod tile;
mod window;

pub use config::{FusionMode, TerrainConfig};
pub use events::{EventSink, LogSink, TerrainEvent};
pub use tile::{Maplet, TileStore};

use std::path::Path;
use std::time::SystemTime;

use crate::core::CellStats;
use crate::error::{DtmError, Result};
use crate::raster::{check_window_dims, Band, GeoRaster, BAND_NAMES};

/// Write cell statistics into the raster's six bands.
pub(crate) fn write_cells(raster: &mut GeoRaster, cells: &[CellStats]) {
    let band = raster.band_mut(Band::NPoints);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.n_points as f32;
    }
    let band = raster.band_mut(Band::ZMax);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.z_max;
    }
    let band = raster.band_mut(Band::ZMin);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.z_min;
    }
    let band = raster.band_mut(Band::ZMean);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.z_mean;
    }
    let band = raster.band_mut(Band::Variance);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.variance;
    }
    let band = raster.band_mut(Band::LastUpdate);
    for (value, cell) in band.iter_mut().zip(cells) {
        *value = cell.last_update;
    }
}

/// Rebuild cell statistics from the raster's bands.
///
/// Fails if the raster does not carry exactly the six standard bands.
pub(crate) fn read_cells(raster: &GeoRaster) -> Result<Vec<CellStats>> {
    if !raster.has_standard_bands() {
        return Err(DtmError::BandMismatch(format!(
            "expected bands {:?}, found {:?}",
            BAND_NAMES,
            raster.band_names()
        )));
    }
    let n_points = raster.band(Band::NPoints);
    let z_max = raster.band(Band::ZMax);
    let z_min = raster.band(Band::ZMin);
    let z_mean = raster.band(Band::ZMean);
    let variance = raster.band(Band::Variance);
    let last_update = raster.band(Band::LastUpdate);

    Ok((0..n_points.len())
        .map(|i| CellStats {
            n_points: n_points[i] as u32,
            z_max: z_max[i],
            z_min: z_min[i],
            z_mean: z_mean[i],
            variance: variance[i],
            last_update: last_update[i],
        })
        .collect())
}

/// Online terrain model around a mobile robot.
///
/// Single-threaded and non-reentrant: every entry point takes `&mut self`
/// and runs to completion. Distinct models may be driven independently.
pub struct TerrainModel {
    raster: GeoRaster,
    /// Authoritative terrain statistics, row-major `width x height`.
    cells: Vec<CellStats>,
    /// Scratch accumulator for the cloud being fused in dynamic mode.
    dynamic_cells: Vec<CellStats>,
    /// Last known flat (ground) statistics per cell.
    ground_cells: Vec<CellStats>,
    /// Per-cell classification; `true` means vertical.
    vertical: Vec<bool>,
    /// Tile coordinate of the window's centre tile.
    current: (i32, i32),
    /// Raster bands out of date with respect to `cells`?
    dirty: bool,
    width: usize,
    height: usize,
    /// Tile dimensions (`width / 3`, `height / 3`).
    sub_width: usize,
    sub_height: usize,
    config: TerrainConfig,
    tiles: TileStore,
    time_base: SystemTime,
    sink: Box<dyn EventSink>,
}

impl TerrainModel {
    /// Create a model with a fresh window described by `config`.
    ///
    /// Tiles previously saved around tile (0, 0) with the same geometry
    /// are restored into the window, so a restarted process resumes its
    /// map.
    pub fn new(config: TerrainConfig) -> Result<Self> {
        let width = config.pixel_width();
        let height = config.pixel_height();
        check_window_dims(width, height)?;

        let mut raster = GeoRaster::new(width, height);
        raster.set_transform(config.utm_x, config.utm_y, config.scale, config.scale);
        raster.set_custom_origin(config.custom_x, config.custom_y);

        let size = width * height;
        let tiles = TileStore::new(config.tile_dir.clone(), config.tile_prefix.clone());
        let mut model = Self {
            raster,
            cells: vec![CellStats::default(); size],
            dynamic_cells: vec![CellStats::default(); size],
            ground_cells: vec![CellStats::default(); size],
            vertical: vec![false; size],
            current: (0, 0),
            dirty: false,
            width,
            height,
            sub_width: width / 3,
            sub_height: height / 3,
            config,
            tiles,
            time_base: SystemTime::now(),
            sink: Box::new(LogSink),
        };

        for sy in -1..=1 {
            for sx in -1..=1 {
                model.load_tile(sx, sy);
            }
        }
        Ok(model)
    }

    /// Create a model from an existing full-window raster.
    ///
    /// The raster must carry the six standard bands and dimensions
    /// divisible by 3.
    pub fn from_raster(raster: GeoRaster, config: TerrainConfig) -> Result<Self> {
        let width = raster.width();
        let height = raster.height();
        check_window_dims(width, height)?;
        let cells = read_cells(&raster)?;

        let size = width * height;
        let tiles = TileStore::new(config.tile_dir.clone(), config.tile_prefix.clone());
        Ok(Self {
            raster,
            cells,
            dynamic_cells: vec![CellStats::default(); size],
            ground_cells: vec![CellStats::default(); size],
            vertical: vec![false; size],
            current: (0, 0),
            dirty: false,
            width,
            height,
            sub_width: width / 3,
            sub_height: height / 3,
            config,
            tiles,
            time_base: SystemTime::now(),
            sink: Box::new(LogSink),
        })
    }

    /// Load a model from a full-window raster file.
    pub fn open<P: AsRef<Path>>(path: P, config: TerrainConfig) -> Result<Self> {
        Self::from_raster(GeoRaster::load(path)?, config)
    }

    /// Window width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Window height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Tile width in pixels (one third of the window).
    #[inline]
    pub fn sub_width(&self) -> usize {
        self.sub_width
    }

    /// Tile height in pixels (one third of the window).
    #[inline]
    pub fn sub_height(&self) -> usize {
        self.sub_height
    }

    /// Tile coordinate of the window's centre tile.
    #[inline]
    pub fn current(&self) -> (i32, i32) {
        self.current
    }

    /// Are the raster bands out of date with respect to the cells?
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The authoritative terrain statistics, row-major.
    pub fn cells(&self) -> &[CellStats] {
        &self.cells
    }

    /// Per-cell flat/vertical classification (dynamic mode).
    pub fn vertical(&self) -> &[bool] {
        &self.vertical
    }

    /// Last known flat ground statistics per cell (dynamic mode).
    pub fn ground_cells(&self) -> &[CellStats] {
        &self.ground_cells
    }

    /// The active configuration.
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// The tile store used for maplet persistence.
    pub fn tile_store(&self) -> &TileStore {
        &self.tiles
    }

    /// Row-major cell index for a custom-frame position, if inside the
    /// window.
    #[inline]
    pub fn index_of(&self, x: f64, y: f64) -> Option<usize> {
        self.raster.index_custom(x, y)
    }

    /// Override the flat/vertical variance threshold factor.
    pub fn set_variance_factor(&mut self, factor: f32) {
        self.config.variance_factor = factor;
    }

    /// Set the instant that cell timestamps are measured from.
    ///
    /// Timestamps are stored as f32 seconds in a raster band; measuring
    /// them from a recent base keeps them precise.
    pub fn set_time_base(&mut self, base: SystemTime) {
        self.time_base = base;
    }

    /// Install a sink receiving slide and tile events.
    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = sink;
    }

    pub(crate) fn emit(&mut self, event: TerrainEvent) {
        self.sink.emit(&event);
    }

    /// Seconds since the model's time base.
    pub(crate) fn reference_time(&self) -> f32 {
        self.time_base
            .elapsed()
            .map(|d| d.as_secs_f32())
            .unwrap_or(0.0)
    }

    /// Write all six raster bands from the cells and clear the dirty flag.
    pub fn sync_to_raster(&mut self) {
        write_cells(&mut self.raster, &self.cells);
        self.dirty = false;
    }

    /// The raster, synced first if it was stale.
    pub fn raster(&mut self) -> &GeoRaster {
        if self.dirty {
            self.sync_to_raster();
        }
        &self.raster
    }

    /// The raster as-is, possibly stale.
    pub fn raster_unsynced(&self) -> &GeoRaster {
        &self.raster
    }

    /// Persist all nine tiles of the current window.
    ///
    /// Useful as a shutdown checkpoint; a model recreated with the same
    /// configuration will restore them.
    pub fn save_all(&mut self) -> Result<()> {
        let mut scratch = Maplet::new(&self.raster, self.sub_width, self.sub_height);
        for sy in -1..=1 {
            for sx in -1..=1 {
                self.save_tile(&mut scratch, sx, sy)?;
            }
        }
        Ok(())
    }

    /// Fold another model's cells into this one by world position.
    ///
    /// Each of `other`'s non-empty cells is folded into the cell its UTM
    /// centre lands in; cells outside this window are skipped.
    pub fn merge_model(&mut self, other: &TerrainModel) {
        for py in 0..other.height {
            for px in 0..other.width {
                let src = &other.cells[py * other.width + px];
                if src.is_empty() {
                    continue;
                }
                let (ux, uy) = other
                    .raster
                    .point_pix2utm(px as f64 + 0.5, py as f64 + 0.5);
                if let Some(idx) = self.raster.index_utm(ux, uy) {
                    self.cells[idx].fold_cell(src);
                }
            }
        }
        self.dirty = true;
    }

    /// Export the mean elevation as grayscale image data.
    ///
    /// Returns (width, height, pixels). Empty cells map to 0; observed
    /// cells are scaled to 1..=255 between the lowest and highest mean.
    pub fn to_grayscale(&self) -> (usize, usize, Vec<u8>) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for cell in &self.cells {
            if !cell.is_empty() {
                lo = lo.min(cell.z_mean);
                hi = hi.max(cell.z_mean);
            }
        }

        let range = hi - lo;
        let pixels = self
            .cells
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    0u8
                } else if range <= f32::EPSILON {
                    128u8
                } else {
                    (1.0 + 254.0 * (cell.z_mean - lo) / range).round() as u8
                }
            })
            .collect();
        (self.width, self.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PointCloud;
    use crate::core::Point3D;

    fn small_config() -> TerrainConfig {
        TerrainConfig {
            size_x: 30.0,
            size_y: 30.0,
            scale: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_model_is_clean_and_empty() {
        let model = TerrainModel::new(small_config()).unwrap();
        assert_eq!(model.width(), 30);
        assert_eq!(model.sub_width(), 10);
        assert_eq!(model.current(), (0, 0));
        assert!(!model.is_dirty());
        assert!(model.cells().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_indivisible_window_is_rejected() {
        let config = TerrainConfig {
            size_x: 31.0,
            size_y: 30.0,
            scale: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            TerrainModel::new(config),
            Err(DtmError::Dimension(_))
        ));
    }

    #[test]
    fn test_sync_round_trips_through_raster() {
        let mut model = TerrainModel::new(small_config()).unwrap();
        let cloud = PointCloud::from_points(&[Point3D::new(5.5, 5.5, 2.0)]);
        model.merge_world(&cloud);
        assert!(model.is_dirty());

        let raster = model.raster().clone();
        assert!(!model.is_dirty());

        let reloaded = TerrainModel::from_raster(raster, small_config()).unwrap();
        assert_eq!(reloaded.cells(), model.cells());
    }

    #[test]
    fn test_from_raster_rejects_foreign_bands() {
        let raster = GeoRaster::with_layout(
            30,
            30,
            vec!["RED".into(), "GREEN".into(), "BLUE".into()],
        );
        assert!(matches!(
            TerrainModel::from_raster(raster, small_config()),
            Err(DtmError::BandMismatch(_))
        ));
    }

    #[test]
    fn test_merge_model_folds_by_world_position() {
        let mut a = TerrainModel::new(small_config()).unwrap();
        let mut b = TerrainModel::new(small_config()).unwrap();

        a.merge_world(&PointCloud::from_points(&[Point3D::new(3.5, 4.5, 1.0)]));
        b.merge_world(&PointCloud::from_points(&[Point3D::new(3.5, 4.5, 3.0)]));

        a.merge_model(&b);
        let idx = a.index_of(3.5, 4.5).unwrap();
        assert_eq!(a.cells()[idx].n_points, 2);
        assert_eq!(a.cells()[idx].z_min, 1.0);
        assert_eq!(a.cells()[idx].z_max, 3.0);
    }

    #[test]
    fn test_grayscale_export() {
        let mut model = TerrainModel::new(small_config()).unwrap();
        model.merge_world(&PointCloud::from_points(&[
            Point3D::new(1.5, 1.5, 0.0),
            Point3D::new(2.5, 1.5, 10.0),
        ]));

        let (w, h, pixels) = model.to_grayscale();
        assert_eq!(w, 30);
        assert_eq!(h, 30);
        assert_eq!(pixels[0], 0); // never observed
        assert_eq!(pixels[30 + 1], 1); // lowest mean
        assert_eq!(pixels[30 + 2], 255); // highest mean
    }
}

//! Tile (maplet) persistence.
//!
//! The active window is a 3x3 grid of tiles; each tile is one third of the
//! window in both dimensions. Tiles that scroll out of the window are
//! written as standalone raster files keyed by their integer world tile
//! coordinates, and read back when the window returns. Files are created
//! lazily on first save and never deleted here.

use std::path::PathBuf;

use crate::core::CellStats;
use crate::error::Result;
use crate::raster::GeoRaster;

use super::{read_cells, write_cells};

/// One third-of-window slab of cells, with the raster carrying its
/// geo-referencing. Reused as a scratch buffer across saves within one
/// slide.
pub struct Maplet {
    raster: GeoRaster,
    /// Cell statistics, row-major `width x height`.
    pub cells: Vec<CellStats>,
}

impl Maplet {
    /// Create an empty maplet inheriting band layout, scales and custom
    /// origin from `meta`.
    pub fn new(meta: &GeoRaster, width: usize, height: usize) -> Self {
        Self {
            raster: meta.copy_meta(width, height),
            cells: vec![CellStats::default(); width * height],
        }
    }

    /// Maplet width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.raster.width()
    }

    /// Maplet height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.raster.height()
    }

    /// The maplet's raster (synced only by [`TileStore::save`]).
    pub fn raster(&self) -> &GeoRaster {
        &self.raster
    }
}

/// Names, locates, reads and writes tile files.
#[derive(Debug, Clone)]
pub struct TileStore {
    dir: PathBuf,
    prefix: String,
}

impl TileStore {
    /// Create a store writing `<dir>/<prefix>.<tx>x<ty>.bhumi` files.
    pub fn new(dir: PathBuf, prefix: String) -> Self {
        Self { dir, prefix }
    }

    /// Deterministic path of the tile at world tile coordinates (tx, ty).
    pub fn tile_path(&self, tx: i32, ty: i32) -> PathBuf {
        self.dir.join(format!("{}.{}x{}.bhumi", self.prefix, tx, ty))
    }

    /// Has this tile ever been saved?
    pub fn exists(&self, tx: i32, ty: i32) -> bool {
        self.tile_path(tx, ty).exists()
    }

    /// Read a tile; `Ok(None)` if no file exists for these coordinates.
    pub fn load(&self, tx: i32, ty: i32) -> Result<Option<Maplet>> {
        let path = self.tile_path(tx, ty);
        if !path.exists() {
            return Ok(None);
        }
        let raster = GeoRaster::load(&path)?;
        let cells = read_cells(&raster)?;
        log::debug!("loaded tile {}x{} from {}", tx, ty, path.display());
        Ok(Some(Maplet { raster, cells }))
    }

    /// Write a maplet at world tile coordinates (tx, ty), placing its
    /// pixel origin at the given UTM position.
    pub fn save(&self, tx: i32, ty: i32, maplet: &mut Maplet, utm: (f64, f64)) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let (scale_x, scale_y) = (maplet.raster.scale_x(), maplet.raster.scale_y());
        maplet.raster.set_transform(utm.0, utm.1, scale_x, scale_y);
        write_cells(&mut maplet.raster, &maplet.cells);
        let path = self.tile_path(tx, ty);
        maplet.raster.save(&path)?;
        log::debug!("saved tile {}x{} to {}", tx, ty, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tile_path_is_deterministic() {
        let store = TileStore::new(PathBuf::from("/maps"), "dtm".to_string());
        assert_eq!(
            store.tile_path(-2, 7),
            PathBuf::from("/maps/dtm.-2x7.bhumi")
        );
    }

    #[test]
    fn test_load_missing_tile_is_none() {
        let dir = tempdir().unwrap();
        let store = TileStore::new(dir.path().to_path_buf(), "dtm".to_string());
        assert!(!store.exists(0, 0));
        assert!(store.load(0, 0).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = TileStore::new(dir.path().to_path_buf(), "dtm".to_string());

        let meta = GeoRaster::new(30, 30);
        let mut maplet = Maplet::new(&meta, 10, 10);
        maplet.cells[37].fold_point(2.5, 1.0);
        maplet.cells[37].fold_point(3.5, 2.0);

        store.save(4, -3, &mut maplet, (123.0, 456.0)).unwrap();
        assert!(store.exists(4, -3));

        let loaded = store.load(4, -3).unwrap().unwrap();
        assert_eq!(loaded.width(), 10);
        assert_eq!(loaded.height(), 10);
        assert_eq!(loaded.raster().utm_origin(), (123.0, 456.0));
        assert_eq!(loaded.cells[37].n_points, 2);
        assert_eq!(loaded.cells[37].z_min, 2.5);
        assert_eq!(loaded.cells[37].z_max, 3.5);
        assert!(loaded.cells[0].is_empty());
    }
}

//! Sliding-window management.
//!
//! The robot is free to roam the central square of the window (the middle
//! 50% in both axes). Once it leaves, the window steps by one tile toward
//! it: the trailing third(s) of the grid are written to disk, the grid
//! contents shift in memory, the window origin advances, and any
//! previously saved tiles on the leading edge are read back.
//!
//! Ordering within one slide: save strictly precedes the shift, the shift
//! precedes the origin update, and the origin update precedes the loads.
//! A failed save propagates before any in-memory mutation, so the window
//! stays consistent with what is on disk. A failed load is logged and
//! leaves the scrolled-in region empty, as if no tile file existed.

use crate::core::CellStats;
use crate::error::Result;

use super::tile::Maplet;
use super::{TerrainEvent, TerrainModel};

/// Tile offsets that scroll out of the window for a step of (dx, dy),
/// relative to the centre tile before the move. Negating each offset
/// yields the tiles that scroll in, relative to the centre after the
/// move.
fn trailing_offsets(dx: i32, dy: i32) -> Vec<(i32, i32)> {
    let mut offsets = Vec::with_capacity(5);
    if dx != 0 {
        for sy in -1..=1 {
            offsets.push((-dx, sy));
        }
        if dy != 0 {
            for sx in -1..=1 {
                if sx != -dx {
                    offsets.push((sx, -dy));
                }
            }
        }
    } else if dy != 0 {
        for sx in -1..=1 {
            offsets.push((sx, -dy));
        }
    }
    offsets
}

impl TerrainModel {
    /// Slide the window so the robot ends up in the central square.
    ///
    /// `robot_x`, `robot_y` are the robot position in the custom frame.
    /// Returns `true` if the window moved. Without a move there is no
    /// file I/O and the window origin is untouched.
    pub fn slide_to(&mut self, robot_x: f64, robot_y: f64) -> Result<bool> {
        let (px, py) = self.raster.point_custom2pix(robot_x, robot_y);
        let cx = px / self.width as f64;
        let cy = py / self.height as f64;
        if cx > 0.25 && cx < 0.75 && cy > 0.25 && cy < 0.75 {
            return Ok(false); // robot is in the centre square
        }

        let dx = if cx < 0.33 {
            -1
        } else if cx > 0.66 {
            1
        } else {
            0
        };
        let dy = if cy < 0.33 {
            -1
        } else if cy > 0.66 {
            1
        } else {
            0
        };

        // Classification state is window-relative; it does not survive a
        // move.
        self.ground_cells.fill(CellStats::default());
        self.vertical.fill(false);

        let offsets = trailing_offsets(dx, dy);

        let mut scratch = Maplet::new(&self.raster, self.sub_width, self.sub_height);
        for &(sx, sy) in &offsets {
            self.save_tile(&mut scratch, sx, sy)?;
        }

        self.shift(dx, dy);

        self.current.0 += dx;
        self.current.1 += dy;

        for &(sx, sy) in &offsets {
            self.load_tile(-sx, -sy);
        }

        let sw = self.sub_width as i32;
        let sh = self.sub_height as i32;
        let (utm_x, utm_y) = self
            .raster
            .point_pix2utm((dx * sw) as f64, (dy * sh) as f64);
        let (scale_x, scale_y) = (self.raster.scale_x(), self.raster.scale_y());
        self.raster.set_transform(utm_x, utm_y, scale_x, scale_y);
        self.dirty = true;

        self.emit(TerrainEvent::Slide {
            dx,
            dy,
            tile_x: self.current.0,
            tile_y: self.current.1,
            utm_x,
            utm_y,
        });
        Ok(true)
    }

    /// Write the tile at window offset (sx, sy) to disk, using `scratch`
    /// as the staging maplet.
    pub(crate) fn save_tile(&mut self, scratch: &mut Maplet, sx: i32, sy: i32) -> Result<()> {
        self.extract_region(sx, sy, &mut scratch.cells);
        let utm = self.raster.point_pix2utm(
            ((sx + 1) * self.sub_width as i32) as f64,
            ((sy + 1) * self.sub_height as i32) as f64,
        );
        let (tile_x, tile_y) = (self.current.0 + sx, self.current.1 + sy);
        self.tiles.save(tile_x, tile_y, scratch, utm)?;
        self.emit(TerrainEvent::TileSaved { tile_x, tile_y });
        Ok(())
    }

    /// Read the tile at window offset (sx, sy) into the window, if its
    /// file exists. Read failures are logged and leave the region empty.
    pub(crate) fn load_tile(&mut self, sx: i32, sy: i32) {
        let (tile_x, tile_y) = (self.current.0 + sx, self.current.1 + sy);
        match self.tiles.load(tile_x, tile_y) {
            Ok(None) => {}
            Ok(Some(maplet)) => {
                if maplet.width() != self.sub_width || maplet.height() != self.sub_height {
                    log::warn!(
                        "tile {}x{} has dimensions {}x{}, expected {}x{}; ignored",
                        tile_x,
                        tile_y,
                        maplet.width(),
                        maplet.height(),
                        self.sub_width,
                        self.sub_height
                    );
                    return;
                }
                self.paste_region(sx, sy, &maplet.cells);
                self.dirty = true;
                self.emit(TerrainEvent::TileLoaded { tile_x, tile_y });
            }
            Err(e) => {
                log::warn!("failed to load tile {}x{}: {}", tile_x, tile_y, e);
            }
        }
    }

    /// Copy the window region of tile offset (sx, sy) into `out`.
    fn extract_region(&self, sx: i32, sy: i32, out: &mut [CellStats]) {
        let sw = self.sub_width;
        let col0 = (sx + 1) as usize * sw;
        let row0 = (sy + 1) as usize * self.sub_height;
        for row in 0..self.sub_height {
            let src = (row0 + row) * self.width + col0;
            out[row * sw..(row + 1) * sw].copy_from_slice(&self.cells[src..src + sw]);
        }
    }

    /// Paste `cells` into the window region of tile offset (sx, sy).
    fn paste_region(&mut self, sx: i32, sy: i32, cells: &[CellStats]) {
        let sw = self.sub_width;
        let col0 = (sx + 1) as usize * sw;
        let row0 = (sy + 1) as usize * self.sub_height;
        for row in 0..self.sub_height {
            let dst = (row0 + row) * self.width + col0;
            self.cells[dst..dst + sw].copy_from_slice(&cells[row * sw..(row + 1) * sw]);
        }
    }

    /// Move the grid contents opposite to the robot's motion and clear
    /// the vacated third(s).
    fn shift(&mut self, dx: i32, dy: i32) {
        let width = self.width;
        let sw = self.sub_width;
        let empty = CellStats::default();

        match dx {
            -1 => {
                for row in 0..self.height {
                    let start = row * width;
                    self.cells.copy_within(start..start + 2 * sw, start + sw);
                    self.cells[start..start + sw].fill(empty);
                }
            }
            1 => {
                for row in 0..self.height {
                    let start = row * width;
                    self.cells.copy_within(start + sw..start + width, start);
                    self.cells[start + 2 * sw..start + width].fill(empty);
                }
            }
            _ => {}
        }

        let band = self.sub_height * width;
        let len = self.cells.len();
        match dy {
            -1 => {
                self.cells.copy_within(0..len - band, band);
                self.cells[..band].fill(empty);
            }
            1 => {
                self.cells.copy_within(band..len, 0);
                self.cells[len - band..].fill(empty);
            }
            _ => {}
        }
    }
}

//! Geo-referenced raster backend.
//!
//! A [`GeoRaster`] holds six parallel float bands over a `width x height`
//! pixel grid, plus the affine transform that places the grid in the UTM
//! world frame. Robot-local ("custom") coordinates are UTM coordinates
//! relative to a configurable custom origin, so sensor data keeps small
//! magnitudes while the raster stays geo-referenced.
//!
//! Coordinate chains:
//!
//! ```text
//! custom (x, y) --+custom origin--> utm (ux, uy) --transform--> pixel (px, py)
//! pixel (px, py) --transform--> utm:  ux = utm_x + px * scale_x
//! ```

mod format;

pub use format::{read_raster, write_raster};

use std::path::Path;

use crate::error::{DtmError, Result};

/// Names of the six raster bands, in band order.
pub const BAND_NAMES: [&str; 6] = [
    "N_POINTS",
    "Z_MAX",
    "Z_MIN",
    "Z_MEAN",
    "VARIANCE",
    "LAST_UPDATE",
];

/// Band indices of the terrain raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Band {
    /// Observation count
    NPoints = 0,
    /// Maximum observed z
    ZMax = 1,
    /// Minimum observed z
    ZMin = 2,
    /// Mean of observed z
    ZMean = 3,
    /// Sum of squared deviations (sample variance on export)
    Variance = 4,
    /// Timestamp of last modification
    LastUpdate = 5,
}

impl Band {
    /// Number of bands.
    pub const COUNT: usize = 6;

    /// All bands in band order.
    pub fn all() -> [Band; Band::COUNT] {
        [
            Band::NPoints,
            Band::ZMax,
            Band::ZMin,
            Band::ZMean,
            Band::Variance,
            Band::LastUpdate,
        ]
    }

    /// Canonical band name.
    pub fn name(self) -> &'static str {
        BAND_NAMES[self as usize]
    }
}

/// Geo-referenced multi-band raster.
///
/// Pixel (0, 0) is the top-left corner; storage is row-major
/// (`index = py * width + px`).
#[derive(Debug, Clone)]
pub struct GeoRaster {
    width: usize,
    height: usize,
    names: Vec<String>,
    bands: Vec<Vec<f32>>,
    /// UTM coordinates of pixel (0, 0).
    utm_x: f64,
    utm_y: f64,
    /// Pixel size in meters.
    scale_x: f64,
    scale_y: f64,
    /// UTM coordinates of the custom-frame origin.
    custom_x: f64,
    custom_y: f64,
}

impl GeoRaster {
    /// Create a zeroed raster with the standard six bands and unit scale.
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_layout(
            width,
            height,
            BAND_NAMES.iter().map(|n| n.to_string()).collect(),
        )
    }

    /// Create a zeroed raster with explicit band names (used by file loading).
    pub(crate) fn with_layout(width: usize, height: usize, names: Vec<String>) -> Self {
        let bands = names.iter().map(|_| vec![0.0; width * height]).collect();
        Self {
            width,
            height,
            names,
            bands,
            utm_x: 0.0,
            utm_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            custom_x: 0.0,
            custom_y: 0.0,
        }
    }

    /// Raster width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raster height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Band names, in band order.
    pub fn band_names(&self) -> &[String] {
        &self.names
    }

    /// Does this raster carry exactly the six standard bands, in order?
    pub fn has_standard_bands(&self) -> bool {
        self.names.len() == BAND_NAMES.len()
            && self.names.iter().zip(BAND_NAMES.iter()).all(|(a, b)| a == b)
    }

    /// Read access to a band.
    #[inline]
    pub fn band(&self, band: Band) -> &[f32] {
        &self.bands[band as usize]
    }

    /// Write access to a band.
    #[inline]
    pub fn band_mut(&mut self, band: Band) -> &mut [f32] {
        &mut self.bands[band as usize]
    }

    pub(crate) fn band_raw(&self, index: usize) -> &[f32] {
        &self.bands[index]
    }

    pub(crate) fn band_raw_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.bands[index]
    }

    /// Pixel size along x in meters.
    #[inline]
    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    /// Pixel size along y in meters.
    #[inline]
    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    /// UTM coordinates of pixel (0, 0).
    #[inline]
    pub fn utm_origin(&self) -> (f64, f64) {
        (self.utm_x, self.utm_y)
    }

    /// UTM coordinates of the custom-frame origin.
    #[inline]
    pub fn custom_origin(&self) -> (f64, f64) {
        (self.custom_x, self.custom_y)
    }

    /// Place pixel (0, 0) at the given UTM position with the given scales.
    pub fn set_transform(&mut self, utm_x: f64, utm_y: f64, scale_x: f64, scale_y: f64) {
        self.utm_x = utm_x;
        self.utm_y = utm_y;
        self.scale_x = scale_x;
        self.scale_y = scale_y;
    }

    /// Set the UTM position of the custom-frame origin.
    pub fn set_custom_origin(&mut self, custom_x: f64, custom_y: f64) {
        self.custom_x = custom_x;
        self.custom_y = custom_y;
    }

    /// Custom frame to UTM.
    #[inline]
    pub fn point_custom2utm(&self, x: f64, y: f64) -> (f64, f64) {
        (x + self.custom_x, y + self.custom_y)
    }

    /// UTM to floating-point pixel coordinates.
    #[inline]
    pub fn point_utm2pix(&self, ux: f64, uy: f64) -> (f64, f64) {
        ((ux - self.utm_x) / self.scale_x, (uy - self.utm_y) / self.scale_y)
    }

    /// Custom frame to floating-point pixel coordinates.
    #[inline]
    pub fn point_custom2pix(&self, x: f64, y: f64) -> (f64, f64) {
        let (ux, uy) = self.point_custom2utm(x, y);
        self.point_utm2pix(ux, uy)
    }

    /// Pixel coordinates to UTM.
    #[inline]
    pub fn point_pix2utm(&self, px: f64, py: f64) -> (f64, f64) {
        (self.utm_x + px * self.scale_x, self.utm_y + py * self.scale_y)
    }

    fn index_pix(&self, px: f64, py: f64) -> Option<usize> {
        let cx = px.floor();
        let cy = py.floor();
        if cx >= 0.0 && cy >= 0.0 {
            let cx = cx as usize;
            let cy = cy as usize;
            if cx < self.width && cy < self.height {
                return Some(cy * self.width + cx);
            }
        }
        None
    }

    /// Row-major cell index for a custom-frame position.
    ///
    /// Returns `None` if the position falls outside the raster.
    #[inline]
    pub fn index_custom(&self, x: f64, y: f64) -> Option<usize> {
        let (px, py) = self.point_custom2pix(x, y);
        self.index_pix(px, py)
    }

    /// Row-major cell index for a UTM position.
    ///
    /// Returns `None` if the position falls outside the raster.
    #[inline]
    pub fn index_utm(&self, ux: f64, uy: f64) -> Option<usize> {
        let (px, py) = self.point_utm2pix(ux, uy);
        self.index_pix(px, py)
    }

    /// Create a zeroed raster of different dimensions carrying this
    /// raster's band layout, scales and origins.
    pub fn copy_meta(&self, width: usize, height: usize) -> GeoRaster {
        let mut out = GeoRaster::with_layout(width, height, self.names.clone());
        out.set_transform(self.utm_x, self.utm_y, self.scale_x, self.scale_y);
        out.set_custom_origin(self.custom_x, self.custom_y);
        out
    }

    /// Save the raster to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        format::write_raster(self, &mut writer)
    }

    /// Load a raster from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GeoRaster> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        format::read_raster(&mut reader)
    }
}

/// Check that a raster's dimensions can host a 3x3 tile window.
pub(crate) fn check_window_dims(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 || width % 3 != 0 || height % 3 != 0 {
        return Err(DtmError::Dimension(format!(
            "window must be non-empty and divisible by 3, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

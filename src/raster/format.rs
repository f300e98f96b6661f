//! Native .bhumi binary format for raster persistence.
//!
//! Format:
//! - Header (64 bytes):
//!   - Magic: "BHUMI" (5 bytes)
//!   - Version: u8 (1 byte)
//!   - Width: u32 (4 bytes, little-endian)
//!   - Height: u32 (4 bytes, little-endian)
//!   - Band count: u8 (1 byte)
//!   - Reserved: 1 byte
//!   - Scale X, Scale Y: f64 (16 bytes, little-endian)
//!   - UTM origin X, Y: f64 (16 bytes, little-endian)
//!   - Custom origin X, Y: f64 (16 bytes, little-endian)
//! - Band names: per band, u8 length + UTF-8 bytes
//! - Band data: per band, width * height f32 (little-endian), row-major

use std::io::{Read, Write};

use super::GeoRaster;
use crate::error::{DtmError, Result};

/// Magic bytes for the .bhumi format
const MAGIC: &[u8; 5] = b"BHUMI";

/// Current format version
const VERSION: u8 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Write a raster to a writer in .bhumi format.
pub fn write_raster<W: Write>(raster: &GeoRaster, writer: &mut W) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE];

    header[0..5].copy_from_slice(MAGIC);
    header[5] = VERSION;
    header[6..10].copy_from_slice(&(raster.width() as u32).to_le_bytes());
    header[10..14].copy_from_slice(&(raster.height() as u32).to_le_bytes());
    header[14] = raster.band_names().len() as u8;
    // header[15] reserved
    header[16..24].copy_from_slice(&raster.scale_x().to_le_bytes());
    header[24..32].copy_from_slice(&raster.scale_y().to_le_bytes());
    let (utm_x, utm_y) = raster.utm_origin();
    header[32..40].copy_from_slice(&utm_x.to_le_bytes());
    header[40..48].copy_from_slice(&utm_y.to_le_bytes());
    let (custom_x, custom_y) = raster.custom_origin();
    header[48..56].copy_from_slice(&custom_x.to_le_bytes());
    header[56..64].copy_from_slice(&custom_y.to_le_bytes());

    writer.write_all(&header)?;

    for name in raster.band_names() {
        let bytes = name.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(DtmError::Format(format!("band name too long: {}", name)));
        }
        writer.write_all(&[bytes.len() as u8])?;
        writer.write_all(bytes)?;
    }

    let mut buffer = Vec::with_capacity(raster.width() * raster.height() * 4);
    for band in 0..raster.band_names().len() {
        buffer.clear();
        for &value in raster.band_raw(band) {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        writer.write_all(&buffer)?;
    }

    Ok(())
}

/// Read a raster from a reader in .bhumi format.
pub fn read_raster<R: Read>(reader: &mut R) -> Result<GeoRaster> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    if &header[0..5] != MAGIC {
        return Err(DtmError::Format("invalid magic bytes".to_string()));
    }

    let version = header[5];
    if version != VERSION {
        return Err(DtmError::Version {
            expected: VERSION,
            found: version,
        });
    }

    let width = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let height = u32::from_le_bytes([header[10], header[11], header[12], header[13]]) as usize;
    let band_count = header[14] as usize;
    if width == 0 || height == 0 || band_count == 0 {
        return Err(DtmError::Format(format!(
            "degenerate raster: {}x{} with {} bands",
            width, height, band_count
        )));
    }

    let scale_x = f64::from_le_bytes(header[16..24].try_into().unwrap());
    let scale_y = f64::from_le_bytes(header[24..32].try_into().unwrap());
    let utm_x = f64::from_le_bytes(header[32..40].try_into().unwrap());
    let utm_y = f64::from_le_bytes(header[40..48].try_into().unwrap());
    let custom_x = f64::from_le_bytes(header[48..56].try_into().unwrap());
    let custom_y = f64::from_le_bytes(header[56..64].try_into().unwrap());

    let mut names = Vec::with_capacity(band_count);
    for _ in 0..band_count {
        let mut len = [0u8; 1];
        reader.read_exact(&mut len)?;
        let mut name = vec![0u8; len[0] as usize];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| DtmError::Format("band name is not valid UTF-8".to_string()))?;
        names.push(name);
    }

    let mut raster = GeoRaster::with_layout(width, height, names);
    raster.set_transform(utm_x, utm_y, scale_x, scale_y);
    raster.set_custom_origin(custom_x, custom_y);

    let mut buffer = vec![0u8; width * height * 4];
    for band in 0..band_count {
        reader.read_exact(&mut buffer)?;
        let values = raster.band_raw_mut(band);
        for (i, chunk) in buffer.chunks_exact(4).enumerate() {
            values[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    Ok(raster)
}

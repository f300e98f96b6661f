//! Error types for bhumi-dtm.

use thiserror::Error;

/// Errors reported by the terrain model and its raster backend.
#[derive(Error, Debug)]
pub enum DtmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid raster format: {0}")]
    Format(String),

    #[error("unsupported raster version: expected {expected}, found {found}")]
    Version { expected: u8, found: u8 },

    #[error("band layout mismatch: {0}")]
    BandMismatch(String),

    #[error("invalid dimensions: {0}")]
    Dimension(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for DtmError {
    fn from(e: toml::de::Error) -> Self {
        DtmError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DtmError>;

//! Model events and the sink they are reported through.
//!
//! The model never owns a log file or global stream; callers that want a
//! slide journal install their own [`EventSink`]. The default sink simply
//! forwards to the `log` facade.

/// Something the terrain model did that callers may want to journal.
#[derive(Debug, Clone, PartialEq)]
pub enum TerrainEvent {
    /// The window moved by (dx, dy) tiles.
    Slide {
        /// Tile step along x (-1, 0 or 1)
        dx: i32,
        /// Tile step along y (-1, 0 or 1)
        dy: i32,
        /// Tile coordinate of the window centre after the move
        tile_x: i32,
        /// Tile coordinate of the window centre after the move
        tile_y: i32,
        /// UTM easting of the window's top-left pixel after the move
        utm_x: f64,
        /// UTM northing of the window's top-left pixel after the move
        utm_y: f64,
    },
    /// A tile was written to disk.
    TileSaved {
        /// World tile coordinate
        tile_x: i32,
        /// World tile coordinate
        tile_y: i32,
    },
    /// A tile was read from disk into the window.
    TileLoaded {
        /// World tile coordinate
        tile_x: i32,
        /// World tile coordinate
        tile_y: i32,
    },
}

/// Receiver for [`TerrainEvent`]s.
pub trait EventSink {
    /// Called for every event, in order of occurrence.
    fn emit(&mut self, event: &TerrainEvent);
}

/// Default sink: forwards events to `log::debug!`.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &TerrainEvent) {
        log::debug!("terrain event: {:?}", event);
    }
}

//! Error types for the elevation crate.

use mbtiles_store::StoreError;
use thiserror::Error;

/// Errors that can occur when working with elevation tiles.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// Opening or reading the underlying tile store failed.
    #[error("Tile store error: {0}")]
    Store(#[from] StoreError),

    /// The decoded image cannot be turned into a heightfield.
    #[error("Cannot convert image to heightfield: {0}")]
    Conversion(String),

    /// Coordinate is outside the extent of the heightfield.
    #[error("Coordinate ({x}, {y}) is outside heightfield extent ({xmin}-{xmax}, {ymin}-{ymax})")]
    OutOfBounds {
        /// Requested x (longitude or easting).
        x: f64,
        /// Requested y (latitude or northing).
        y: f64,
        /// Extent western edge.
        xmin: f64,
        /// Extent eastern edge.
        xmax: f64,
        /// Extent southern edge.
        ymin: f64,
        /// Extent northern edge.
        ymax: f64,
    },

    /// A sample needed for the query holds the no-data value.
    #[error("No elevation data at ({x}, {y})")]
    NoData {
        /// Requested x.
        x: f64,
        /// Requested y.
        y: f64,
    },
}

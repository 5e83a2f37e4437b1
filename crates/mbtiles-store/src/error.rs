//! Error types for the tile store.

use std::fmt;
use thiserror::Error;

/// Coarse status of a failed store operation.
///
/// Open-time failures are reported to the tiled-layer framework as one of
/// these codes plus the error's reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Required input is missing for the requested mode.
    ConfigurationError,
    /// A named capability (codec, compressor) cannot be resolved.
    ServiceUnavailable,
    /// The underlying database cannot be reached or opened.
    ResourceUnavailable,
    /// Any other failure.
    GeneralError,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::ConfigurationError => write!(f, "configuration error"),
            StatusCode::ServiceUnavailable => write!(f, "service unavailable"),
            StatusCode::ResourceUnavailable => write!(f, "resource unavailable"),
            StatusCode::GeneralError => write!(f, "general error"),
        }
    }
}

/// Errors that can occur when opening or accessing a tile store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Required configuration is missing for the requested open mode.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A codec or compressor could not be resolved.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The database could not be opened.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// SQLite error on an already opened connection.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tile coordinates do not exist in the store's tiling scheme.
    #[error("Tile z={zoom} x={column} y={row} is outside the tiling scheme")]
    InvalidTileKey {
        /// Zoom level.
        zoom: u32,
        /// Column.
        column: u32,
        /// Row, in the caller's convention.
        row: u32,
    },

    /// A write was attempted on a store opened read-only.
    #[error("Store was opened read-only")]
    ReadOnly,

    /// Encoding or compressing a tile for writing failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl StoreError {
    /// Status code reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::Configuration(_) => StatusCode::ConfigurationError,
            StoreError::ServiceUnavailable(_) => StatusCode::ServiceUnavailable,
            StoreError::ResourceUnavailable(_) => StatusCode::ResourceUnavailable,
            _ => StatusCode::GeneralError,
        }
    }
}

/// Errors raised by image codecs and compressors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload could not be decoded into an image.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Image could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Payload could not be decompressed.
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Payload could not be compressed.
    #[error("Compression failed: {0}")]
    Compress(String),

    /// The image layout is not supported by this codec.
    #[error("Unsupported image layout: {0}")]
    Unsupported(String),
}

//! # mbtiles-store
//!
//! Tile storage engine for MBTiles files: raster tiles addressed by
//! (zoom, column, row) in a SQLite database, plus a metadata table that
//! records the file's profile, tile format, compression and bounds.
//!
//! ## Overview
//!
//! - [`MbTilesStore::open`] runs the open protocol: it creates and
//!   initializes a new file, or reads an existing file's metadata and
//!   reconciles it with the caller's [`StoreConfig`].
//! - [`MbTilesStore::fetch_tile`] reads a tile, flips its row into the
//!   file's south-up convention, decompresses and decodes it.
//! - Codecs and compressors are looked up in a [`CodecRegistry`] passed in
//!   by the caller.
//!
//! ## Example
//!
//! ```no_run
//! use mbtiles_store::{CodecRegistry, MbTilesStore, StoreConfig, TileKey};
//!
//! let registry = CodecRegistry::with_defaults();
//! let config = StoreConfig::new("world.mbtiles").with_compute_levels(true);
//! let store = MbTilesStore::open(&config, &registry)?;
//!
//! if let Some(tile) = store.fetch_tile(&TileKey::new(3, 4, 2)) {
//!     println!("{}x{} tile covering {}", tile.image.width(), tile.image.height(), tile.extent);
//! }
//! # Ok::<(), mbtiles_store::StoreError>(())
//! ```

pub mod bootstrap;
pub mod codec;
mod config;
pub mod connection;
mod error;
mod image;
pub mod metadata;
mod pipeline;
mod profile;
pub mod schema;
mod store;
pub mod tiles;

pub use bootstrap::{BootstrapState, DEFAULT_MAX_LEVEL, DEFAULT_MIN_LEVEL};
pub use codec::{CodecRegistry, Compressor, ImageCodec, TiffCodec, ZlibCompressor};
pub use config::StoreConfig;
pub use error::{CodecError, StatusCode, StoreError};
pub use image::{PixelFormat, RasterImage, Samples, DEFAULT_TILE_SIZE};
pub use pipeline::TilePipeline;
pub use profile::{
    DataExtent, GeoExtent, Profile, ProfileDescriptor, Srs, TileKey, DEFAULT_PROFILE_NAME,
};
pub use store::{GeoImage, MbTilesStore};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

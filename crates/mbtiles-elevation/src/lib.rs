//! # mbtiles-elevation
//!
//! Elevation data served from MBTiles files whose tiles are elevation
//! rasters (for example single-channel float TIFFs).
//!
//! ## Overview
//!
//! [`ElevationStore`] wraps an opened [`mbtiles_store::MbTilesStore`]. Each
//! request fetches the decoded tile image and hands it to a
//! [`HeightFieldConverter`], producing a [`GeoHeightField`] that covers the
//! tile's extent. Missing tiles stay missing; nothing is retried.
//!
//! The default converter, [`ImageToHeightField`], reads the first channel
//! of every pixel as a height in meters.
//!
//! ## Example
//!
//! ```no_run
//! use mbtiles_elevation::ElevationStore;
//! use mbtiles_store::{CodecRegistry, StoreConfig, TileKey};
//!
//! // Geodetic tiles, so sample coordinates are degrees.
//! let config = StoreConfig::new("dem.mbtiles")
//!     .with_profile("global-geodetic")
//!     .with_coverage(true);
//! let dem = ElevationStore::open_default(&config, &CodecRegistry::with_defaults())?;
//!
//! if let Some(field) = dem.get_elevation(&TileKey::new(8, 81, 60)) {
//!     let (lon, lat) = (-122.5, 47.5);
//!     println!("Elevation: {} meters", field.elevation_at(lon, lat)?);
//! }
//! # Ok::<(), mbtiles_elevation::ElevationError>(())
//! ```

mod adapter;
mod error;
mod heightfield;

pub use adapter::ElevationStore;
pub use error::ElevationError;
pub use heightfield::{GeoHeightField, HeightField, HeightFieldConverter, ImageToHeightField};

/// Result type for elevation operations.
pub type Result<T> = std::result::Result<T, ElevationError>;

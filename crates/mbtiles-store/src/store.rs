//! The opened tile store.

use crate::bootstrap::{Bootstrap, OpenedStore};
use crate::codec::CodecRegistry;
use crate::config::StoreConfig;
use crate::connection::ConnectionHandle;
use crate::image::RasterImage;
use crate::pipeline::TilePipeline;
use crate::profile::{DataExtent, GeoExtent, Profile, TileKey};
use crate::{metadata, schema, tiles, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// A decoded tile together with the extent it covers.
#[derive(Debug, Clone)]
pub struct GeoImage {
    /// Decoded pixels. Shared when the tile is the empty sentinel.
    pub image: Arc<RasterImage>,
    /// Extent of the tile in the store profile's spatial reference.
    pub extent: GeoExtent,
}

/// An MBTiles file opened for tile access.
///
/// All database access is serialized through one connection, so the store
/// can be shared freely between threads behind an `Arc`.
#[derive(Debug)]
pub struct MbTilesStore {
    db: ConnectionHandle,
    profile: Profile,
    format: String,
    pipeline: TilePipeline,
    min_level: u32,
    max_level: u32,
    data_extents: Vec<DataExtent>,
    requires_rgb: bool,
    empty_tile: Arc<RasterImage>,
}

impl MbTilesStore {
    /// Open or create the store described by `config`.
    ///
    /// Failures are terminal; [`crate::StoreError::status`] classifies them.
    pub fn open(config: &StoreConfig, registry: &CodecRegistry) -> Result<Self> {
        let opened = Bootstrap::new(config, registry).run()?;
        Ok(Self::from_opened(opened))
    }

    fn from_opened(opened: OpenedStore) -> Self {
        let OpenedStore {
            layout,
            requires_rgb,
            empty_tile,
        } = opened;
        Self {
            db: layout.db,
            profile: layout.profile,
            format: layout.format,
            pipeline: layout.pipeline,
            min_level: layout.min_level,
            max_level: layout.max_level,
            data_extents: layout.data_extents,
            requires_rgb,
            empty_tile,
        }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// Effective profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Tile payload format.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Name of the payload compressor, if any.
    pub fn compression(&self) -> Option<&str> {
        self.pipeline.compressor().map(|c| c.name())
    }

    /// Coarsest zoom level served from the file.
    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    /// Finest zoom level served from the file.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Declared coverage of the file.
    pub fn data_extents(&self) -> &[DataExtent] {
        &self.data_extents
    }

    /// Whether written tiles are stripped to three channels.
    pub fn requires_rgb(&self) -> bool {
        self.requires_rgb
    }

    /// Whether decoded tiles are tagged as raw samples.
    pub fn is_coverage(&self) -> bool {
        self.pipeline.is_coverage()
    }

    /// The sentinel image returned below the minimum level.
    pub fn empty_tile(&self) -> &Arc<RasterImage> {
        &self.empty_tile
    }

    /// Fetch and decode a tile.
    ///
    /// Below the minimum level this is the transparent sentinel; above the
    /// maximum level, for missing tiles, and for unreadable payloads it is
    /// `None`.
    pub fn fetch_tile(&self, key: &TileKey) -> Option<GeoImage> {
        let extent = self.profile.tile_extent(key);

        if key.z < self.min_level {
            return Some(GeoImage {
                image: Arc::clone(&self.empty_tile),
                extent,
            });
        }
        if key.z > self.max_level {
            return None;
        }

        let data = match self.get_tile(key) {
            Ok(data) => data?,
            Err(e) => {
                warn!("Failed to read tile {}: {}", key, e);
                return None;
            }
        };

        self.pipeline.decode(&data).map(|image| GeoImage {
            image: Arc::new(image),
            extent,
        })
    }

    /// Stored payload of a tile, without decoding.
    pub fn get_tile(&self, key: &TileKey) -> Result<Option<Vec<u8>>> {
        tiles::get_tile(&self.db, &self.profile, key)
    }

    /// Store a raw payload. The payload must already be encoded (and
    /// compressed, if the store is compressed).
    pub fn put_tile(&self, key: &TileKey, data: &[u8]) -> Result<()> {
        self.db.ensure_writable()?;
        tiles::put_tile(&self.db, &self.profile, key, data)
    }

    /// Encode, compress and store an image.
    pub fn put_image(&self, key: &TileKey, image: &RasterImage) -> Result<()> {
        self.db.ensure_writable()?;
        let data = if self.requires_rgb {
            self.pipeline.encode(&image.without_alpha())?
        } else {
            self.pipeline.encode(image)?
        };
        tiles::put_tile(&self.db, &self.profile, key, &data)
    }

    /// Look up a metadata value.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        metadata::get_metadata(&self.db, key)
    }

    /// Insert or replace a metadata value.
    pub fn put_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.db.ensure_writable()?;
        metadata::put_metadata(&self.db, key, value)
    }

    /// All metadata entries.
    pub fn list_metadata(&self) -> Result<Vec<(String, String)>> {
        metadata::list_metadata(&self.db)
    }

    /// Create any missing tables and indexes.
    pub fn ensure_schema(&self) -> Result<()> {
        self.db.ensure_writable()?;
        schema::ensure_schema(&self.db)
    }

    /// Min/max zoom actually present in the tile table.
    pub fn stored_levels(&self) -> Result<Option<(u32, u32)>> {
        tiles::compute_levels(&self.db)
    }

    /// Number of stored tiles.
    pub fn tile_count(&self) -> Result<u64> {
        tiles::tile_count(&self.db)
    }
}

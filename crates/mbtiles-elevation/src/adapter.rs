//! Elevation access on top of an image tile store.

use crate::heightfield::{GeoHeightField, HeightFieldConverter, ImageToHeightField};
use crate::Result;
use mbtiles_store::{CodecRegistry, MbTilesStore, Profile, StoreConfig, TileKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serves heightfields from an MBTiles file of elevation rasters.
pub struct ElevationStore {
    store: MbTilesStore,
    converter: Arc<dyn HeightFieldConverter>,
}

impl ElevationStore {
    /// Open the underlying store and convert its tiles with `converter`.
    pub fn open(
        config: &StoreConfig,
        registry: &CodecRegistry,
        converter: Arc<dyn HeightFieldConverter>,
    ) -> Result<Self> {
        let store = MbTilesStore::open(config, registry)?;
        info!(
            "Opened elevation store {} (levels {}-{})",
            store.path().display(),
            store.min_level(),
            store.max_level()
        );
        Ok(Self::with_converter(store, converter))
    }

    /// Open with the default first-channel converter.
    pub fn open_default(config: &StoreConfig, registry: &CodecRegistry) -> Result<Self> {
        Self::open(config, registry, Arc::new(ImageToHeightField::default()))
    }

    /// Wrap an already opened store.
    pub fn with_converter(store: MbTilesStore, converter: Arc<dyn HeightFieldConverter>) -> Self {
        Self { store, converter }
    }

    /// The wrapped image store.
    pub fn store(&self) -> &MbTilesStore {
        &self.store
    }

    /// Profile of the wrapped store.
    pub fn profile(&self) -> &Profile {
        self.store.profile()
    }

    /// Fetch a tile and convert it to a heightfield.
    ///
    /// `None` when the image store has no tile for `key` or the image
    /// cannot be converted.
    pub fn get_elevation(&self, key: &TileKey) -> Option<GeoHeightField> {
        let tile = self.store.fetch_tile(key)?;
        match self.converter.convert(&tile.image) {
            Ok(heightfield) => {
                debug!("Converted tile {} to heightfield", key);
                Some(GeoHeightField::new(heightfield, tile.extent))
            }
            Err(e) => {
                warn!("Tile {}: {}", key, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for ElevationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElevationError, HeightField};
    use mbtiles_store::{RasterImage, StatusCode};

    fn scratch_store(dir: &tempfile::TempDir) -> MbTilesStore {
        let config = StoreConfig::new(dir.path().join("dem.mbtiles"))
            .for_writing()
            .with_profile("global-geodetic")
            .with_format("tif")
            .with_coverage(true);
        MbTilesStore::open(&config, &CodecRegistry::with_defaults()).unwrap()
    }

    #[test]
    fn test_missing_tile_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let elevation = ElevationStore::with_converter(
            scratch_store(&dir),
            Arc::new(ImageToHeightField::default()),
        );
        assert!(elevation.get_elevation(&TileKey::new(1, 0, 0)).is_none());
    }

    #[test]
    fn test_converter_failure_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);
        let key = TileKey::new(0, 0, 0);
        store
            .put_image(&key, &RasterImage::gray_f32(2, 2, vec![1.0; 4]).unwrap())
            .unwrap();

        let reject = |_: &RasterImage| -> Result<HeightField> {
            Err(ElevationError::Conversion("unsupported".to_string()))
        };
        let elevation = ElevationStore::with_converter(store, Arc::new(reject));
        assert!(elevation.get_elevation(&key).is_none());
    }

    #[test]
    fn test_open_failure_keeps_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("missing.mbtiles"));
        let err = ElevationStore::open_default(&config, &CodecRegistry::with_defaults()).unwrap_err();
        match err {
            ElevationError::Store(e) => assert_eq!(e.status(), StatusCode::ResourceUnavailable),
            other => panic!("unexpected error: {}", other),
        }
    }
}

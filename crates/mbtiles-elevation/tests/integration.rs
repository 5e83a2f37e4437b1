//! Integration tests for mbtiles-elevation over real store files.

use approx::assert_relative_eq;
use mbtiles_elevation::{ElevationStore, HeightField, HeightFieldConverter, ImageToHeightField, Result};
use mbtiles_store::{CodecRegistry, MbTilesStore, Profile, RasterImage, StoreConfig, TileKey};
use std::sync::Arc;

fn write_dem(path: &std::path::Path) {
    let config = StoreConfig::new(path)
        .for_writing()
        .with_profile("global-geodetic")
        .with_format("tif")
        .with_compress(true);
    let store = MbTilesStore::open(&config, &CodecRegistry::with_defaults()).unwrap();

    // Western hemisphere at zoom 0: 3x3 samples, north row 1000 m, south row 0 m.
    let data = vec![1000.0, 1000.0, 1000.0, 500.0, 500.0, 500.0, 0.0, 0.0, 0.0];
    store
        .put_image(&TileKey::new(0, 0, 0), &RasterImage::gray_f32(3, 3, data).unwrap())
        .unwrap();
}

#[test]
fn test_elevation_from_stored_tile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dem.mbtiles");
    write_dem(&path);

    let config = StoreConfig::new(&path).with_coverage(true).with_compute_levels(true);
    let dem = ElevationStore::open_default(&config, &CodecRegistry::with_defaults()).unwrap();
    assert_eq!(dem.profile(), &Profile::global_geodetic());

    let key = TileKey::new(0, 0, 0);
    let field = dem.get_elevation(&key).unwrap();
    assert_eq!(field.extent(), &Profile::global_geodetic().tile_extent(&key));
    assert_eq!(field.heightfield().dimensions(), (3, 3));

    assert_relative_eq!(field.elevation_at(-90.0, 90.0).unwrap(), 1000.0);
    assert_relative_eq!(field.elevation_at(-90.0, 0.0).unwrap(), 500.0);
    assert_relative_eq!(field.elevation_at(-135.0, -45.0).unwrap(), 250.0);
    assert!(field.elevation_at(45.0, 0.0).is_err());

    // Eastern tile was never written.
    assert!(dem.get_elevation(&TileKey::new(0, 1, 0)).is_none());
    // Beyond the computed maximum level.
    assert!(dem.get_elevation(&TileKey::new(1, 0, 0)).is_none());
}

#[test]
fn test_custom_converter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dem.mbtiles");
    write_dem(&path);

    // Stored values are decimeters.
    let decimeters = |image: &RasterImage| -> Result<HeightField> {
        let raw = ImageToHeightField::default().convert(image)?;
        let (w, h) = raw.dimensions();
        HeightField::new(w, h, raw.data().iter().map(|v| v / 10.0).collect())
    };

    let dem = ElevationStore::open(
        &StoreConfig::new(&path),
        &CodecRegistry::with_defaults(),
        Arc::new(decimeters),
    )
    .unwrap();
    let field = dem.get_elevation(&TileKey::new(0, 0, 0)).unwrap();
    assert_relative_eq!(field.elevation_nearest(-180.0, 90.0).unwrap(), 100.0);
}

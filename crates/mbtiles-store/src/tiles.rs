//! Raw tile access and the row-flip addressing transform.
//!
//! MBTiles numbers rows from the southern edge, while callers number them
//! from the northern edge. Every read and write goes through [`flip_row`];
//! skipping it mirrors the data north to south.

use crate::connection::ConnectionHandle;
use crate::profile::{Profile, TileKey};
use crate::{Result, StoreError};
use rusqlite::{params, OptionalExtension};
use std::time::Instant;
use tracing::debug;

/// Convert a row between the caller's and the store's convention.
///
/// The transform is its own inverse for a fixed `total_rows`. Returns `None`
/// when `row` does not exist at that zoom level.
pub fn flip_row(total_rows: u32, row: u32) -> Option<u32> {
    total_rows.checked_sub(row)?.checked_sub(1)
}

/// Store-local (zoom, column, row) for a caller key, if the key exists in
/// the profile's tiling scheme.
pub fn store_address(profile: &Profile, key: &TileKey) -> Option<(u32, u32, u32)> {
    let (cols, rows) = profile.num_tiles(key.z);
    if key.x >= cols {
        return None;
    }
    flip_row(rows, key.y).map(|row| (key.z, key.x, row))
}

/// Read the stored payload for a tile.
///
/// A key outside the tiling scheme, or with no record, yields `Ok(None)`.
pub fn get_tile(db: &ConnectionHandle, profile: &Profile, key: &TileKey) -> Result<Option<Vec<u8>>> {
    let Some((z, x, y)) = store_address(profile, key) else {
        debug!("Tile {} is outside the {} tiling scheme", key, profile);
        return Ok(None);
    };

    let data = db.with(|conn| {
        Ok(conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![z, x, y],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?
            .flatten())
    })?;

    if data.is_none() {
        debug!("No tile at {} (store row {})", key, y);
    }
    Ok(data)
}

/// Insert or replace the payload for a tile.
pub fn put_tile(db: &ConnectionHandle, profile: &Profile, key: &TileKey, data: &[u8]) -> Result<()> {
    let (z, x, y) = store_address(profile, key).ok_or(StoreError::InvalidTileKey {
        zoom: key.z,
        column: key.x,
        row: key.y,
    })?;

    db.with(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
            params![z, x, y, data],
        )?;
        Ok(())
    })
}

/// Scan the tile table for its (min, max) zoom levels.
///
/// Returns `Ok(None)` for an empty table.
pub fn compute_levels(db: &ConnectionHandle) -> Result<Option<(u32, u32)>> {
    let start = Instant::now();
    let levels = db.with(|conn| {
        Ok(conn.query_row(
            "SELECT min(zoom_level), max(zoom_level) FROM tiles",
            [],
            |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
        )?)
    })?;

    let levels = match levels {
        (Some(min), Some(max)) => match (u32::try_from(min), u32::try_from(max)) {
            (Ok(min), Ok(max)) => Some((min, max)),
            _ => None,
        },
        _ => None,
    };

    debug!(
        "Computed levels {:?} in {:.3}s",
        levels,
        start.elapsed().as_secs_f64()
    );
    Ok(levels)
}

/// Number of stored tiles.
pub fn tile_count(db: &ConnectionHandle) -> Result<u64> {
    db.with(|conn| {
        let count: i64 = conn.query_row("SELECT count(*) FROM tiles", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;

    fn setup() -> ConnectionHandle {
        let db = ConnectionHandle::open_in_memory().unwrap();
        ensure_schema(&db).unwrap();
        db
    }

    #[test]
    fn test_flip_row_involution() {
        for total in [1u32, 2, 8, 4096] {
            for row in [0, total / 2, total - 1] {
                let stored = flip_row(total, row).unwrap();
                assert!(stored < total);
                assert_eq!(flip_row(total, stored), Some(row));
            }
        }
    }

    #[test]
    fn test_flip_row_out_of_range() {
        assert_eq!(flip_row(4, 4), None);
        assert_eq!(flip_row(0, 0), None);
        assert_eq!(flip_row(4, 0), Some(3));
    }

    #[test]
    fn test_stored_row_is_flipped() {
        let db = setup();
        let profile = Profile::spherical_mercator();
        put_tile(&db, &profile, &TileKey::new(2, 1, 0), b"north").unwrap();

        let stored_row: i64 = db
            .with(|c| {
                Ok(c.query_row(
                    "SELECT tile_row FROM tiles WHERE zoom_level = 2 AND tile_column = 1",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(stored_row, 3);

        assert_eq!(
            get_tile(&db, &profile, &TileKey::new(2, 1, 0)).unwrap().as_deref(),
            Some(&b"north"[..])
        );
        assert_eq!(get_tile(&db, &profile, &TileKey::new(2, 1, 3)).unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing() {
        let db = setup();
        let profile = Profile::global_geodetic();
        let key = TileKey::new(1, 3, 1);
        put_tile(&db, &profile, &key, b"a").unwrap();
        put_tile(&db, &profile, &key, b"b").unwrap();
        assert_eq!(get_tile(&db, &profile, &key).unwrap().as_deref(), Some(&b"b"[..]));
        assert_eq!(tile_count(&db).unwrap(), 1);
    }

    #[test]
    fn test_invalid_key() {
        let db = setup();
        let profile = Profile::spherical_mercator();
        let err = put_tile(&db, &profile, &TileKey::new(1, 0, 2), b"x").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTileKey { zoom: 1, column: 0, row: 2 }));
        assert_eq!(get_tile(&db, &profile, &TileKey::new(1, 5, 0)).unwrap(), None);
    }

    #[test]
    fn test_compute_levels() {
        let db = setup();
        let profile = Profile::spherical_mercator();
        assert_eq!(compute_levels(&db).unwrap(), None);

        put_tile(&db, &profile, &TileKey::new(3, 0, 0), b"x").unwrap();
        put_tile(&db, &profile, &TileKey::new(7, 0, 0), b"x").unwrap();
        assert_eq!(compute_levels(&db).unwrap(), Some((3, 7)));
    }
}

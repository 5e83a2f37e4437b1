//! MBTiles schema creation.
//!
//! See <https://github.com/mapbox/mbtiles-spec/blob/master/1.2/spec.md>.

use crate::connection::ConnectionHandle;
use crate::Result;
use tracing::warn;

/// Metadata table.
const CREATE_METADATA: &str = "CREATE TABLE IF NOT EXISTS metadata (
    name  text,
    value text)";

/// Tile table.
const CREATE_TILES: &str = "CREATE TABLE IF NOT EXISTS tiles (
    zoom_level  integer,
    tile_column integer,
    tile_row    integer,
    tile_data   blob)";

/// Uniqueness of tile keys.
const CREATE_TILE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS tile_index ON tiles (
    zoom_level, tile_column, tile_row)";

/// Uniqueness of metadata names, so `INSERT OR REPLACE` upserts.
const CREATE_METADATA_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS metadata_index ON metadata (name)";

/// Create the metadata and tile tables and their indexes if absent.
///
/// Table creation failures are returned. Index creation failures (for
/// example duplicate keys already present in a legacy file) are logged and
/// otherwise ignored.
pub fn ensure_schema(db: &ConnectionHandle) -> Result<()> {
    db.with(|conn| {
        conn.execute_batch(CREATE_METADATA)?;
        conn.execute_batch(CREATE_TILES)?;

        for (name, sql) in [
            ("tiles", CREATE_TILE_INDEX),
            ("metadata", CREATE_METADATA_INDEX),
        ] {
            if let Err(e) = conn.execute_batch(sql) {
                warn!("Failed to create index on table [{}]: {}", name, e);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_objects(db: &ConnectionHandle, kind: &str) -> i64 {
        db.with(|c| {
            Ok(c.query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = ?1",
                [kind],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn test_ensure_schema_idempotent() {
        let db = ConnectionHandle::open_in_memory().unwrap();
        ensure_schema(&db).unwrap();
        ensure_schema(&db).unwrap();

        assert_eq!(count_objects(&db, "table"), 2);
        assert_eq!(count_objects(&db, "index"), 2);
    }

    #[test]
    fn test_index_failure_is_not_fatal() {
        let db = ConnectionHandle::open_in_memory().unwrap();
        db.with(|c| {
            c.execute_batch(CREATE_TILES)?;
            c.execute_batch(
                "INSERT INTO tiles VALUES (1, 0, 0, x'00');
                 INSERT INTO tiles VALUES (1, 0, 0, x'01');",
            )?;
            Ok(())
        })
        .unwrap();

        ensure_schema(&db).unwrap();
        // Only the metadata index could be built.
        assert_eq!(count_objects(&db, "index"), 1);
    }
}

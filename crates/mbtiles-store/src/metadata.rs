//! String key/value access to the `metadata` table.

use crate::connection::ConnectionHandle;
use crate::Result;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

/// Serialized profile descriptor.
pub const KEY_PROFILE: &str = "profile";
/// Tile payload format (MIME type or extension).
pub const KEY_FORMAT: &str = "format";
/// Compressor name; absent means uncompressed.
pub const KEY_COMPRESSION: &str = "compression";
/// Geographic bounds as `minLon,minLat,maxLon,maxLat`.
pub const KEY_BOUNDS: &str = "bounds";

/// Look up a metadata value.
///
/// Returns `Ok(None)` when the key is absent; a failing query is an error.
pub fn get_metadata(db: &ConnectionHandle, key: &str) -> Result<Option<String>> {
    let value = db.with(|conn| {
        Ok(conn
            .query_row(
                "SELECT value FROM metadata WHERE name = ?1",
                [key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    })?;

    if value.is_none() {
        debug!("No metadata value for \"{}\"", key);
    }
    Ok(value)
}

/// Insert or replace a metadata value.
pub fn put_metadata(db: &ConnectionHandle, key: &str, value: &str) -> Result<()> {
    db.with(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    })
}

/// All metadata entries, ordered by name.
pub fn list_metadata(db: &ConnectionHandle) -> Result<Vec<(String, String)>> {
    db.with(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name, value FROM metadata WHERE name IS NOT NULL ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;
    use crate::StoreError;

    fn setup() -> ConnectionHandle {
        let db = ConnectionHandle::open_in_memory().unwrap();
        ensure_schema(&db).unwrap();
        db
    }

    #[test]
    fn test_get_missing() {
        let db = setup();
        assert_eq!(get_metadata(&db, KEY_FORMAT).unwrap(), None);
    }

    #[test]
    fn test_put_replaces() {
        let db = setup();
        put_metadata(&db, KEY_FORMAT, "png").unwrap();
        put_metadata(&db, KEY_FORMAT, "tif").unwrap();
        assert_eq!(get_metadata(&db, KEY_FORMAT).unwrap().as_deref(), Some("tif"));
        assert_eq!(list_metadata(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_list_sorted() {
        let db = setup();
        put_metadata(&db, KEY_PROFILE, "{}").unwrap();
        put_metadata(&db, KEY_BOUNDS, "0,0,1,1").unwrap();
        let names: Vec<_> = list_metadata(&db).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["bounds", "profile"]);
    }

    #[test]
    fn test_query_failure_is_distinct_from_missing() {
        // No schema: the query itself fails.
        let db = ConnectionHandle::open_in_memory().unwrap();
        let err = get_metadata(&db, KEY_FORMAT).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}

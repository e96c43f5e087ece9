use rusqlite::Connection;
use waypoint_core::db::migrations::latest_version;
use waypoint_core::db::{open_db, open_db_in_memory, DbError};
use waypoint_core::{CatalogRepoError, ItineraryRepoError, SqliteCatalogRepository, SqliteItineraryRepository};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "places");
    assert_table_exists(&conn, "trips");
    assert_table_exists(&conn, "itinerary_days");
    assert_table_exists(&conn, "itinerary_items");
    assert_table_exists(&conn, "pool_entries");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waypoint.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "itinerary_items");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_refuse_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteItineraryRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        ItineraryRepoError::Db(DbError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));

    let err = SqliteCatalogRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        CatalogRepoError::Db(DbError::UninitializedConnection { .. })
    ));
}

#[test]
fn item_sequence_is_unique_per_day() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO trips (trip_uuid, name) VALUES ('t', 'Trip');
         INSERT INTO places (place_uuid, name) VALUES ('p', 'Place');
         INSERT INTO itinerary_days (day_uuid, trip_uuid, day_number) VALUES ('d', 't', 1);
         INSERT INTO itinerary_items (item_uuid, day_uuid, place_uuid, sequence)
         VALUES ('i1', 'd', 'p', 1.0);",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO itinerary_items (item_uuid, day_uuid, place_uuid, sequence)
         VALUES ('i2', 'd', 'p', 1.0);",
        [],
    );
    assert!(duplicate.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

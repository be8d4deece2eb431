use fleetstore_core::db::migrations::{current_user_version, latest_version};
use fleetstore_core::db::{open_db, open_db_in_memory, open_db_with_config, DbError};
use fleetstore_core::DatabaseConfig;
use rusqlite::Connection;

const FLEET_TABLES: &[&str] = &[
    "application",
    "device",
    "device_config_variable",
    "device_environment_variable",
    "device_tag",
    "image",
    "image_install",
    "application_config_variable",
    "application_environment_variable",
];

const AUTH_TABLES: &[&str] = &["actor", "user", "permission", "api_key", "api_key__has__permission"];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    for table in FLEET_TABLES.iter().chain(AUTH_TABLES) {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opened_connections_enforce_foreign_keys() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn
        .execute(
            "INSERT INTO device_tag (device_id, tag_key) VALUES (42, 'region');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"));
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO application (app_name, slug) VALUES ('edge', 'org/edge');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(current_user_version(&conn_second).unwrap(), latest_version());
    let apps: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM application;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(apps, 1);
}

#[test]
fn open_db_with_config_uses_path_or_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.db");

    let file_conn = open_db_with_config(&DatabaseConfig {
        path: Some(path.clone()),
        busy_timeout_ms: 250,
    })
    .unwrap();
    assert_table_exists(&file_conn, "device");
    assert!(path.exists());

    let memory_conn = open_db_with_config(&DatabaseConfig::default()).unwrap();
    assert_table_exists(&memory_conn, "api_key");
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
fn failed_migration_names_the_step_and_keeps_the_old_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflicting.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE device (id INTEGER PRIMARY KEY);")
        .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Migration { version, name, .. } => {
            assert_eq!(*version, 1);
            assert_eq!(*name, "fleet_model");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("store migration 0001_fleet_model failed"));

    let conn = Connection::open(&path).unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), 0);
    let applications: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'application';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(applications, 0);
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

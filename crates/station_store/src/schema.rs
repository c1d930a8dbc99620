//! SQLite schema for the station cache.
//!
//! Tables: stations, modules, sensors, station_events.
//! Sensors reference modules by hardware device id and foreign keys are
//! enforced, so module rows can only be dropped once their sensors are gone.

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS stations (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id               TEXT NOT NULL UNIQUE,
            generation_id           TEXT NOT NULL DEFAULT '',
            name                    TEXT NOT NULL DEFAULT '',
            url                     TEXT NOT NULL DEFAULT '',
            status                  TEXT NOT NULL DEFAULT '',
            deploy_start_time_ms    INTEGER,
            battery_level           REAL NOT NULL DEFAULT 0.0,
            interval                INTEGER NOT NULL DEFAULT 0,
            latitude                REAL,
            longitude               REAL,
            consumed_memory         INTEGER NOT NULL DEFAULT 0,
            total_memory            INTEGER NOT NULL DEFAULT 0,
            consumed_memory_percent REAL NOT NULL DEFAULT 0.0,
            deploy_site_name        TEXT NOT NULL DEFAULT '',
            deploy_note             TEXT NOT NULL DEFAULT '',
            updated_at_ms           INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS modules (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id       TEXT NOT NULL UNIQUE,
            station_id      INTEGER NOT NULL REFERENCES stations(id),
            name            TEXT NOT NULL DEFAULT '',
            position        INTEGER NOT NULL DEFAULT 0,
            flags           INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sensors (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            module_device_id    TEXT NOT NULL REFERENCES modules(device_id),
            name                TEXT NOT NULL,
            unit                TEXT NOT NULL DEFAULT '',
            frequency           INTEGER NOT NULL DEFAULT 0,
            current_reading     REAL
        );

        CREATE INDEX IF NOT EXISTS modules_station_idx ON modules(station_id);
        CREATE INDEX IF NOT EXISTS sensors_module_idx ON sensors(module_device_id);

        CREATE TABLE IF NOT EXISTS station_events (
            event_id        TEXT PRIMARY KEY,
            kind            TEXT NOT NULL,
            device_id       TEXT NOT NULL DEFAULT '',
            host            TEXT NOT NULL DEFAULT '',
            port            INTEGER NOT NULL DEFAULT 0,
            reply_type      INTEGER,
            body            BLOB,
            created_at_ms   INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn schema_creation() {
        let conn = open_in_memory().unwrap();
        let tables = table_names(&conn);
        assert!(tables.contains(&"stations".to_string()));
        assert!(tables.contains(&"modules".to_string()));
        assert!(tables.contains(&"sensors".to_string()));
        assert!(tables.contains(&"station_events".to_string()));
    }

    #[test]
    fn schema_idempotent() {
        let conn = open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
    }

    #[test]
    fn open_db_creates_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("sqlite").join("fieldkit.db");
        let conn = open_db(&db_path).unwrap();
        assert!(db_path.exists());
        drop(conn);
    }

    #[test]
    fn module_removal_blocked_by_sensors() {
        let conn = open_in_memory().unwrap();
        conn.execute("INSERT INTO stations (device_id) VALUES ('s1')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO modules (device_id, station_id) VALUES ('m1', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sensors (module_device_id, name) VALUES ('m1', 'temp')",
            [],
        )
        .unwrap();
        assert!(conn
            .execute("DELETE FROM modules WHERE device_id = 'm1'", [])
            .is_err());
    }
}

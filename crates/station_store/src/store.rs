//! Station store: the durable side of the station set.
//!
//! The engine only ever inserts or upserts station rows. Module and sensor
//! rows are removed during reconciliation, and callers remove sensors before
//! their module; nothing here cascades.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::history::SqliteHistory;
use crate::model::{now_ms, ModuleRecord, SensorRecord, StationRecord};
use crate::schema;

#[async_trait::async_trait]
pub trait StationStore: Send + Sync {
    async fn get_all_stations(&self) -> Result<Vec<StationRecord>>;

    async fn get_station_by_device_id(&self, device_id: &str) -> Result<Option<StationRecord>>;

    /// Insert a new station row and return its id.
    async fn insert_station(&self, station: &StationRecord) -> Result<i64>;

    /// Insert or update by device id. Returns the row id.
    async fn upsert_station(&self, station: &StationRecord) -> Result<i64>;

    async fn get_modules(&self, station_id: i64) -> Result<Vec<ModuleRecord>>;

    async fn insert_module(&self, module: &ModuleRecord) -> Result<()>;

    /// Patch the mutable fields (name, position) of a module.
    async fn update_module(&self, module: &ModuleRecord) -> Result<()>;

    async fn remove_module(&self, device_id: &str) -> Result<()>;

    async fn get_sensors(&self, module_device_id: &str) -> Result<Vec<SensorRecord>>;

    async fn insert_sensor(&self, sensor: &SensorRecord) -> Result<()>;

    async fn remove_sensor(&self, sensor_id: i64) -> Result<()>;

    /// Remove every sensor belonging to a module.
    async fn remove_sensors(&self, module_device_id: &str) -> Result<()>;

    async fn clear_deploy_notes(&self, station_id: i64) -> Result<()>;
}

/// SQLite-backed store. Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(schema::open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(schema::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// History log sharing this store's connection.
    pub fn history(&self) -> SqliteHistory {
        SqliteHistory::new(self.conn.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

const STATION_COLUMNS: &str = "id, device_id, generation_id, name, url, status, \
     deploy_start_time_ms, battery_level, interval, latitude, longitude, consumed_memory, \
     total_memory, consumed_memory_percent, deploy_site_name, deploy_note, updated_at_ms";

fn station_from_row(row: &Row<'_>) -> rusqlite::Result<StationRecord> {
    Ok(StationRecord {
        id: Some(row.get(0)?),
        device_id: row.get(1)?,
        generation_id: row.get(2)?,
        name: row.get(3)?,
        url: row.get(4)?,
        status: row.get(5)?,
        deploy_start_time_ms: row.get(6)?,
        battery_level: row.get::<_, f64>(7)? as f32,
        interval: row.get(8)?,
        latitude: row.get(9)?,
        longitude: row.get(10)?,
        consumed_memory: row.get::<_, i64>(11)? as u64,
        total_memory: row.get::<_, i64>(12)? as u64,
        consumed_memory_percent: row.get::<_, f64>(13)? as f32,
        deploy_site_name: row.get(14)?,
        deploy_note: row.get(15)?,
        updated_at_ms: row.get(16)?,
    })
}

fn module_from_row(row: &Row<'_>) -> rusqlite::Result<ModuleRecord> {
    Ok(ModuleRecord {
        id: Some(row.get(0)?),
        device_id: row.get(1)?,
        station_id: row.get(2)?,
        name: row.get(3)?,
        position: row.get(4)?,
        flags: row.get(5)?,
    })
}

fn sensor_from_row(row: &Row<'_>) -> rusqlite::Result<SensorRecord> {
    Ok(SensorRecord {
        id: Some(row.get(0)?),
        module_device_id: row.get(1)?,
        name: row.get(2)?,
        unit: row.get(3)?,
        frequency: row.get(4)?,
        current_reading: row.get::<_, Option<f64>>(5)?.map(|v| v as f32),
    })
}

#[async_trait::async_trait]
impl StationStore for SqliteStore {
    async fn get_all_stations(&self) -> Result<Vec<StationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STATION_COLUMNS} FROM stations ORDER BY id"
        ))?;
        let rows = stmt.query_map([], station_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn get_station_by_device_id(&self, device_id: &str) -> Result<Option<StationRecord>> {
        let conn = self.lock()?;
        let station = conn
            .query_row(
                &format!("SELECT {STATION_COLUMNS} FROM stations WHERE device_id = ?1"),
                params![device_id],
                station_from_row,
            )
            .optional()?;
        Ok(station)
    }

    async fn insert_station(&self, station: &StationRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO stations (device_id, generation_id, name, url, status,
                deploy_start_time_ms, battery_level, interval, latitude, longitude,
                consumed_memory, total_memory, consumed_memory_percent, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                station.device_id,
                station.generation_id,
                station.name,
                station.url,
                station.status,
                station.deploy_start_time_ms,
                station.battery_level as f64,
                station.interval,
                station.latitude,
                station.longitude,
                station.consumed_memory as i64,
                station.total_memory as i64,
                station.consumed_memory_percent as f64,
                now_ms(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(device_id = %station.device_id, id, "station inserted");
        Ok(id)
    }

    async fn upsert_station(&self, station: &StationRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO stations (device_id, generation_id, name, url, status,
                deploy_start_time_ms, battery_level, interval, latitude, longitude,
                consumed_memory, total_memory, consumed_memory_percent, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(device_id) DO UPDATE SET
                generation_id = excluded.generation_id,
                name = excluded.name,
                url = excluded.url,
                status = excluded.status,
                deploy_start_time_ms = excluded.deploy_start_time_ms,
                battery_level = excluded.battery_level,
                interval = excluded.interval,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                consumed_memory = excluded.consumed_memory,
                total_memory = excluded.total_memory,
                consumed_memory_percent = excluded.consumed_memory_percent,
                updated_at_ms = excluded.updated_at_ms",
            params![
                station.device_id,
                station.generation_id,
                station.name,
                station.url,
                station.status,
                station.deploy_start_time_ms,
                station.battery_level as f64,
                station.interval,
                station.latitude,
                station.longitude,
                station.consumed_memory as i64,
                station.total_memory as i64,
                station.consumed_memory_percent as f64,
                now_ms(),
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM stations WHERE device_id = ?1",
            params![station.device_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    async fn get_modules(&self, station_id: i64) -> Result<Vec<ModuleRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, device_id, station_id, name, position, flags
             FROM modules WHERE station_id = ?1 ORDER BY position, id",
        )?;
        let rows = stmt.query_map(params![station_id], module_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_module(&self, module: &ModuleRecord) -> Result<()> {
        let conn = self.lock()?;
        // A module moved between stations keeps its hardware id.
        conn.execute(
            "INSERT INTO modules (device_id, station_id, name, position, flags)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(device_id) DO UPDATE SET
                station_id = excluded.station_id,
                name = excluded.name,
                position = excluded.position,
                flags = excluded.flags",
            params![
                module.device_id,
                module.station_id,
                module.name,
                module.position,
                module.flags,
            ],
        )?;
        Ok(())
    }

    async fn update_module(&self, module: &ModuleRecord) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE modules SET name = ?2, position = ?3 WHERE device_id = ?1",
            params![module.device_id, module.name, module.position],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("module {}", module.device_id)));
        }
        Ok(())
    }

    async fn remove_module(&self, device_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM modules WHERE device_id = ?1", params![device_id])?;
        Ok(())
    }

    async fn get_sensors(&self, module_device_id: &str) -> Result<Vec<SensorRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, module_device_id, name, unit, frequency, current_reading
             FROM sensors WHERE module_device_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![module_device_id], sensor_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn insert_sensor(&self, sensor: &SensorRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sensors (module_device_id, name, unit, frequency, current_reading)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sensor.module_device_id,
                sensor.name,
                sensor.unit,
                sensor.frequency,
                sensor.current_reading.map(|v| v as f64),
            ],
        )?;
        Ok(())
    }

    async fn remove_sensor(&self, sensor_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sensors WHERE id = ?1", params![sensor_id])?;
        Ok(())
    }

    async fn remove_sensors(&self, module_device_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM sensors WHERE module_device_id = ?1",
            params![module_device_id],
        )?;
        Ok(())
    }

    async fn clear_deploy_notes(&self, station_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE stations SET deploy_site_name = '', deploy_note = '' WHERE id = ?1",
            params![station_id],
        )?;
        debug!(station_id, "deploy notes cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(device_id: &str, name: &str) -> StationRecord {
        StationRecord {
            device_id: device_id.into(),
            name: name.into(),
            url: "http://192.168.2.1:80/fk/v1".into(),
            battery_level: 88.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_by_device_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_station(&station("aa01", "Alpha")).await.unwrap();

        let found = store.get_station_by_device_id("aa01").await.unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.name, "Alpha");
        assert!((found.battery_level - 88.0).abs() < 0.001);

        assert!(store.get_station_by_device_id("zz99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.upsert_station(&station("aa01", "Alpha")).await.unwrap();

        let mut renamed = station("aa01", "Alpha Prime");
        renamed.url = "http://10.0.0.5:80/fk/v1".into();
        let second = store.upsert_station(&renamed).await.unwrap();
        assert_eq!(first, second);

        let all = store.get_all_stations().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Alpha Prime");
        assert_eq!(all[0].url, "http://10.0.0.5:80/fk/v1");
    }

    #[tokio::test]
    async fn modules_and_sensors_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let station_id = store.insert_station(&station("aa01", "Alpha")).await.unwrap();

        store
            .insert_module(&ModuleRecord {
                device_id: "m1".into(),
                station_id,
                name: "modules.water.ph".into(),
                position: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .insert_sensor(&SensorRecord {
                module_device_id: "m1".into(),
                name: "ph".into(),
                unit: "pH".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let modules = store.get_modules(station_id).await.unwrap();
        assert_eq!(modules.len(), 1);
        let sensors = store.get_sensors("m1").await.unwrap();
        assert_eq!(sensors.len(), 1);

        // Sensors must go first.
        assert!(store.remove_module("m1").await.is_err());
        store.remove_sensors("m1").await.unwrap();
        store.remove_module("m1").await.unwrap();
        assert!(store.get_modules(station_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_module_patches_name_and_position() {
        let store = SqliteStore::open_in_memory().unwrap();
        let station_id = store.insert_station(&station("aa01", "Alpha")).await.unwrap();
        let mut module = ModuleRecord {
            device_id: "m1".into(),
            station_id,
            name: "modules.weather".into(),
            position: 0,
            ..Default::default()
        };
        store.insert_module(&module).await.unwrap();

        module.name = "modules.weather.v2".into();
        module.position = 3;
        store.update_module(&module).await.unwrap();

        let stored = &store.get_modules(station_id).await.unwrap()[0];
        assert_eq!(stored.name, "modules.weather.v2");
        assert_eq!(stored.position, 3);

        module.device_id = "missing".into();
        let err = store.update_module(&module).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(err.to_string(), "not found: module missing");
    }

    #[tokio::test]
    async fn clear_deploy_notes_blanks_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_station(&station("aa01", "Alpha")).await.unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "UPDATE stations SET deploy_note = 'by the creek' WHERE id = ?1",
                params![id],
            )
            .unwrap();
        }
        store.clear_deploy_notes(id).await.unwrap();
        let found = store.get_station_by_device_id("aa01").await.unwrap().unwrap();
        assert_eq!(found.deploy_note, "");
    }

    #[tokio::test]
    async fn reopen_on_disk_keeps_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fieldkit.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_station(&station("aa01", "Alpha")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_all_stations().await.unwrap().len(), 1);
    }
}

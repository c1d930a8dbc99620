//! Row types for the station cache.

use std::time::{SystemTime, UNIX_EPOCH};

/// A persisted station. `id` is `None` until the row has been inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationRecord {
    pub id: Option<i64>,
    pub device_id: String,
    pub generation_id: String,
    pub name: String,
    pub url: String,
    pub status: String,
    pub deploy_start_time_ms: Option<i64>,
    pub battery_level: f32,
    pub interval: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub consumed_memory: u64,
    pub total_memory: u64,
    pub consumed_memory_percent: f32,
    pub deploy_site_name: String,
    pub deploy_note: String,
    pub updated_at_ms: i64,
}

/// A hardware module attached to a station, keyed by its hex device id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: Option<i64>,
    pub device_id: String,
    pub station_id: i64,
    pub name: String,
    pub position: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorRecord {
    pub id: Option<i64>,
    pub module_device_id: String,
    pub name: String,
    pub unit: String,
    pub frequency: u32,
    pub current_reading: Option<f32>,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

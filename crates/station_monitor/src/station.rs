//! The in-memory station model and list ordering.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use station_query::StationReply;
use station_store::StationRecord;

const HOUR_MS: i64 = 3_600_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StationStatus {
    #[default]
    Idle,
    Recording,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Recording => "recording",
        }
    }

    pub fn from_recording(enabled: bool) -> Self {
        if enabled {
            Self::Recording
        } else {
            Self::Idle
        }
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// Store row id, once persisted.
    pub id: Option<i64>,
    pub device_id: String,
    pub generation_id: String,
    pub name: String,
    pub url: String,
    pub connected: bool,
    /// Unix ms of the last reply or activation. `None` means never seen.
    pub last_seen: Option<i64>,
    pub status: StationStatus,
    pub deploy_start_time: Option<i64>,
    /// Sampling interval in seconds.
    pub interval: u32,
    pub battery_level: f32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub consumed_memory: u64,
    pub total_memory: u64,
    pub consumed_memory_percent: f32,
    /// Last live value per `module name + sensor name`.
    pub readings: BTreeMap<String, f32>,
    pub status_json: Option<StationReply>,
    pub serialized_status: Bytes,
    /// Pins the station to the top of the next sorted list, once.
    pub newly_connected: bool,
    pub sorted_index: String,
}

impl Station {
    /// A stored station, disconnected until discovery finds it again.
    pub fn from_record(record: &StationRecord) -> Self {
        Self {
            id: record.id,
            device_id: record.device_id.clone(),
            generation_id: record.generation_id.clone(),
            name: record.name.clone(),
            url: record.url.clone(),
            connected: false,
            last_seen: None,
            status: StationStatus::from_recording(record.status == "recording"),
            deploy_start_time: record.deploy_start_time_ms,
            interval: record.interval,
            battery_level: record.battery_level,
            latitude: record.latitude,
            longitude: record.longitude,
            consumed_memory: record.consumed_memory,
            total_memory: record.total_memory,
            consumed_memory_percent: record.consumed_memory_percent,
            readings: BTreeMap::new(),
            status_json: None,
            serialized_status: Bytes::new(),
            newly_connected: false,
            sorted_index: String::new(),
        }
    }

    pub fn to_record(&self) -> StationRecord {
        StationRecord {
            id: self.id,
            device_id: self.device_id.clone(),
            generation_id: self.generation_id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            status: self.status.as_str().to_string(),
            deploy_start_time_ms: self.deploy_start_time,
            battery_level: self.battery_level,
            interval: self.interval,
            latitude: self.latitude,
            longitude: self.longitude,
            consumed_memory: self.consumed_memory,
            total_memory: self.total_memory,
            consumed_memory_percent: self.consumed_memory_percent,
            ..Default::default()
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == StationStatus::Recording
    }
}

/// Live readings keyed by module name followed by sensor name.
pub fn readings_from(reply: &StationReply) -> BTreeMap<String, f32> {
    let mut readings = BTreeMap::new();
    for live in &reply.live_readings {
        for module in &live.modules {
            for reading in &module.readings {
                let key = format!("{}{}", module.module.name, reading.sensor.name);
                readings.insert(key, reading.value);
            }
        }
    }
    readings
}

/// Order stations for display: alphabetical, then most recently seen hour
/// first with never-seen stations last. One newly connected station, if
/// any, is pinned to the front and its flag consumed. Every station gets a
/// fresh `sorted_index`.
pub fn sort_stations<'a>(stations: impl IntoIterator<Item = &'a mut Station>) -> Vec<Station> {
    let mut sorted: Vec<&mut Station> = stations.into_iter().collect();

    sorted.sort_by_key(|s| s.name.to_uppercase());
    sorted.sort_by_key(|s| Reverse(s.last_seen.map(|ms| ms.div_euclid(HOUR_MS))));

    if let Some(index) = sorted.iter().position(|s| s.newly_connected) {
        let pinned = sorted.remove(index);
        pinned.newly_connected = false;
        sorted.insert(0, pinned);
    }

    for (i, s) in sorted.iter_mut().enumerate() {
        s.sorted_index = format!("{i}-{}", s.device_id);
    }

    sorted.into_iter().map(|s| s.clone()).collect()
}

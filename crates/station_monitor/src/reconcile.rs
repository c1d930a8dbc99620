//! Module and sensor reconciliation against the store.
//!
//! Modules are matched by hardware device id, sensors by name within their
//! module. Sensors always go before their module so foreign keys hold.

use std::collections::HashSet;

use station_query::{ModuleInfo, SensorInfo};
use station_store::{ModuleRecord, SensorRecord, StationStore, StoreError};
use tracing::debug;

/// Flag bit marking a module or sensor as internal to the firmware.
pub const FLAG_INTERNAL: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternalFilter {
    pub include_internal_modules: bool,
    pub include_internal_sensors: bool,
}

impl InternalFilter {
    fn keeps_module(&self, module: &ModuleInfo) -> bool {
        self.include_internal_modules || module.flags & FLAG_INTERNAL == 0
    }

    fn keeps_sensor(&self, sensor: &SensorInfo) -> bool {
        self.include_internal_sensors || sensor.flags & FLAG_INTERNAL == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub modules_inserted: usize,
    pub modules_updated: usize,
    pub modules_removed: usize,
    pub sensors_inserted: usize,
    pub sensors_removed: usize,
}

impl SyncStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Bring the stored modules and sensors of `station_id` in line with what
/// the hardware reported.
pub async fn sync_modules(
    store: &dyn StationStore,
    station_id: i64,
    modules: &[ModuleInfo],
    filter: InternalFilter,
) -> Result<SyncStats, StoreError> {
    let mut stats = SyncStats::default();

    let hw_modules: Vec<&ModuleInfo> = modules.iter().filter(|m| filter.keeps_module(m)).collect();
    let hw_ids: HashSet<&str> = hw_modules.iter().map(|m| m.device_id.as_str()).collect();
    let db_modules = store.get_modules(station_id).await?;

    let stale: Vec<&ModuleRecord> = db_modules
        .iter()
        .filter(|m| !hw_ids.contains(m.device_id.as_str()))
        .collect();
    for module in &stale {
        store.remove_sensors(&module.device_id).await?;
    }
    for module in &stale {
        store.remove_module(&module.device_id).await?;
        stats.modules_removed += 1;
    }

    for hw in hw_modules {
        let record = ModuleRecord {
            id: None,
            device_id: hw.device_id.clone(),
            station_id,
            name: hw.name.clone(),
            position: hw.position,
            flags: hw.flags,
        };

        match db_modules.iter().find(|m| m.device_id == hw.device_id) {
            Some(db) if db.name != hw.name || db.position != hw.position => {
                store.update_module(&record).await?;
                stats.modules_updated += 1;
            }
            Some(_) => {}
            None => {
                store.insert_module(&record).await?;
                stats.modules_inserted += 1;
            }
        }

        sync_sensors(store, hw, filter, &mut stats).await?;
    }

    if !stats.is_empty() {
        debug!(station_id, ?stats, "modules reconciled");
    }
    Ok(stats)
}

async fn sync_sensors(
    store: &dyn StationStore,
    module: &ModuleInfo,
    filter: InternalFilter,
    stats: &mut SyncStats,
) -> Result<(), StoreError> {
    let hw_sensors: Vec<&SensorInfo> = module
        .sensors
        .iter()
        .filter(|s| filter.keeps_sensor(s))
        .collect();
    let db_sensors = store.get_sensors(&module.device_id).await?;

    let hw_names: HashSet<&str> = hw_sensors.iter().map(|s| s.name.as_str()).collect();
    let db_names: HashSet<&str> = db_sensors.iter().map(|s| s.name.as_str()).collect();

    for sensor in db_sensors.iter().filter(|s| !hw_names.contains(s.name.as_str())) {
        if let Some(id) = sensor.id {
            store.remove_sensor(id).await?;
            stats.sensors_removed += 1;
        }
    }

    for sensor in hw_sensors.iter().filter(|s| !db_names.contains(s.name.as_str())) {
        store
            .insert_sensor(&SensorRecord {
                id: None,
                module_device_id: module.device_id.clone(),
                name: sensor.name.clone(),
                unit: sensor.unit_of_measure.clone(),
                frequency: sensor.frequency,
                current_reading: None,
            })
            .await?;
        stats.sensors_inserted += 1;
    }

    Ok(())
}

//! The station monitor.
//!
//! Owns the canonical station set. Every connected station runs one poll
//! loop that takes readings on first contact and while the station is being
//! viewed, and asks for status otherwise. Each reply is reconciled against
//! the store and the sorted station list is republished to subscribers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use station_discovery::{DiscoveryEvent, Subscribers};
use station_query::{Locate, QueryClient, StationReply};
use station_store::{now_ms, StationStore};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::reconcile::{sync_modules, InternalFilter};
use crate::station::{readings_from, sort_stations, Station, StationStatus};

/// GPS value stations report when they have no fix.
const NO_FIX: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// A connected station silent for longer than this is deactivated.
    pub station_timeout: Duration,
    /// Delay between poll cycles, whatever the previous outcome.
    pub poll_interval: Duration,
    pub include_internal_modules: bool,
    pub include_internal_sensors: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            station_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(10),
            include_internal_modules: false,
            include_internal_sensors: false,
        }
    }
}

impl MonitorConfig {
    fn internal_filter(&self) -> InternalFilter {
        InternalFilter {
            include_internal_modules: self.include_internal_modules,
            include_internal_sensors: self.include_internal_sensors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhoneLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Default)]
struct MonitorState {
    stations: HashMap<String, Station>,
    /// URLs of stations being viewed live.
    active_urls: Vec<String>,
    phone: Option<PhoneLocation>,
    /// Activation epoch per station; a poll loop exits once its epoch is
    /// no longer current.
    poll_epochs: HashMap<String, u64>,
    next_epoch: u64,
}

struct Inner {
    store: Arc<dyn StationStore>,
    query: Arc<QueryClient>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    subscribers: Subscribers<Vec<Station>>,
}

#[derive(Clone)]
pub struct StationMonitor {
    inner: Arc<Inner>,
}

enum PollPlan {
    Readings(Station),
    Status(Station, Option<Locate>),
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A reported coordinate, or `None` when the station has no fix.
fn reported(value: f32) -> Option<f64> {
    let value = f64::from(value);
    if value == 0.0 || value == NO_FIX {
        None
    } else {
        Some((value * 1e6).round() / 1e6)
    }
}

/// Recording start in unix ms. `None` when not started or not representable.
fn recording_started(reply: &StationReply) -> Option<i64> {
    match reply.status.recording.started_time {
        0 => None,
        secs => i64::try_from(secs).ok()?.checked_mul(1000),
    }
}

impl StationMonitor {
    pub fn new(store: Arc<dyn StationStore>, query: Arc<QueryClient>, config: MonitorConfig) -> Self {
        info!("station monitor created");
        Self {
            inner: Arc::new(Inner {
                store,
                query,
                config,
                state: Mutex::new(MonitorState::default()),
                subscribers: Subscribers::new(),
            }),
        }
    }

    pub fn query(&self) -> &Arc<QueryClient> {
        &self.inner.query
    }

    async fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.state.lock().await
    }

    fn publish(&self, state: &mut MonitorState) {
        let stations = sort_stations(state.stations.values_mut());
        let connected = stations.iter().filter(|s| s.connected).count();
        info!(total = stations.len(), connected, "publishing updated");
        self.inner.subscribers.publish(stations);
    }

    /// Load every stored station. All start disconnected and never seen,
    /// until discovery finds them.
    pub async fn initialize(&self) -> Result<usize> {
        let records = self.inner.store.get_all_stations().await?;
        let mut state = self.state().await;
        for record in &records {
            state
                .stations
                .entry(record.device_id.clone())
                .or_insert_with(|| Station::from_record(record));
        }
        info!(count = records.len(), "stations loaded from store");
        Ok(records.len())
    }

    /// Receive the sorted station list now and after every change.
    pub async fn subscribe_all(&self) -> UnboundedReceiver<Vec<Station>> {
        let mut state = self.state().await;
        let snapshot = sort_stations(state.stations.values_mut());
        self.inner.subscribers.subscribe_with([snapshot])
    }

    /// Consume discovery events: found stations are checked against the
    /// store, lost ones deactivated.
    pub fn subscribe_to_discovery(
        &self,
        mut events: UnboundedReceiver<DiscoveryEvent>,
    ) -> JoinHandle<()> {
        info!("subscribing to station discovery");
        let monitor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    DiscoveryEvent::StationFound(found) => {
                        let monitor = monitor.clone();
                        tokio::spawn(async move {
                            if let Err(e) = monitor.check_database(&found.device_id, &found.url).await
                            {
                                warn!(url = %found.url, "check database failed: {e}");
                            }
                        });
                    }
                    DiscoveryEvent::StationLost(lost) => {
                        monitor.deactivate_station(&lost.device_id).await;
                    }
                }
            }
            debug!("discovery stream closed");
        })
    }

    pub async fn get_stations(&self) -> Vec<Station> {
        let mut state = self.state().await;
        sort_stations(state.stations.values_mut())
    }

    pub async fn get_station(&self, device_id: &str) -> Option<Station> {
        self.state().await.stations.get(device_id).cloned()
    }

    pub async fn get_station_readings(&self, device_id: &str) -> Option<BTreeMap<String, f32>> {
        self.state()
            .await
            .stations
            .get(device_id)
            .map(|s| s.readings.clone())
    }

    /// Forget every station. Running poll loops exit on their next cycle.
    pub async fn clear_stations(&self) {
        let mut state = self.state().await;
        state.stations.clear();
        state.active_urls.clear();
        state.poll_epochs.clear();
    }

    pub async fn start_live_readings(&self, url: &str) {
        let mut state = self.state().await;
        if !state.active_urls.iter().any(|u| u == url) {
            state.active_urls.push(url.to_string());
        }
    }

    pub async fn stop_live_readings(&self, url: &str) {
        self.state().await.active_urls.retain(|u| u != url);
    }

    pub async fn save_phone_location(&self, location: PhoneLocation) {
        info!(
            latitude = location.latitude,
            longitude = location.longitude,
            "new phone location"
        );
        self.state().await.phone = Some(location);
    }

    pub async fn phone_location(&self) -> Option<PhoneLocation> {
        self.state().await.phone
    }

    /// Query a found station and either add it to the store or reactivate
    /// the stored copy.
    pub async fn check_database(&self, device_id: &str, url: &str) -> Result<()> {
        let reply = self.inner.query.get_status(url, None).await?;
        if reply.has_errors() {
            return Err(reply_errors(&reply));
        }

        match self.inner.store.get_station_by_device_id(device_id).await? {
            None => self.add_to_database(device_id, url, reply).await,
            Some(record) => {
                let mut station = Station::from_record(&record);
                station.name = reply.status.identity.device.clone();
                station.url = url.to_string();
                self.reactivate_station(station).await
            }
        }
    }

    async fn add_to_database(&self, device_id: &str, url: &str, reply: StationReply) -> Result<()> {
        let phone = self.state().await.phone;
        let status = &reply.status;

        let mut station = Station {
            id: None,
            device_id: device_id.to_string(),
            generation_id: status.identity.generation_id.clone(),
            name: status.identity.device.clone(),
            url: url.to_string(),
            connected: true,
            last_seen: None,
            status: StationStatus::from_recording(status.recording.enabled),
            deploy_start_time: recording_started(&reply),
            interval: reply.schedules.readings.interval,
            battery_level: status.power.battery.percentage,
            latitude: reported(status.gps.latitude).or(phone.map(|p| p.latitude)),
            longitude: reported(status.gps.longitude).or(phone.map(|p| p.longitude)),
            consumed_memory: status.memory.data_memory_used,
            total_memory: status.memory.data_memory_installed,
            consumed_memory_percent: status.memory.data_memory_consumption,
            readings: BTreeMap::new(),
            status_json: None,
            serialized_status: reply.serialized.clone(),
            newly_connected: false,
            sorted_index: String::new(),
        };

        let id = self.inner.store.insert_station(&station.to_record()).await?;
        station.id = Some(id);
        info!(device_id, id, name = %station.name, "station added");

        sync_modules(
            self.inner.store.as_ref(),
            id,
            &reply.modules,
            self.inner.config.internal_filter(),
        )
        .await?;

        station.status_json = Some(reply);
        self.activate_station(station).await;
        Ok(())
    }

    /// Merge a stored station back into the live set with its current URL
    /// and name, persist them, and activate it.
    pub async fn reactivate_station(&self, station: Station) -> Result<()> {
        info!(name = %station.name, "re-activating station");
        let record = {
            let mut state = self.state().await;
            let live = state
                .stations
                .entry(station.device_id.clone())
                .or_insert_with(|| station.clone());
            live.name = station.name.clone();
            live.url = station.url.clone();
            if live.id.is_none() {
                live.id = station.id;
            }
            live.to_record()
        };

        self.inner.store.upsert_station(&record).await?;

        let mut state = self.state().await;
        let live = state.stations.get(&station.device_id).cloned();
        match live {
            Some(live) => {
                drop(state);
                self.activate_station(live).await;
            }
            None => {
                // Cleared while the store write was in flight.
                debug!(device_id = %station.device_id, "station cleared before reactivation");
                state.poll_epochs.remove(&station.device_id);
            }
        }
        Ok(())
    }

    /// Mark `station` connected and seen now, pin it to the top of the next
    /// list, and start its poll loop.
    pub async fn activate_station(&self, mut station: Station) {
        info!(name = %station.name, "activating station");
        station.last_seen = Some(now_ms());
        station.connected = true;
        station.newly_connected = true;

        let device_id = station.device_id.clone();
        let epoch = {
            let mut state = self.state().await;
            state.stations.insert(device_id.clone(), station);
            state.next_epoch += 1;
            let epoch = state.next_epoch;
            state.poll_epochs.insert(device_id.clone(), epoch);
            self.publish(&mut state);
            epoch
        };

        self.spawn_poll_loop(device_id, epoch);
    }

    /// Mark a station disconnected and never seen. Returns whether the
    /// station was known.
    pub async fn deactivate_station(&self, device_id: &str) -> bool {
        let mut state = self.state().await;
        let known = Self::deactivate_locked(&mut state, device_id);
        if known {
            self.publish(&mut state);
        }
        known
    }

    fn deactivate_locked(state: &mut MonitorState, device_id: &str) -> bool {
        match state.stations.get_mut(device_id) {
            Some(station) => {
                info!(name = %station.name, "deactivating station");
                station.connected = false;
                station.last_seen = None;
                true
            }
            None => false,
        }
    }

    pub async fn start_recording(&self, url: &str) -> Result<StationReply> {
        let reply = self.inner.query.start_data_recording(url).await?;
        self.recording_status_change(url, true).await;
        Ok(reply)
    }

    pub async fn stop_recording(&self, url: &str) -> Result<StationReply> {
        let reply = self.inner.query.stop_data_recording(url).await?;
        self.recording_status_change(url, false).await;
        Ok(reply)
    }

    pub async fn recording_status_change(&self, url: &str, recording: bool) {
        let mut state = self.state().await;
        let Some(station) = state.stations.values_mut().find(|s| s.url == url) else {
            return;
        };
        station.status = StationStatus::from_recording(recording);
        self.publish(&mut state);
    }

    fn spawn_poll_loop(&self, device_id: String, epoch: u64) {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut take_readings = true;
            while monitor.poll_once(&device_id, epoch, take_readings).await {
                take_readings = false;
                tokio::time::sleep(monitor.inner.config.poll_interval).await;
            }
            debug!(device_id, epoch, "poll loop finished");
        });
    }

    /// One poll cycle. Returns whether the loop should keep going.
    async fn poll_once(&self, device_id: &str, epoch: u64, take_readings: bool) -> bool {
        let plan = {
            let mut state = self.state().await;
            if state.poll_epochs.get(device_id) != Some(&epoch) {
                return false;
            }
            let Some(station) = state.stations.get(device_id) else {
                return false;
            };

            let timeout_ms = self.inner.config.station_timeout.as_millis() as i64;
            if let Some(seen) = station.last_seen {
                if now_ms() - seen > timeout_ms {
                    info!(device_id, "station inactive, deactivating");
                    Self::deactivate_locked(&mut state, device_id);
                    self.publish(&mut state);
                    return false;
                }
            }
            if !station.connected {
                return false;
            }

            let station = station.clone();
            if take_readings || state.active_urls.contains(&station.url) {
                PollPlan::Readings(station)
            } else {
                let locate = station
                    .latitude
                    .zip(station.longitude)
                    .or_else(|| state.phone.map(|p| (p.latitude, p.longitude)))
                    .map(|(latitude, longitude)| Locate {
                        latitude: latitude as f32,
                        longitude: longitude as f32,
                        time: unix_secs(),
                    });
                PollPlan::Status(station, locate)
            }
        };

        let outcome = match plan {
            PollPlan::Readings(station) => match self.inner.query.take_readings(&station.url).await {
                Ok(reply) => self.update_station_readings(&station, reply).await,
                Err(e) => Err(e.into()),
            },
            PollPlan::Status(station, locate) => {
                match self.inner.query.get_status(&station.url, locate).await {
                    Ok(reply) => self.update_status(&station, reply).await,
                    Err(e) => Err(e.into()),
                }
            }
        };

        if let Err(e) = outcome {
            warn!(device_id, "poll cycle failed: {e}");
        }
        true
    }

    pub async fn update_status(&self, station: &Station, reply: StationReply) -> Result<()> {
        self.apply_reply(station, reply, false).await
    }

    pub async fn update_station_readings(&self, station: &Station, reply: StationReply) -> Result<()> {
        self.apply_reply(station, reply, true).await
    }

    async fn apply_reply(&self, target: &Station, reply: StationReply, with_readings: bool) -> Result<()> {
        if reply.has_errors() {
            return Err(reply_errors(&reply));
        }
        if reply.device_id() != target.device_id {
            return Err(MonitorError::ProtocolMismatch {
                expected: target.device_id.clone(),
                actual: reply.device_id().to_string(),
            });
        }

        let known = self.state().await.stations.contains_key(&target.device_id);
        if !known {
            return self.check_database(&target.device_id, &target.url).await;
        }

        let (record, clear_notes) = {
            let mut state = self.state().await;
            let station = state
                .stations
                .get_mut(&target.device_id)
                .ok_or_else(|| MonitorError::UnknownStation(target.device_id.clone()))?;

            let status = &reply.status;
            station.connected = true;
            station.last_seen = Some(now_ms());
            station.name = status.identity.device.clone();
            station.status = StationStatus::from_recording(status.recording.enabled);
            station.deploy_start_time = recording_started(&reply);
            station.battery_level = status.power.battery.percentage;
            station.consumed_memory = status.memory.data_memory_used;
            station.total_memory = status.memory.data_memory_installed;
            station.consumed_memory_percent = status.memory.data_memory_consumption;
            if reply.schedules.readings.interval > 0 {
                station.interval = reply.schedules.readings.interval;
            }
            station.serialized_status = reply.serialized.clone();

            let mut clear_notes = false;
            if status.identity.generation_id != station.generation_id {
                station.generation_id = status.identity.generation_id.clone();
                // New generation while idle: possibly a factory reset.
                clear_notes = !station.is_recording();
            }

            if with_readings {
                station.readings = readings_from(&reply);
            }
            station.status_json = Some(reply.clone());

            (station.to_record(), clear_notes)
        };

        if clear_notes {
            if let Some(id) = record.id {
                info!(device_id = %record.device_id, "generation changed, clearing deploy notes");
                self.inner.store.clear_deploy_notes(id).await?;
            }
        }

        let station_id = self.inner.store.upsert_station(&record).await?;
        if record.id.is_none() {
            if let Some(station) = self.state().await.stations.get_mut(&record.device_id) {
                station.id = Some(station_id);
            }
        }

        sync_modules(
            self.inner.store.as_ref(),
            station_id,
            &reply.modules,
            self.inner.config.internal_filter(),
        )
        .await?;

        let mut state = self.state().await;
        self.publish(&mut state);
        Ok(())
    }
}

fn reply_errors(reply: &StationReply) -> MonitorError {
    MonitorError::ReplyErrors(reply.errors.iter().map(|e| e.message.clone()).collect())
}

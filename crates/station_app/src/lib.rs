//! Daemon wiring: configuration and the discovery sources besides mDNS.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use station_discovery::{DiscoveryConfig, DiscoveryEngine};
use station_monitor::MonitorConfig;
use station_proto::{station_url, ServiceEvent};
use station_query::{QueryClient, QueryConfig, StationFilter};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const CONFIG_FILE: &str = "fieldkit.toml";

/// Address a station answers on while it is its own access point.
pub const AP_MODE_HOST: &str = "192.168.2.1";

pub const ANNOUNCE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_loss_buffer_ms")]
    pub loss_buffer_ms: u64,
    #[serde(default = "default_station_timeout_ms")]
    pub station_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Unbounded when absent.
    #[serde(default)]
    pub max_busy_retries: Option<u32>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub include_internal_modules: bool,
    #[serde(default)]
    pub include_internal_sensors: bool,
    #[serde(default = "default_true")]
    pub enable_mdns: bool,
    #[serde(default = "default_true")]
    pub probe_ap_mode: bool,
    /// Station URLs that are never queried.
    #[serde(default)]
    pub denied_urls: Vec<String>,
    #[serde(default)]
    pub discover: DiscoverConfig,
}

/// Stations announced as found on a timer, for networks without mDNS.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub stations: Vec<PreconfiguredStation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreconfiguredStation {
    pub device_id: String,
    pub address: String,
    #[serde(default = "default_station_port")]
    pub port: u16,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/fieldkit.db")
}
fn default_loss_buffer_ms() -> u64 {
    2000
}
fn default_station_timeout_ms() -> u64 {
    90_000
}
fn default_poll_interval_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_station_port() -> u16 {
    80
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            loss_buffer_ms: default_loss_buffer_ms(),
            station_timeout_ms: default_station_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_busy_retries: None,
            request_timeout_ms: default_request_timeout_ms(),
            include_internal_modules: false,
            include_internal_sensors: false,
            enable_mdns: true,
            probe_ap_mode: true,
            denied_urls: Vec::new(),
            discover: DiscoverConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            loss_buffer: Duration::from_millis(self.loss_buffer_ms),
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            max_busy_retries: self.max_busy_retries,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            station_timeout: Duration::from_millis(self.station_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            include_internal_modules: self.include_internal_modules,
            include_internal_sensors: self.include_internal_sensors,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn station_filter(&self) -> StationFilter {
        if self.denied_urls.is_empty() {
            StationFilter::allow_all()
        } else {
            StationFilter::deny_urls(self.denied_urls.iter().cloned())
        }
    }

    /// Preconfigured stations, if announcing them is enabled.
    pub fn preconfigured_stations(&self) -> &[PreconfiguredStation] {
        if self.discover.enabled {
            &self.discover.stations
        } else {
            &[]
        }
    }
}

/// Read the config at `path`, or the defaults when there is no file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    } else {
        Ok(AppConfig::default())
    }
}

/// Report every preconfigured station as found. Returns how many were
/// accepted by the engine.
pub async fn announce_preconfigured(
    engine: &DiscoveryEngine,
    stations: &[PreconfiguredStation],
) -> usize {
    let mut announced = 0;
    for station in stations {
        let evt = ServiceEvent::found(&station.device_id, &station.address, station.port);
        match engine.on_found_service(evt).await {
            Ok(()) => announced += 1,
            Err(e) => warn!(device_id = %station.device_id, "preconfigured announce failed: {e}"),
        }
    }
    announced
}

/// Re-announce `stations` every `period`, starting immediately.
pub fn spawn_preconfigured_announcer(
    engine: DiscoveryEngine,
    stations: Vec<PreconfiguredStation>,
    period: Duration,
) -> JoinHandle<()> {
    info!(count = stations.len(), "announcing preconfigured stations");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            announce_preconfigured(&engine, &stations).await;
        }
    })
}

/// Look for a station serving its own access point at `host`. A station
/// that answers is reported as found under the device id it returns.
pub async fn probe_fixed_address(
    query: &QueryClient,
    engine: &DiscoveryEngine,
    host: &str,
) -> Result<bool> {
    let url = station_url(host, default_station_port());
    let reply = match query.get_status(&url, None).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!(%url, "no station in ap mode: {e}");
            return Ok(false);
        }
    };

    let device_id = reply.device_id().to_string();
    if device_id.is_empty() {
        debug!(%url, "ap mode reply without identity");
        return Ok(false);
    }

    info!(%device_id, name = %reply.status.identity.device, "found station in ap mode");
    engine
        .on_found_service(ServiceEvent::found(&device_id, host, default_station_port()))
        .await
        .context("record ap mode station")?;
    Ok(true)
}

//! Station query client.
//!
//! One request at a time per station URL. A second caller for the same URL
//! fails with [`QueryError::Throttled`] instead of queueing. BUSY replies are
//! retried after the sum of their error delays.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use station_proto::app::{
    HttpQuery, HttpReply, Identity, Location, LoraSettings, NetworkInfo, NetworkSettings,
    QueryType, RecordingControl, ReplyType, Schedule, Schedules, Transmission, WifiTransmission,
};
use station_proto::codec::{decode_reply, encode_query};
use station_store::History;
use tracing::{debug, info, warn};

use crate::error::{QueryError, Result};
use crate::filter::StationFilter;
use crate::reply::StationReply;
use crate::transport::Transport;

/// Network schedule duration meaning "stay connected".
pub const ALWAYS_ON: u32 = 0xffff_ffff;

#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    /// Maximum BUSY retries per call. `None` retries for as long as the
    /// station keeps asking for a nonzero delay.
    pub max_busy_retries: Option<u32>,
}

/// Phone position sent along with a status query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Locate {
    pub latitude: f32,
    pub longitude: f32,
    pub time: u64,
}

/// Wi-Fi network credentials pushed to a station.
#[derive(Debug, Clone, PartialEq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub password: String,
    pub preferred: bool,
}

pub struct QueryClient {
    transport: Arc<dyn Transport>,
    history: Arc<dyn History>,
    filter: StationFilter,
    config: QueryConfig,
    open_queries: Mutex<HashSet<String>>,
}

/// Marks a URL outstanding until dropped.
struct OpenQuery<'a> {
    ledger: &'a Mutex<HashSet<String>>,
    url: String,
}

impl Drop for OpenQuery<'_> {
    fn drop(&mut self) {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        ledger.remove(&self.url);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn query(kind: QueryType) -> HttpQuery {
    HttpQuery {
        r#type: kind as i32,
        time: unix_now(),
        ..Default::default()
    }
}

impl QueryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        history: Arc<dyn History>,
        filter: StationFilter,
        config: QueryConfig,
    ) -> Self {
        Self {
            transport,
            history,
            filter,
            config,
            open_queries: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_outstanding(&self, url: &str) -> bool {
        self.ledger().contains(url)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.open_queries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, url: &str) -> Result<OpenQuery<'_>> {
        let mut ledger = self.ledger();
        if !ledger.insert(url.to_string()) {
            return Err(QueryError::Throttled);
        }
        Ok(OpenQuery {
            ledger: &self.open_queries,
            url: url.to_string(),
        })
    }

    pub async fn get_status(&self, url: &str, locate: Option<Locate>) -> Result<StationReply> {
        let mut message = query(QueryType::QueryStatus);
        message.locate = locate.map(|l| Location {
            modifying: true,
            latitude: l.latitude,
            longitude: l.longitude,
            time: l.time,
        });
        self.station_query(url, &message).await
    }

    pub async fn take_readings(&self, url: &str) -> Result<StationReply> {
        self.station_query(url, &query(QueryType::QueryTakeReadings))
            .await
    }

    pub async fn start_data_recording(&self, url: &str) -> Result<StationReply> {
        let mut message = query(QueryType::QueryRecordingControl);
        message.recording = Some(RecordingControl {
            modifying: true,
            enabled: true,
        });
        self.station_query(url, &message).await
    }

    pub async fn stop_data_recording(&self, url: &str) -> Result<StationReply> {
        let mut message = query(QueryType::QueryRecordingControl);
        message.recording = Some(RecordingControl {
            modifying: true,
            enabled: false,
        });
        self.station_query(url, &message).await
    }

    /// Set the station's own sampling interval, in seconds.
    pub async fn set_station_interval(&self, url: &str, interval: u32) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.schedules = Some(Schedules {
            modifying: true,
            readings: Some(Schedule {
                interval,
                duration: 0,
            }),
            ..Default::default()
        });
        self.station_query(url, &message).await
    }

    pub async fn set_station_upload_schedule(
        &self,
        url: &str,
        duration: u32,
    ) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.schedules = Some(Schedules {
            modifying: true,
            network: Some(Schedule {
                interval: 0,
                duration,
            }),
            ..Default::default()
        });
        self.station_query(url, &message).await
    }

    pub async fn send_network_settings(
        &self,
        url: &str,
        networks: &[WifiNetwork],
    ) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.network_settings = Some(NetworkSettings {
            create_access_point: 0,
            networks: networks
                .iter()
                .map(|n| NetworkInfo {
                    ssid: n.ssid.clone(),
                    password: n.password.clone(),
                    create: false,
                    preferred: n.preferred,
                    keeping: false,
                })
                .collect(),
        });
        self.station_query(url, &message).await
    }

    pub async fn send_lora_settings(
        &self,
        url: &str,
        app_eui: &[u8],
        app_key: &[u8],
    ) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.lora_settings = Some(LoraSettings {
            app_eui: app_eui.to_vec(),
            app_key: app_key.to_vec(),
            device_eui: Vec::new(),
        });
        self.station_query(url, &message).await
    }

    pub async fn configure_name(&self, url: &str, name: &str) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.identity = Some(Identity {
            name: name.to_string(),
            ..Default::default()
        });
        self.station_query(url, &message).await
    }

    /// Stop the station uploading on its own; the app collects data instead.
    pub async fn upload_via_app(&self, url: &str) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.transmission = Some(Transmission {
            wifi: Some(WifiTransmission {
                modifying: true,
                enabled: false,
                ..Default::default()
            }),
        });
        self.station_query(url, &message).await
    }

    /// Have the station upload directly to `transmission_url`, keeping its
    /// network up permanently.
    pub async fn upload_over_wifi(
        &self,
        url: &str,
        transmission_url: &str,
        token: &str,
    ) -> Result<StationReply> {
        let mut message = query(QueryType::QueryConfigure);
        message.transmission = Some(Transmission {
            wifi: Some(WifiTransmission {
                modifying: true,
                url: transmission_url.to_string(),
                token: token.to_string(),
                enabled: true,
            }),
        });
        message.schedules = Some(Schedules {
            modifying: true,
            network: Some(Schedule {
                interval: 0,
                duration: ALWAYS_ON,
            }),
            ..Default::default()
        });
        self.station_query(url, &message).await
    }

    /// Send `message` to `url` and return the normalized reply, retrying
    /// while the station answers BUSY with a nonzero delay.
    pub async fn station_query(&self, url: &str, message: &HttpQuery) -> Result<StationReply> {
        let mut retries = 0u32;
        loop {
            let Some((reply, body)) = self.query_once(url, message).await? else {
                return Ok(StationReply::empty());
            };

            if reply.reply_type() != ReplyType::ReplyBusy {
                debug!(url, reply_type = ?reply.reply_type(), "query success");
                return Ok(StationReply::normalize(&reply, body));
            }

            let delay: u64 = reply.errors.iter().map(|e| u64::from(e.delay)).sum();
            if delay == 0 {
                warn!(url, "busy reply without delay");
                return Err(QueryError::Busy);
            }
            if let Some(max) = self.config.max_busy_retries {
                if retries >= max {
                    warn!(url, retries, "giving up on busy station");
                    return Err(QueryError::BusyRetriesExhausted(retries));
                }
            }

            retries += 1;
            info!(url, delay_ms = delay, "retrying after");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// One request/response exchange. `None` for an empty body.
    async fn query_once(
        &self,
        url: &str,
        message: &HttpQuery,
    ) -> Result<Option<(HttpReply, Bytes)>> {
        if !self.filter.allows(url) {
            return Err(QueryError::Ignored);
        }

        let open = self.open(url)?;
        info!(url, query_type = ?message.query_type(), "querying");

        let response = self
            .transport
            .request(url, encode_query(message))
            .await;
        drop(open);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(url, "query error: {e:#}");
                return Err(QueryError::Transport(e));
            }
        };

        if !(200..300).contains(&response.status_code) {
            warn!(url, status = response.status_code, "query error");
            return Err(QueryError::HttpStatus(response.status_code));
        }

        if response.body.is_empty() {
            info!(url, "query success <empty>");
            return Ok(None);
        }

        let decoded = decode_reply(&response.body)?;
        self.history.on_station_reply(&decoded).await?;
        Ok(Some((decoded, response.body)))
    }
}

//! Debounced station presence.
//!
//! Raw found/lost observations are noisy: a Wi-Fi blip produces a loss
//! immediately followed by a rediscovery. A loss is therefore held for
//! `loss_buffer` before it is final, and a found event for the same key
//! cancels it. At most one pending loss exists per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use station_proto::ServiceEvent;
use station_store::{History, StoreError};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

use crate::subscribers::Subscribers;

const DEFAULT_LOSS_BUFFER: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("history write failed: {0}")]
    History(#[from] StoreError),
    #[error("loss task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long a loss waits for a rediscovery before it is final.
    pub loss_buffer: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            loss_buffer: DEFAULT_LOSS_BUFFER,
        }
    }
}

/// A station as seen on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStation {
    pub device_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub url: String,
}

impl From<&ServiceEvent> for DiscoveredStation {
    fn from(evt: &ServiceEvent) -> Self {
        Self {
            device_id: evt.name.clone(),
            name: evt.name.clone(),
            host: evt.host.clone(),
            port: evt.port,
            url: evt.url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    StationFound(DiscoveredStation),
    StationLost(DiscoveredStation),
}

impl DiscoveryEvent {
    pub fn station(&self) -> &DiscoveredStation {
        match self {
            Self::StationFound(s) | Self::StationLost(s) => s,
        }
    }
}

struct KnownStation {
    station: DiscoveredStation,
    // Bumped on every found event; lets a finalizing loss notice a
    // rediscovery that raced its history write.
    sightings: u64,
}

struct PendingLoss {
    ticket: u64,
    abort: AbortHandle,
}

#[derive(Default)]
struct DiscoveryState {
    stations: HashMap<String, KnownStation>,
    pending: HashMap<String, PendingLoss>,
}

struct Inner {
    history: Arc<dyn History>,
    config: DiscoveryConfig,
    state: Mutex<DiscoveryState>,
    subscribers: Subscribers<DiscoveryEvent>,
    next_ticket: AtomicU64,
}

#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<Inner>,
}

/// Completion of a scheduled loss.
#[must_use = "dropping the handle leaves the loss running but discards its outcome"]
pub struct LossHandle {
    task: JoinHandle<Result<bool>>,
}

impl LossHandle {
    /// `Ok(true)` once a `StationLost` went out, `Ok(false)` when the loss
    /// was cancelled, superseded, or the station was never known.
    pub async fn finalized(self) -> Result<bool> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(false),
            Err(e) => Err(DiscoveryError::Task(e.to_string())),
        }
    }
}

impl DiscoveryEngine {
    pub fn new(history: Arc<dyn History>, config: DiscoveryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                history,
                config,
                state: Mutex::new(DiscoveryState::default()),
                subscribers: Subscribers::new(),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    pub async fn on_found_service(&self, evt: ServiceEvent) -> Result<()> {
        let key = evt.key().to_string();
        let station = DiscoveredStation::from(&evt);

        info!(
            name = %evt.name,
            host = %evt.host,
            port = evt.port,
            "found service"
        );

        {
            let mut state = self.inner.state.lock().await;
            if let Some(pending) = state.pending.remove(&key) {
                info!(name = %evt.name, "cancel pending loss");
                pending.abort.abort();
            }
            let sightings = state
                .stations
                .get(&key)
                .map(|k| k.sightings + 1)
                .unwrap_or(1);
            state.stations.insert(
                key,
                KnownStation {
                    station: station.clone(),
                    sightings,
                },
            );
        }

        self.inner.history.on_found_station(&evt).await?;
        self.inner
            .subscribers
            .publish(DiscoveryEvent::StationFound(station));
        Ok(())
    }

    /// Schedule a loss for `evt`'s key, restarting the buffer window if one
    /// is already pending.
    pub async fn on_lost_service(&self, evt: ServiceEvent) -> LossHandle {
        let key = evt.key().to_string();
        let delay = self.inner.config.loss_buffer;
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);

        info!(
            name = %evt.name,
            delay_ms = delay.as_millis() as u64,
            "lost service (pending)"
        );

        let mut state = self.inner.state.lock().await;
        if let Some(previous) = state.pending.remove(&key) {
            previous.abort.abort();
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.finalize_loss(evt, ticket).await
        });
        state.pending.insert(
            key,
            PendingLoss {
                ticket,
                abort: task.abort_handle(),
            },
        );

        LossHandle { task }
    }

    /// Register for all future events. Every currently known station is
    /// replayed to the new receiver as `StationFound` first.
    pub async fn subscribe_all(&self) -> UnboundedReceiver<DiscoveryEvent> {
        let state = self.inner.state.lock().await;
        let replay: Vec<_> = state
            .stations
            .values()
            .map(|k| {
                info!(name = %k.station.name, "publishing known service");
                DiscoveryEvent::StationFound(k.station.clone())
            })
            .collect();
        self.inner.subscribers.subscribe_with(replay)
    }

    pub async fn known_stations(&self) -> Vec<DiscoveredStation> {
        let state = self.inner.state.lock().await;
        let mut stations: Vec<_> = state.stations.values().map(|k| k.station.clone()).collect();
        stations.sort_by(|a, b| a.name.cmp(&b.name));
        stations
    }

    pub async fn has_pending_loss(&self, key: &str) -> bool {
        self.inner.state.lock().await.pending.contains_key(key)
    }

    /// Start a loss for every known station.
    pub async fn lose_all_stations(&self) -> Vec<LossHandle> {
        let names: Vec<String> = {
            let state = self.inner.state.lock().await;
            state.stations.keys().cloned().collect()
        };
        info!(count = names.len(), "losing connected stations");

        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            handles.push(self.on_lost_service(ServiceEvent::lost(&name)).await);
        }
        handles
    }

    /// Forget every known station and cancel pending losses without
    /// notifying anyone.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        for (_, pending) in state.pending.drain() {
            pending.abort.abort();
        }
        state.stations.clear();
    }
}

impl Inner {
    async fn finalize_loss(&self, evt: ServiceEvent, ticket: u64) -> Result<bool> {
        let key = evt.key().to_string();

        let sightings = {
            let mut state = self.state.lock().await;
            match state.pending.get(&key) {
                Some(p) if p.ticket == ticket => {
                    state.pending.remove(&key);
                }
                _ => return Ok(false),
            }
            state.stations.get(&key).map(|k| k.sightings)
        };

        info!(name = %evt.name, "lost service (final)");

        self.history.on_lost_station(&evt).await?;

        let mut state = self.state.lock().await;
        let Some(known) = state.stations.get(&key) else {
            info!(name = %evt.name, "ignoring station, never seen before");
            return Ok(false);
        };
        if Some(known.sightings) != sightings {
            debug!(name = %evt.name, "rediscovered while loss was finalizing");
            return Ok(false);
        }

        info!(name = %evt.name, "notify station lost");
        let station = known.station.clone();
        self.subscribers
            .publish(DiscoveryEvent::StationLost(station));
        // Only drop the entry once the notification is out.
        state.stations.remove(&key);
        Ok(true)
    }
}

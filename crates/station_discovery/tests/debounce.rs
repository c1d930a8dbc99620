//! Loss debouncing against a recording history, on a paused clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use station_discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryError, DiscoveryEvent};
use station_proto::app::HttpReply;
use station_proto::ServiceEvent;
use station_store::{History, StoreError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingHistory {
    entries: Mutex<Vec<String>>,
    fail_lost: AtomicBool,
}

impl RecordingHistory {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl History for RecordingHistory {
    async fn on_found_station(&self, event: &ServiceEvent) -> station_store::Result<()> {
        self.entries.lock().unwrap().push(format!("found {}", event.name));
        Ok(())
    }

    async fn on_lost_station(&self, event: &ServiceEvent) -> station_store::Result<()> {
        if self.fail_lost.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("history offline".into()));
        }
        self.entries.lock().unwrap().push(format!("lost {}", event.name));
        Ok(())
    }

    async fn on_station_reply(&self, _reply: &HttpReply) -> station_store::Result<()> {
        Ok(())
    }
}

/// Holds every loss write until released, so a found event can land
/// while the write is in flight.
#[derive(Default)]
struct GatedHistory {
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl History for GatedHistory {
    async fn on_found_station(&self, _event: &ServiceEvent) -> station_store::Result<()> {
        Ok(())
    }

    async fn on_lost_station(&self, _event: &ServiceEvent) -> station_store::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn on_station_reply(&self, _reply: &HttpReply) -> station_store::Result<()> {
        Ok(())
    }
}

fn engine_with(loss_buffer: Duration) -> (DiscoveryEngine, Arc<RecordingHistory>) {
    let history = Arc::new(RecordingHistory::default());
    let engine = DiscoveryEngine::new(history.clone(), DiscoveryConfig { loss_buffer });
    (engine, history)
}

fn drain(rx: &mut UnboundedReceiver<DiscoveryEvent>) -> Vec<DiscoveryEvent> {
    let mut out = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        out.push(evt);
    }
    out
}

fn lost_count(events: &[DiscoveryEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, DiscoveryEvent::StationLost(_)))
        .count()
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn loss_is_final_after_buffer() {
    let (engine, history) = engine_with(Duration::from_millis(2000));
    let mut rx = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    let loss = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    settle().await;

    tokio::time::advance(Duration::from_millis(1999)).await;
    settle().await;
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], DiscoveryEvent::StationFound(s) if s.url == "http://10.0.0.5:80/fk/v1"));

    assert!(loss.finalized().await.unwrap());
    let events = drain(&mut rx);
    assert_eq!(lost_count(&events), 1);
    assert!(engine.known_stations().await.is_empty());
    assert_eq!(history.entries(), vec!["found aa01", "lost aa01"]);
}

#[tokio::test(start_paused = true)]
async fn rediscovery_cancels_pending_loss() {
    let (engine, history) = engine_with(Duration::from_millis(2000));
    let mut rx = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    let loss = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    settle().await;
    tokio::time::advance(Duration::from_millis(1000)).await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    assert!(!engine.has_pending_loss("aa01").await);

    assert!(!loss.finalized().await.unwrap());
    tokio::time::advance(Duration::from_millis(5000)).await;
    settle().await;

    let events = drain(&mut rx);
    assert_eq!(lost_count(&events), 0);
    assert_eq!(events.len(), 2);
    assert_eq!(engine.known_stations().await.len(), 1);
    assert!(!history.entries().iter().any(|e| e.starts_with("lost")));
}

#[tokio::test(start_paused = true)]
async fn second_loss_restarts_the_window() {
    let (engine, _history) = engine_with(Duration::from_millis(2000));
    let mut rx = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    let first = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    settle().await;
    tokio::time::advance(Duration::from_millis(1500)).await;

    let second = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    settle().await;
    assert!(!first.finalized().await.unwrap());

    // Past the first deadline, short of the second.
    tokio::time::advance(Duration::from_millis(1000)).await;
    settle().await;
    assert_eq!(lost_count(&drain(&mut rx)), 0);

    assert!(second.finalized().await.unwrap());
    assert_eq!(lost_count(&drain(&mut rx)), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_station_loss_is_recorded_but_not_announced() {
    let (engine, history) = engine_with(Duration::from_millis(2000));
    let mut rx = engine.subscribe_all().await;

    let loss = engine.on_lost_service(ServiceEvent::lost("ghost")).await;
    assert!(!loss.finalized().await.unwrap());

    assert!(drain(&mut rx).is_empty());
    assert_eq!(history.entries(), vec!["lost ghost"]);
}

#[tokio::test]
async fn zero_buffer_loses_immediately() {
    let (engine, _history) = engine_with(Duration::ZERO);
    let mut rx = engine.subscribe_all().await;

    for (name, host) in [("aa01", "10.0.0.5"), ("bb02", "10.0.0.6")] {
        engine
            .on_found_service(ServiceEvent::found(name, host, 80))
            .await
            .unwrap();
    }
    let loss = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    assert!(loss.finalized().await.unwrap());

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(DiscoveryEvent::StationLost(s)) if s.device_id == "aa01"));

    // A later subscriber only hears about the station still present.
    let replayed = drain(&mut engine.subscribe_all().await);
    assert_eq!(replayed.len(), 1);
    assert!(matches!(&replayed[0], DiscoveryEvent::StationFound(s) if s.device_id == "bb02"));
}

#[tokio::test]
async fn rediscovery_during_loss_write_keeps_station() {
    let history = Arc::new(GatedHistory::default());
    let engine = DiscoveryEngine::new(
        history.clone(),
        DiscoveryConfig {
            loss_buffer: Duration::ZERO,
        },
    );
    let mut rx = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    let loss = engine.on_lost_service(ServiceEvent::lost("aa01")).await;

    // The loss is committed and its history write is in flight.
    history.entered.notified().await;
    assert!(!engine.has_pending_loss("aa01").await);
    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.8", 80))
        .await
        .unwrap();
    history.release.notify_one();

    assert!(!loss.finalized().await.unwrap());
    assert_eq!(lost_count(&drain(&mut rx)), 0);

    let known = engine.known_stations().await;
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].url, "http://10.0.0.8:80/fk/v1");
}

#[tokio::test]
async fn failed_history_write_suppresses_notification() {
    let (engine, history) = engine_with(Duration::ZERO);
    let mut rx = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    history.fail_lost.store(true, Ordering::SeqCst);

    let loss = engine.on_lost_service(ServiceEvent::lost("aa01")).await;
    let err = loss.finalized().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::History(_)));

    assert_eq!(lost_count(&drain(&mut rx)), 0);
    assert_eq!(engine.known_stations().await.len(), 1);
}

#[tokio::test]
async fn late_subscriber_gets_known_stations_replayed() {
    let (engine, _history) = engine_with(Duration::from_millis(2000));
    let mut early = engine.subscribe_all().await;

    engine
        .on_found_service(ServiceEvent::found("aa01", "10.0.0.5", 80))
        .await
        .unwrap();
    engine
        .on_found_service(ServiceEvent::found("bb02", "10.0.0.6", 80))
        .await
        .unwrap();

    let mut late = engine.subscribe_all().await;
    let replayed = drain(&mut late);
    assert_eq!(replayed.len(), 2);
    assert!(replayed
        .iter()
        .all(|e| matches!(e, DiscoveryEvent::StationFound(_))));

    // The replay is not re-delivered to existing subscribers.
    assert_eq!(drain(&mut early).len(), 2);
}

#[tokio::test]
async fn lose_all_and_stop() {
    let (engine, _history) = engine_with(Duration::ZERO);
    let mut rx = engine.subscribe_all().await;
    for name in ["aa01", "bb02"] {
        engine
            .on_found_service(ServiceEvent::found(name, "10.0.0.5", 80))
            .await
            .unwrap();
    }

    for loss in engine.lose_all_stations().await {
        assert!(loss.finalized().await.unwrap());
    }
    assert_eq!(lost_count(&drain(&mut rx)), 2);

    engine
        .on_found_service(ServiceEvent::found("cc03", "10.0.0.7", 80))
        .await
        .unwrap();
    engine.stop().await;
    assert!(engine.known_stations().await.is_empty());
}

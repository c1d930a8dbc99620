//! Preconfigured and AP-mode discovery driving a live monitor.

use std::sync::Arc;
use std::time::Duration;

use station_app::{announce_preconfigured, probe_fixed_address, PreconfiguredStation};
use station_discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryEvent};
use station_monitor::{MonitorConfig, StationMonitor};
use station_proto::app::{HttpReply, Identity, ReplyType, Status};
use station_query::{MockTransport, QueryClient, QueryConfig, StationFilter};
use station_store::{History, SqliteStore};

struct Node {
    engine: DiscoveryEngine,
    query: Arc<QueryClient>,
    monitor: StationMonitor,
    transport: Arc<MockTransport>,
}

fn node() -> Node {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let history: Arc<dyn History> = Arc::new(store.history());
    let transport = Arc::new(MockTransport::new());
    let engine = DiscoveryEngine::new(
        history.clone(),
        DiscoveryConfig {
            loss_buffer: Duration::ZERO,
        },
    );
    let query = Arc::new(QueryClient::new(
        transport.clone(),
        history,
        StationFilter::allow_all(),
        QueryConfig::default(),
    ));
    let monitor = StationMonitor::new(store, query.clone(), MonitorConfig::default());
    Node {
        engine,
        query,
        monitor,
        transport,
    }
}

fn status(device_id: &[u8], name: &str) -> HttpReply {
    HttpReply {
        r#type: ReplyType::ReplyStatus as i32,
        status: Some(Status {
            identity: Some(Identity {
                device: name.into(),
                device_id: device_id.to_vec(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn preconfigured_station_reaches_the_monitor() {
    let node = node();
    node.monitor
        .subscribe_to_discovery(node.engine.subscribe_all().await);
    node.transport.push_reply(&status(&[0x00, 0x04, 0xa3], "Sparrow"));

    let stations = vec![PreconfiguredStation {
        device_id: "0004a3".into(),
        address: "10.0.0.5".into(),
        port: 80,
    }];
    assert_eq!(announce_preconfigured(&node.engine, &stations).await, 1);
    tokio::time::sleep(Duration::from_millis(1)).await;

    let station = node.monitor.get_station("0004a3").await.unwrap();
    assert!(station.connected);
    assert_eq!(station.name, "Sparrow");
    assert_eq!(station.url, "http://10.0.0.5:80/fk/v1");

    // Announcing again is harmless.
    assert_eq!(announce_preconfigured(&node.engine, &stations).await, 1);
    assert_eq!(node.engine.known_stations().await.len(), 1);
}

#[tokio::test]
async fn station_in_ap_mode_is_found_by_device_id() {
    let node = node();
    let mut events = node.engine.subscribe_all().await;
    node.transport.push_reply(&status(&[0x00, 0x04, 0xa3], "Sparrow"));

    assert!(probe_fixed_address(&node.query, &node.engine, "192.168.2.1")
        .await
        .unwrap());

    let sent = node.transport.take_sent();
    assert_eq!(sent[0].url, "http://192.168.2.1:80/fk/v1");
    match events.recv().await.unwrap() {
        DiscoveryEvent::StationFound(found) => {
            assert_eq!(found.device_id, "0004a3");
            assert_eq!(found.url, "http://192.168.2.1:80/fk/v1");
        }
        other => panic!("expected found event, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_fixed_address_finds_nothing() {
    let node = node();
    node.transport.push_error("connect timeout");

    assert!(!probe_fixed_address(&node.query, &node.engine, "192.168.2.1")
        .await
        .unwrap());
    assert!(node.engine.known_stations().await.is_empty());
}

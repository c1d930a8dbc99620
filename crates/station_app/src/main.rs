use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mdns_sd::ServiceDaemon;
use tracing_subscriber::EnvFilter;

use station_app::{
    load_config, probe_fixed_address, spawn_preconfigured_announcer, ANNOUNCE_PERIOD,
    AP_MODE_HOST, CONFIG_FILE,
};
use station_discovery::{mdns, DiscoveryEngine};
use station_monitor::StationMonitor;
use station_query::{HttpTransport, QueryClient};
use station_store::{History, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(Path::new(CONFIG_FILE))?;

    tracing::info!("FieldKit station monitor starting...");
    tracing::info!("db_path          = {:?}", config.db_path);
    tracing::info!("loss_buffer_ms   = {}", config.loss_buffer_ms);
    tracing::info!("poll_interval_ms = {}", config.poll_interval_ms);
    tracing::info!("mdns             = {}", config.enable_mdns);

    let store = Arc::new(SqliteStore::open(&config.db_path).context("open station database")?);
    let history: Arc<dyn History> = Arc::new(store.history());

    let engine = DiscoveryEngine::new(history.clone(), config.discovery_config());
    let transport =
        Arc::new(HttpTransport::new(config.request_timeout()).context("create HTTP transport")?);
    let query = Arc::new(QueryClient::new(
        transport,
        history,
        config.station_filter(),
        config.query_config(),
    ));
    let monitor = StationMonitor::new(store, query.clone(), config.monitor_config());

    let loaded = monitor.initialize().await.context("load stored stations")?;
    tracing::info!("{loaded} stored stations");
    monitor.subscribe_to_discovery(engine.subscribe_all().await);

    let mut updates = monitor.subscribe_all().await;
    tokio::spawn(async move {
        while let Some(stations) = updates.recv().await {
            for station in &stations {
                tracing::debug!(
                    "{} {} connected={} status={:?}",
                    station.sorted_index,
                    station.name,
                    station.connected,
                    station.status.as_str()
                );
            }
        }
    });

    let daemon = if config.enable_mdns {
        let daemon = ServiceDaemon::new().context("create mDNS daemon")?;
        mdns::start_browse(&daemon, engine.clone())?;
        tracing::info!("mDNS browsing for {}", mdns::SERVICE_TYPE);
        Some(daemon)
    } else {
        None
    };

    let preconfigured = config.preconfigured_stations().to_vec();
    if !preconfigured.is_empty() {
        spawn_preconfigured_announcer(engine.clone(), preconfigured, ANNOUNCE_PERIOD);
    }

    if config.probe_ap_mode {
        let query = query.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = probe_fixed_address(&query, &engine, AP_MODE_HOST).await {
                tracing::warn!("ap mode probe failed: {e:#}");
            }
        });
    }

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutting down");

    engine.stop().await;
    if let Some(daemon) = daemon {
        if let Err(e) = daemon.shutdown() {
            tracing::debug!("mDNS shutdown: {e}");
        }
    }

    Ok(())
}

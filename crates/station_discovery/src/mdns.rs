//! mDNS browsing for stations using mdns-sd.
//!
//! Stations advertise `_fk._tcp.local.` with their device id as the
//! instance name. Resolved services become found events and removed
//! services become (debounced) losses on the engine.

use std::collections::HashSet;
use std::net::IpAddr;

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent};
use station_proto::ServiceEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::DiscoveryEngine;

pub const SERVICE_TYPE: &str = "_fk._tcp.local.";

/// Instance name from a full service name, e.g.
/// `0004a30b001cc468._fk._tcp.local.` -> `0004a30b001cc468`.
pub fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(SERVICE_TYPE)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
}

/// The address to reach a resolved station on. IPv4 wins over IPv6, and the
/// lowest address wins within a family, so repeated resolutions agree.
pub fn preferred_address(addresses: &HashSet<IpAddr>) -> Option<IpAddr> {
    let v4 = addresses.iter().filter(|a| a.is_ipv4()).min();
    v4.or_else(|| addresses.iter().min()).copied()
}

/// Browse for stations on the LAN and feed the engine.
/// The returned task runs until the daemon's browse channel closes.
pub fn start_browse(
    daemon: &ServiceDaemon,
    engine: DiscoveryEngine,
) -> Result<tokio::task::JoinHandle<()>> {
    let receiver = daemon.browse(SERVICE_TYPE).context("start mDNS browse")?;

    // mdns-sd hands out a blocking receiver; pump it from a blocking thread.
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || {
        while let Ok(event) = receiver.recv() {
            if tx.send(event).is_err() {
                break;
            }
        }
        debug!("mDNS browse channel closed");
    });

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handle_event(&engine, event).await;
        }
    });

    Ok(handle)
}

async fn handle_event(engine: &DiscoveryEngine, event: MdnsEvent) {
    match event {
        MdnsEvent::ServiceResolved(info) => {
            let name = instance_name(info.get_fullname()).to_string();
            let port = info.get_port();
            let Some(addr) = preferred_address(info.get_addresses()).map(|a| a.to_string()) else {
                debug!("mDNS: {name} resolved without an address");
                return;
            };
            if let Err(e) = engine
                .on_found_service(ServiceEvent::found(&name, &addr, port))
                .await
            {
                warn!("mDNS: failed to record found station {name}: {e}");
            }
        }
        MdnsEvent::ServiceRemoved(_type, fullname) => {
            let name = instance_name(&fullname).to_string();
            info!("mDNS: service removed: {name}");
            let loss = engine.on_lost_service(ServiceEvent::lost(&name)).await;
            tokio::spawn(async move {
                if let Err(e) = loss.finalized().await {
                    warn!("mDNS: failed to finalize loss of {name}: {e}");
                }
            });
        }
        MdnsEvent::SearchStarted(_) => {
            debug!("mDNS: browse started");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_is_valid() {
        assert!(SERVICE_TYPE.ends_with(".local."));
        assert!(SERVICE_TYPE.starts_with('_'));
    }

    #[test]
    fn instance_name_strips_service_type() {
        assert_eq!(
            instance_name("0004a30b001cc468._fk._tcp.local."),
            "0004a30b001cc468"
        );
        assert_eq!(instance_name("bare"), "bare");
    }

    fn addresses(list: &[&str]) -> HashSet<IpAddr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn ipv4_is_preferred_on_dual_stack() {
        let addrs = addresses(&["fe80::1ff:fe23:4567", "192.168.1.20", "2001:db8::7", "192.168.1.9"]);
        assert_eq!(
            preferred_address(&addrs),
            Some("192.168.1.9".parse().unwrap())
        );
    }

    #[test]
    fn ipv6_only_station_still_resolves() {
        let addrs = addresses(&["fe80::1ff:fe23:4567"]);
        let addr = preferred_address(&addrs).unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(
            station_proto::station_url(&addr.to_string(), 80),
            "http://[fe80::1ff:fe23:4567]:80/fk/v1"
        );
        assert!(preferred_address(&HashSet::new()).is_none());
    }
}

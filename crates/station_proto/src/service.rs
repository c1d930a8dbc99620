//! Network service records reported by local discovery.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    Found,
    Lost,
}

impl fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found => write!(f, "found"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// A found/lost observation of a `_fk._tcp` service. The service instance
/// name is the station's device id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ServiceEvent {
    pub fn found(name: &str, host: &str, port: u16) -> Self {
        Self {
            kind: ServiceEventKind::Found,
            name: name.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// Loss events usually carry only the name; host and port are blank.
    pub fn lost(name: &str) -> Self {
        Self {
            kind: ServiceEventKind::Lost,
            name: name.to_string(),
            host: String::new(),
            port: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> String {
        station_url(&self.host, self.port)
    }
}

/// Query endpoint for a station at `host:port`. IPv6 hosts are bracketed.
pub fn station_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}/fk/v1")
    } else {
        format!("http://{host}:{port}/fk/v1")
    }
}

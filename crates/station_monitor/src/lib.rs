//! Station liveness monitor.

pub mod error;
pub mod monitor;
pub mod reconcile;
pub mod station;

pub use error::{MonitorError, Result};
pub use monitor::{MonitorConfig, PhoneLocation, StationMonitor};
pub use reconcile::{sync_modules, InternalFilter, SyncStats};
pub use station::{sort_stations, Station, StationStatus};

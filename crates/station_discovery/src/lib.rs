//! Station discovery: mDNS browsing, loss debouncing, and the subscriber
//! registry shared with the liveness monitor.

pub mod engine;
pub mod mdns;
pub mod subscribers;

pub use engine::{
    DiscoveredStation, DiscoveryConfig, DiscoveryEngine, DiscoveryError, DiscoveryEvent,
    LossHandle,
};
pub use subscribers::Subscribers;

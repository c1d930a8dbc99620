//! Station protocol types: the `fk_app` query/reply messages, their
//! length-delimited codec, and discovery service records.

pub mod app;
pub mod codec;
pub mod service;

pub use service::{station_url, ServiceEvent, ServiceEventKind};

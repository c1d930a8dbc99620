//! Station query client: transport seam, URL filter, single-flight
//! requests with BUSY retry, and reply normalization.

pub mod client;
pub mod error;
pub mod filter;
pub mod reply;
pub mod transport;

pub use client::{Locate, QueryClient, QueryConfig, WifiNetwork, ALWAYS_ON};
pub use error::{QueryError, Result};
pub use filter::StationFilter;
pub use reply::{ModuleInfo, SensorInfo, StationReply, StatusInfo};
pub use transport::{HttpTransport, MockTransport, Transport, TransportResponse};

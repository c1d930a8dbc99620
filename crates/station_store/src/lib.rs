//! Station cache (SQLite) and the append-only station history.

pub mod error;
pub mod history;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use history::{History, HistoryEntry, SqliteHistory};
pub use model::{now_ms, ModuleRecord, SensorRecord, StationRecord};
pub use store::{SqliteStore, StationStore};

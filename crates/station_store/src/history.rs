//! Append-only audit trail of discovery observations and station replies.
//!
//! Writes complete before the caller notifies anyone else, so an entry that
//! is missing here was never announced.

use std::sync::{Arc, Mutex, MutexGuard};

use prost::Message;
use rusqlite::{params, Connection};
use station_proto::app::HttpReply;
use station_proto::ServiceEvent;

use crate::error::{Result, StoreError};
use crate::model::now_ms;

#[async_trait::async_trait]
pub trait History: Send + Sync {
    async fn on_found_station(&self, event: &ServiceEvent) -> Result<()>;

    async fn on_lost_station(&self, event: &ServiceEvent) -> Result<()>;

    async fn on_station_reply(&self, reply: &HttpReply) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub event_id: String,
    pub kind: String,
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub reply_type: Option<i32>,
    pub body: Option<Vec<u8>>,
    pub created_at_ms: i64,
}

pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistory {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn append_service(&self, kind: &str, event: &ServiceEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO station_events (event_id, kind, device_id, host, port, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                kind,
                event.name,
                event.host,
                event.port,
                now_ms(),
            ],
        )?;
        tracing::debug!(kind, name = %event.name, "history appended");
        Ok(())
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, kind, device_id, host, port, reply_type, body, created_at_ms
             FROM station_events ORDER BY created_at_ms DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(HistoryEntry {
                event_id: row.get(0)?,
                kind: row.get(1)?,
                device_id: row.get(2)?,
                host: row.get(3)?,
                port: row.get(4)?,
                reply_type: row.get(5)?,
                body: row.get(6)?,
                created_at_ms: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait::async_trait]
impl History for SqliteHistory {
    async fn on_found_station(&self, event: &ServiceEvent) -> Result<()> {
        self.append_service("found", event)
    }

    async fn on_lost_station(&self, event: &ServiceEvent) -> Result<()> {
        self.append_service("lost", event)
    }

    async fn on_station_reply(&self, reply: &HttpReply) -> Result<()> {
        let device_id = reply
            .status
            .as_ref()
            .and_then(|s| s.identity.as_ref())
            .map(|i| hex::encode(&i.device_id))
            .unwrap_or_default();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO station_events (event_id, kind, device_id, reply_type, body, created_at_ms)
             VALUES (?1, 'reply', ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                device_id,
                reply.r#type,
                reply.encode_to_vec(),
                now_ms(),
            ],
        )?;
        Ok(())
    }
}

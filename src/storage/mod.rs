//! Append-only persistence of sensor readings.
//!
//! Readings are never updated or evicted. Every query returns newest first,
//! ordered by the store-assigned timestamp with the row id breaking ties.
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::node::models::{NewReading, NodeId, SensorReading};

/// Number of readings `GET /node-data/{id}` returns
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Database setting that selects the in-process store
pub const IN_MEMORY: &str = ":memory:";

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert with a server-assigned id and timestamp
    async fn append(&self, reading: NewReading) -> Result<SensorReading>;

    /// Up to `limit` readings for one node, newest first; empty if none
    async fn recent_by_node(&self, node_id: NodeId, limit: usize) -> Result<Vec<SensorReading>>;

    /// Entire history, newest first
    async fn all(&self) -> Result<Vec<SensorReading>>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Open the store named by the `[storage] database` setting
pub async fn open_store(database: &str) -> Result<Arc<dyn ReadingStore>> {
    if database == IN_MEMORY {
        log::info!("Using in-memory reading store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::connect(database).await?;
    Ok(Arc::new(store))
}

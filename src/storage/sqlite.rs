use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;

use super::{ReadingStore, Result, StorageError};
use crate::node::models::{NewReading, NodeId, PumpState, SensorReading};

const SELECT_COLUMNS: &str =
    "SELECT id, node_id, moisture, humidity, temperature, pump_status, timestamp FROM node_data";

/// SQLite-backed reading store
pub struct SqliteStore {
    pool: SqlitePool,
    // Serializes appends and keeps timestamps non-decreasing
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl SqliteStore {
    /// Connect (creating the file if needed) and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Each connection to an in-memory database sees its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;

        let last_timestamp = sqlx::query("SELECT timestamp FROM node_data ORDER BY id DESC LIMIT 1")
            .fetch_optional(&pool)
            .await?
            .map(|row| row.try_get::<DateTime<Utc>, _>("timestamp"))
            .transpose()?;

        log::info!("Opened reading store at {}", url);
        Ok(Self {
            pool,
            last_timestamp: Mutex::new(last_timestamp),
        })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL,
                moisture INTEGER NOT NULL,
                humidity REAL NOT NULL,
                temperature REAL NOT NULL,
                pump_status TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_node_data_node_time ON node_data (node_id, timestamp, id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn append(&self, reading: NewReading) -> Result<SensorReading> {
        let mut last = self.last_timestamp.lock().await;
        let now = Utc::now();
        let timestamp = last.map_or(now, |prev| prev.max(now));

        let result = sqlx::query(
            r#"
            INSERT INTO node_data (node_id, moisture, humidity, temperature, pump_status, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(reading.node_id))
        .bind(reading.moisture)
        .bind(reading.humidity)
        .bind(reading.temperature)
        .bind(reading.pump_status.as_str())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        *last = Some(timestamp);
        Ok(reading.into_reading(result.last_insert_rowid(), timestamp))
    }

    async fn recent_by_node(&self, node_id: NodeId, limit: usize) -> Result<Vec<SensorReading>> {
        let sql = format!(
            "{} WHERE node_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(node_id))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(reading_from_row).collect()
    }

    async fn all(&self) -> Result<Vec<SensorReading>> {
        let sql = format!("{} ORDER BY timestamp DESC, id DESC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(reading_from_row).collect()
    }
}

fn reading_from_row(row: &SqliteRow) -> Result<SensorReading> {
    let id: i64 = row.try_get("id")?;
    let raw_node_id: i64 = row.try_get("node_id")?;
    let node_id = NodeId::try_from(raw_node_id).map_err(|_| StorageError::Corrupt {
        id,
        reason: format!("node_id out of range: {}", raw_node_id),
    })?;
    let raw_pump: String = row.try_get("pump_status")?;
    let pump_status = raw_pump.parse::<PumpState>().map_err(|e| StorageError::Corrupt {
        id,
        reason: e.to_string(),
    })?;

    Ok(SensorReading {
        id,
        node_id,
        moisture: row.try_get("moisture")?,
        humidity: row.try_get("humidity")?,
        temperature: row.try_get("temperature")?,
        pump_status,
        timestamp: row.try_get("timestamp")?,
    })
}

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ReadingStore, Result};
use crate::node::models::{NewReading, NodeId, SensorReading};

/// Readings kept in insertion order; timestamps never go backwards
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<SensorReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn append(&self, reading: NewReading) -> Result<SensorReading> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let timestamp = rows.last().map_or(now, |last| last.timestamp.max(now));
        let stored = reading.into_reading(rows.len() as i64 + 1, timestamp);
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn recent_by_node(&self, node_id: NodeId, limit: usize) -> Result<Vec<SensorReading>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.node_id == node_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<SensorReading>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::models::PumpState;

    fn reading(node_id: NodeId, moisture: i64) -> NewReading {
        NewReading::new(node_id, moisture, 50.0, 20.0, PumpState::Off)
    }

    #[tokio::test]
    async fn recent_is_capped_and_newest_first() {
        let store = MemoryStore::new();
        for i in 0..8 {
            store.append(reading(1, i)).await.unwrap();
            store.append(reading(2, 100 + i)).await.unwrap();
        }

        let recent = store.recent_by_node(1, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        let moistures: Vec<i64> = recent.iter().map(|r| r.moisture).collect();
        assert_eq!(moistures, vec![7, 6, 5, 4, 3]);
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(recent.iter().all(|r| r.node_id == 1));
    }

    #[tokio::test]
    async fn unknown_node_has_empty_history() {
        let store = MemoryStore::new();
        store.append(reading(1, 1)).await.unwrap();
        assert!(store.recent_by_node(9, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_returns_everything_newest_first() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.append(reading(1, i)).await.unwrap();
        }
        let all = store.all().await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(store.len().await, 3);
    }
}

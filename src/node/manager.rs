use std::sync::Arc;

use super::models::{FetchStatus, NewReading, NodeFetchReport, NodeId, SensorReading};
use super::{NodeError, Result};
use crate::serial::protocol::{Command, ReplyFrame};
use crate::serial::Correlator;
use crate::storage::ReadingStore;

/// Process-wide entry point for everything that talks to nodes.
/// Shared by the poller and the HTTP handlers.
pub struct NodeManager {
    correlator: Arc<Correlator>,
    store: Arc<dyn ReadingStore>,
    node_ids: Vec<NodeId>,
}

impl NodeManager {
    pub fn new(
        correlator: Arc<Correlator>,
        store: Arc<dyn ReadingStore>,
        node_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            correlator,
            store,
            node_ids,
        }
    }

    /// Statically configured node set polled by the scheduler
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Ask one node for a sensor frame and persist it.
    /// `Ok(None)` means the node did not answer in time.
    pub async fn fetch_node_data(&self, node_id: NodeId) -> Result<Option<SensorReading>> {
        let outcome = self
            .correlator
            .exchange(&Command::RequestData { node_id })
            .await?;

        match outcome.into_frame() {
            Some(ReplyFrame::Sensor(frame)) => {
                let reading = self.store.append(NewReading::from(frame)).await?;
                log::info!(
                    "Data saved for Node {}: M={}, H={}, T={}, P={}",
                    node_id,
                    reading.moisture,
                    reading.humidity,
                    reading.temperature,
                    reading.pump_status
                );
                Ok(Some(reading))
            }
            _ => {
                log::warn!("No response from Node {}", node_id);
                Ok(None)
            }
        }
    }

    /// One live cycle per configured node, in order.
    ///
    /// Link failures are reported per node and do not stop the sweep.
    /// A storage failure aborts it.
    pub async fn fetch_all_nodes(&self) -> Result<Vec<NodeFetchReport>> {
        let mut reports = Vec::with_capacity(self.node_ids.len());
        for &node_id in &self.node_ids {
            let report = match self.fetch_node_data(node_id).await {
                Ok(Some(reading)) => NodeFetchReport {
                    node_id,
                    status: FetchStatus::Success,
                    data: Some(reading),
                    message: None,
                },
                Ok(None) => NodeFetchReport {
                    node_id,
                    status: FetchStatus::NoResponse,
                    data: None,
                    message: Some("No response from node".to_string()),
                },
                Err(NodeError::Serial(e)) => NodeFetchReport {
                    node_id,
                    status: FetchStatus::LinkError,
                    data: None,
                    message: Some(e.to_string()),
                },
                Err(e) => return Err(e),
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// `Ok(None)` when the node stays silent
    pub async fn pump_status(&self, node_id: NodeId) -> Result<Option<bool>> {
        let outcome = self
            .correlator
            .exchange(&Command::RequestPumpStatus { node_id })
            .await?;
        match outcome.into_frame() {
            Some(ReplyFrame::PumpStatus { is_on, .. }) => Ok(Some(is_on)),
            _ => Ok(None),
        }
    }

    /// `Ok(None)` when the tank node stays silent
    pub async fn tank_threshold(&self) -> Result<Option<f64>> {
        let outcome = self
            .correlator
            .exchange(&Command::RequestTankThreshold)
            .await?;
        match outcome.into_frame() {
            Some(ReplyFrame::TankThreshold(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Fire-and-forget pump switch
    pub async fn set_pump(&self, node_id: NodeId, on: bool) -> Result<()> {
        self.correlator
            .exchange(&Command::SetPump { node_id, on })
            .await?;
        log::info!("Pump command sent to Node {}: {}", node_id, if on { "ON" } else { "OFF" });
        Ok(())
    }

    /// Fire-and-forget moisture threshold update
    pub async fn set_threshold(&self, node_id: NodeId, value: i64) -> Result<()> {
        self.correlator
            .exchange(&Command::SetThreshold { node_id, value })
            .await?;
        log::info!("Threshold {} sent to Node {}", value, node_id);
        Ok(())
    }

    /// Store a reading that did not come over the radio
    pub async fn ingest(&self, reading: NewReading) -> Result<SensorReading> {
        Ok(self.store.append(reading).await?)
    }

    pub async fn recent_readings(&self, node_id: NodeId, limit: usize) -> Result<Vec<SensorReading>> {
        Ok(self.store.recent_by_node(node_id, limit).await?)
    }

    pub async fn all_readings(&self) -> Result<Vec<SensorReading>> {
        Ok(self.store.all().await?)
    }
}

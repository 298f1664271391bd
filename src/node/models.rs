use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NodeError, Result};
use crate::serial::protocol::{normalize, SensorFrame};

// Re-export wire-level identifiers
pub use crate::serial::protocol::{NodeId, PumpState};

/// A persisted sensor reading. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub node_id: NodeId,
    pub moisture: i64,
    pub humidity: f64,
    pub temperature: f64,
    pub pump_status: PumpState,
    pub timestamp: DateTime<Utc>,
}

/// Reading waiting for the store to assign its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub node_id: NodeId,
    pub moisture: i64,
    pub humidity: f64,
    pub temperature: f64,
    pub pump_status: PumpState,
}

impl NewReading {
    pub fn new(
        node_id: NodeId,
        moisture: i64,
        humidity: f64,
        temperature: f64,
        pump_status: PumpState,
    ) -> Self {
        Self {
            node_id,
            moisture,
            humidity: normalize(humidity),
            temperature: normalize(temperature),
            pump_status,
        }
    }

    pub fn into_reading(self, id: i64, timestamp: DateTime<Utc>) -> SensorReading {
        SensorReading {
            id,
            node_id: self.node_id,
            moisture: self.moisture,
            humidity: self.humidity,
            temperature: self.temperature,
            pump_status: self.pump_status,
            timestamp,
        }
    }
}

impl From<SensorFrame> for NewReading {
    fn from(frame: SensorFrame) -> Self {
        NewReading::new(
            frame.node_id,
            frame.moisture,
            frame.humidity,
            frame.temperature,
            frame.pump,
        )
    }
}

/// Body of `POST /send-data`
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub node_id: Option<NodeId>,
    pub soil_moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pump_status: Option<PumpState>,
}

impl IngestRequest {
    pub fn validate(self) -> Result<NewReading> {
        let node_id = valid_node_id(self.node_id)?;
        let moisture = required(self.soil_moisture, "soil_moisture")?;
        let temperature = required(self.temperature, "temperature")?;
        let humidity = required(self.humidity, "humidity")?;
        if !moisture.is_finite() {
            return Err(NodeError::Validation("'soil_moisture' must be a finite number".into()));
        }

        Ok(NewReading::new(
            node_id,
            moisture.round() as i64,
            humidity,
            temperature,
            self.pump_status.unwrap_or(PumpState::Off),
        ))
    }
}

/// Body of `POST /set-threshold`
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdRequest {
    pub node_id: Option<NodeId>,
    pub threshold_moisture: Option<i64>,
}

impl ThresholdRequest {
    pub fn validate(self) -> Result<(NodeId, i64)> {
        Ok((
            valid_node_id(self.node_id)?,
            required(self.threshold_moisture, "threshold_moisture")?,
        ))
    }
}

/// Body of `POST /toggle-pump-status`
#[derive(Debug, Clone, Deserialize)]
pub struct PumpToggleRequest {
    pub node_id: Option<NodeId>,
    pub status: Option<bool>,
}

impl PumpToggleRequest {
    pub fn validate(self) -> Result<(NodeId, bool)> {
        Ok((valid_node_id(self.node_id)?, required(self.status, "status")?))
    }
}

/// Per-node result of a live fetch across the configured node set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    NoResponse,
    LinkError,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeFetchReport {
    pub node_id: NodeId,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SensorReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| NodeError::Validation(format!("Missing '{}' parameter", field)))
}

fn valid_node_id(value: Option<NodeId>) -> Result<NodeId> {
    match required(value, "node_id")? {
        0 => Err(NodeError::Validation("'node_id' must be a positive integer".into())),
        id => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_requires_every_measurement() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"node_id": 1, "soil_moisture": 400, "temperature": 20.5}"#)
                .unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing 'humidity' parameter");
    }

    #[test]
    fn ingest_defaults_pump_to_off() {
        let req: IngestRequest = serde_json::from_str(
            r#"{"node_id": 3, "soil_moisture": 401.6, "temperature": 20.5, "humidity": 61}"#,
        )
        .unwrap();
        let reading = req.validate().unwrap();
        assert_eq!(reading.node_id, 3);
        assert_eq!(reading.moisture, 402);
        assert_eq!(reading.pump_status, PumpState::Off);
    }

    #[test]
    fn node_zero_is_rejected() {
        let req = PumpToggleRequest { node_id: Some(0), status: Some(true) };
        assert!(matches!(req.validate(), Err(NodeError::Validation(_))));
    }

    #[test]
    fn new_reading_zeroes_nan() {
        let reading = NewReading::new(1, 10, f64::NAN, f64::NAN, PumpState::On);
        assert_eq!(reading.humidity, 0.0);
        assert_eq!(reading.temperature, 0.0);
    }
}

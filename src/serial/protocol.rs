//! Line protocol spoken over the radio link.
//!
//! Every frame is one newline-terminated text line. Outgoing commands:
//!
//! - `REQUEST_NODE_<id>` asks a node for a sensor frame
//! - `REQUEST_PUMP_NODE_<id>` asks a node for its pump state
//! - `PUMP_NODE_<id>:ON` / `PUMP_NODE_<id>:OFF` switches a pump
//! - `THRESHOLD_NODE_<id>:<int>` sets a moisture threshold
//! - `REQUEST_TANK_THRESHOLD` asks the tank node for its level threshold
//!
//! Replies:
//!
//! - `Node <id> | M:<int>, H:<float>, T:<float>, P:<ON|OFF>`
//! - `PUMP_STATUS_NODE_<id>:<ON|...>`
//! - `TANK_THRESHOLD:<float>`
//!
//! Decoding never fails loudly: anything that does not fit one of the reply
//! shapes becomes [`ReplyFrame::Unparseable`].
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type NodeId = u16;

const PUMP_STATUS_TAG: &str = "PUMP_STATUS_NODE_";
const TANK_THRESHOLD_TAG: &str = "TANK_THRESHOLD";

/// Pump state as carried on the wire and in stored readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpState {
    On,
    Off,
}

impl PumpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpState::On => "ON",
            PumpState::Off => "OFF",
        }
    }
}

impl From<bool> for PumpState {
    fn from(on: bool) -> Self {
        if on {
            PumpState::On
        } else {
            PumpState::Off
        }
    }
}

impl FromStr for PumpState {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(PumpState::On),
            "OFF" => Ok(PumpState::Off),
            other => Err(DecodeError::InvalidPumpToken(other.to_string())),
        }
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a line was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected exactly one '|' delimiter, found {0}")]
    DelimiterCount(usize),

    #[error("missing node id")]
    MissingNodeId,

    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("expected 4 sensor fields, found {0}")]
    FieldCount(usize),

    #[error("{0} field has no ':' separator")]
    MissingSeparator(&'static str),

    #[error("{field} value is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid pump token: {0:?}")]
    InvalidPumpToken(String),

    #[error("line matches no reply shape")]
    UnknownShape,
}

/// One outgoing command. Lives only for a single send/await cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestData { node_id: NodeId },
    RequestPumpStatus { node_id: NodeId },
    SetThreshold { node_id: NodeId, value: i64 },
    SetPump { node_id: NodeId, on: bool },
    RequestTankThreshold,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::RequestData { .. } => "REQUEST_DATA",
            Command::RequestPumpStatus { .. } => "REQUEST_PUMP_STATUS",
            Command::SetThreshold { .. } => "SET_THRESHOLD",
            Command::SetPump { .. } => "SET_PUMP",
            Command::RequestTankThreshold => "REQUEST_TANK_THRESHOLD",
        }
    }

    /// Target node, absent for tank-wide commands
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Command::RequestData { node_id }
            | Command::RequestPumpStatus { node_id }
            | Command::SetThreshold { node_id, .. }
            | Command::SetPump { node_id, .. } => Some(*node_id),
            Command::RequestTankThreshold => None,
        }
    }

    /// Reply shape the correlator waits for; `None` for send-only commands
    pub fn expected_reply(&self) -> Option<ReplyKind> {
        match self {
            Command::RequestData { node_id } => Some(ReplyKind::SensorData(*node_id)),
            Command::RequestPumpStatus { node_id } => Some(ReplyKind::PumpStatus(*node_id)),
            Command::RequestTankThreshold => Some(ReplyKind::TankThreshold),
            Command::SetThreshold { .. } | Command::SetPump { .. } => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::RequestData { node_id } => format!("REQUEST_NODE_{}", node_id),
            Command::RequestPumpStatus { node_id } => format!("REQUEST_PUMP_NODE_{}", node_id),
            Command::SetPump { node_id, on } => {
                format!("PUMP_NODE_{}:{}", node_id, PumpState::from(*on))
            }
            Command::SetThreshold { node_id, value } => {
                format!("THRESHOLD_NODE_{}:{}", node_id, value)
            }
            Command::RequestTankThreshold => "REQUEST_TANK_THRESHOLD".to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Reply shapes a command can wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    SensorData(NodeId),
    PumpStatus(NodeId),
    TankThreshold,
}

/// Decoded sensor frame, NaN already normalized away
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorFrame {
    pub node_id: NodeId,
    pub moisture: i64,
    pub humidity: f64,
    pub temperature: f64,
    pub pump: PumpState,
}

impl SensorFrame {
    /// Render the frame the way a node transmits it
    pub fn encode(&self) -> String {
        format!(
            "Node {} | M:{}, H:{}, T:{}, P:{}",
            self.node_id, self.moisture, self.humidity, self.temperature, self.pump
        )
    }
}

/// A decoded incoming line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyFrame {
    Sensor(SensorFrame),
    PumpStatus { node_id: NodeId, is_on: bool },
    TankThreshold(f64),
    Unparseable(String),
}

impl ReplyFrame {
    pub fn matches(&self, expected: ReplyKind) -> bool {
        match (self, expected) {
            (ReplyFrame::Sensor(frame), ReplyKind::SensorData(id)) => frame.node_id == id,
            (ReplyFrame::PumpStatus { node_id, .. }, ReplyKind::PumpStatus(id)) => *node_id == id,
            (ReplyFrame::TankThreshold(_), ReplyKind::TankThreshold) => true,
            _ => false,
        }
    }
}

/// Classify and decode one received line
pub fn decode(line: &str) -> ReplyFrame {
    let line = line.trim();
    let parsed = if line.contains(PUMP_STATUS_TAG) {
        parse_pump_status(line)
    } else if line.contains(TANK_THRESHOLD_TAG) {
        parse_tank_threshold(line).map(ReplyFrame::TankThreshold)
    } else if line.contains('|') {
        parse_sensor_frame(line).map(ReplyFrame::Sensor)
    } else {
        Err(DecodeError::UnknownShape)
    };

    match parsed {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("Discarding frame {:?}: {}", line, e);
            ReplyFrame::Unparseable(line.to_string())
        }
    }
}

/// `Node <id> | M:<int>, H:<float>, T:<float>, P:<ON|OFF>`
pub fn parse_sensor_frame(line: &str) -> Result<SensorFrame, DecodeError> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 2 {
        return Err(DecodeError::DelimiterCount(parts.len() - 1));
    }

    let id_token = parts[0]
        .split_whitespace()
        .nth(1)
        .ok_or(DecodeError::MissingNodeId)?;
    let node_id = parse_node_id(id_token)?;

    let fields: Vec<&str> = parts[1].split(',').collect();
    if fields.len() != 4 {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let moisture = parse_number::<i64>(field_value(fields[0], "moisture")?, "moisture")?;
    let humidity = parse_number::<f64>(field_value(fields[1], "humidity")?, "humidity")?;
    let temperature =
        parse_number::<f64>(field_value(fields[2], "temperature")?, "temperature")?;
    let pump = field_value(fields[3], "pump")?.parse::<PumpState>()?;

    Ok(SensorFrame {
        node_id,
        moisture,
        humidity: normalize(humidity),
        temperature: normalize(temperature),
        pump,
    })
}

/// `PUMP_STATUS_NODE_<id>:<value>`; anything other than `ON` reads as off
pub fn parse_pump_status(line: &str) -> Result<ReplyFrame, DecodeError> {
    let (head, value) = line
        .split_once(':')
        .ok_or(DecodeError::MissingSeparator("pump status"))?;
    let start = head.find(PUMP_STATUS_TAG).ok_or(DecodeError::MissingNodeId)?;
    let node_id = parse_node_id(head[start + PUMP_STATUS_TAG.len()..].trim())?;

    Ok(ReplyFrame::PumpStatus {
        node_id,
        is_on: value.trim() == "ON",
    })
}

/// `TANK_THRESHOLD:<float>`
pub fn parse_tank_threshold(line: &str) -> Result<f64, DecodeError> {
    let (_, value) = line
        .split_once(':')
        .ok_or(DecodeError::MissingSeparator("tank threshold"))?;
    parse_number::<f64>(value.trim(), "tank threshold")
}

fn parse_node_id(token: &str) -> Result<NodeId, DecodeError> {
    match token.parse::<NodeId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(DecodeError::InvalidNodeId(token.to_string())),
    }
}

fn field_value<'a>(segment: &'a str, field: &'static str) -> Result<&'a str, DecodeError> {
    segment
        .split_once(':')
        .map(|(_, value)| value.trim())
        .ok_or(DecodeError::MissingSeparator(field))
}

fn parse_number<T: FromStr>(value: &str, field: &'static str) -> Result<T, DecodeError> {
    value.parse::<T>().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

pub fn normalize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

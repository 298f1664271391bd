//! Relay configuration.
//!
//! Loaded from a TOML file; every key has a default, so a missing file or a
//! partial file is fine. CLI flags are applied on top by the binary.
//!
//! ```toml
//! [radio]
//! port = "/dev/serial0"
//! baud_rate = 9600
//! mode_lines = "rts-dtr"
//! reply_timeout_secs = 10
//!
//! [nodes]
//! ids = [1, 2]
//!
//! [schedule]
//! node_data_secs = 60
//! pump_status_secs = 120
//! tank_threshold_secs = 300
//!
//! [storage]
//! database = "sqlite://node_data.db"
//!
//! [http]
//! bind = "0.0.0.0:5000"
//! ```
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::node::models::NodeId;
use crate::serial::interface::{BAUD_RATE, DEFAULT_PORT};
use crate::serial::{LinkSettings, ModeLines};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub radio: RadioConfig,
    pub nodes: NodesConfig,
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub port: String,
    pub baud_rate: u32,
    pub mode_lines: ModeLines,
    /// Skip the device entirely and run the mock transport
    pub mock: bool,
    pub reply_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: BAUD_RATE,
            mode_lines: ModeLines::default(),
            mock: false,
            reply_timeout_secs: 10,
            poll_interval_ms: 50,
        }
    }
}

impl RadioConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            port_name: self.port.clone(),
            baud_rate: self.baud_rate,
            mode_lines: self.mode_lines,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesConfig {
    pub ids: Vec<NodeId>,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self { ids: vec![1, 2] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub node_data_secs: u64,
    pub pump_status_secs: u64,
    pub tank_threshold_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_data_secs: 60,
            pump_status_secs: 120,
            tank_threshold_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx SQLite URL, or `:memory:` for the in-process store
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "sqlite://node_data.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Read a config file; `Ok(None)` when there is no file at `path`
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .map(Some)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.ids.is_empty() {
            bail!("nodes.ids must list at least one node");
        }
        if self.nodes.ids.contains(&0) {
            bail!("node ids must be positive");
        }
        if self.radio.baud_rate == 0 {
            bail!("radio.baud_rate must be non-zero");
        }
        if self.radio.reply_timeout_secs == 0 {
            bail!("radio.reply_timeout_secs must be non-zero");
        }
        if self.radio.poll_interval_ms == 0 {
            bail!("radio.poll_interval_ms must be non-zero");
        }
        let s = &self.schedule;
        if s.node_data_secs == 0 || s.pump_status_secs == 0 || s.tank_threshold_secs == 0 {
            bail!("schedule intervals must be non-zero");
        }
        Ok(())
    }
}

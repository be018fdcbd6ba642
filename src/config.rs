//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs the values it changes.

use crate::error::ConfigError;
use crate::nodes::memory::WindowConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Window bounds for the two sides of every join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinWindows {
    pub left: WindowConfig,
    pub right: WindowConfig,
}

/// Instances per node kind. The conflict set always runs as one instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelismConfig {
    pub filter: usize,
    pub join: usize,
    pub terminal: usize,
}

impl Default for ParallelismConfig {
    fn default() -> Self {
        Self { filter: 1, join: 1, terminal: 1 }
    }
}

/// MQTT broker settings, used both for publishing inferred facts and for
/// subscribing to input facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "retestream".to_string(),
            topic: "inferred".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub topic: String,
    pub client_id: String,
    pub message_timeout_ms: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "inferred".to_string(),
            client_id: "retestream".to_string(),
            message_timeout_ms: "5000".to_string(),
        }
    }
}

/// External destinations for inferred facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub file: Option<PathBuf>,
    pub mqtt: Option<MqttConfig>,
    pub kafka: Option<KafkaConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: JoinWindows,
    pub parallelism: ParallelismConfig,
    /// Attempts after the first failed delivery before a message is dropped.
    pub max_redeliveries: u32,
    /// Re-inject accepted inferred facts as new input.
    pub feedback: bool,
    pub sinks: SinkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: JoinWindows::default(),
            parallelism: ParallelismConfig::default(),
            max_redeliveries: 3,
            feedback: true,
            sinks: SinkConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.parallelism;
        if p.filter == 0 || p.join == 0 || p.terminal == 0 {
            return Err(ConfigError::Invalid("parallelism hints must be at least 1".to_string()));
        }
        if self.window.left.capacity == 0 || self.window.right.capacity == 0 {
            return Err(ConfigError::Invalid("window capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Use the same bounds on both join sides.
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = JoinWindows { left: window, right: window };
        self
    }
}

/// Config schema types for the bridge process.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bridge: BridgeSettings,
    pub logging: LoggingConfig,
    /// Hostex logins, keyed by login ID. Values are parsed by the connector
    /// so account-level defaults live next to the code that uses them.
    pub logins: HashMap<String, serde_json::Value>,
}

/// Process-wide bridge behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Human-readable network name shown in logs and startup output.
    pub network_name: String,
    /// Seconds to wait for in-flight tasks on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            network_name: "Hostex".into(),
            shutdown_grace_secs: 10,
        }
    }
}

/// Logging defaults, overridable from the command line and `RUST_LOG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Output logs as JSON instead of human-readable.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

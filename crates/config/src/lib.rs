//! Configuration loading and env substitution for the Hostex bridge.
//!
//! Config files: `hostex-bridge.toml`, `hostex-bridge.yaml`, or `hostex-bridge.json`
//! Searched in `./` then `~/.config/hostex-bridge/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, discover_and_load, find_config_file, find_or_default_config_path, load_config,
    },
    schema::{BridgeConfig, BridgeSettings, LoggingConfig},
};

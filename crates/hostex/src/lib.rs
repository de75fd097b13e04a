//! Hostex connector for the chat bridge.
//!
//! Polls the Hostex messaging API, maps each guest conversation to a portal
//! room, suppresses reflections of messages sent from the bridge, and turns
//! heterogeneous message/attachment payloads into deliverable content parts.

pub mod attachment;
pub mod client;
pub mod commands;
pub mod config;
pub mod connector;
pub mod echo;
pub mod error;
pub mod normalize;
pub mod poller;
pub mod state;
pub mod supervisor;
pub mod sync;
pub mod types;

pub use {
    client::HostexClient,
    commands::Trigger,
    config::HostexAccountConfig,
    connector::HostexConnector,
    error::{Error, Result},
    sync::{PollReport, SyncEngine},
};

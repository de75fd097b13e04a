//! Portal seam between the Hostex connector and the chat bridging framework.
//!
//! The framework owns rooms, ghosts and event transport. This crate only
//! describes what the connector hands over: room create/update signals,
//! message deliveries with normalized content parts, and media uploads.

pub mod error;
pub mod event;
pub mod memory;
pub mod sink;

pub use {
    error::{Error, Result},
    event::{ContentPart, EventSender, MediaKind, PortalKey, RemoteEvent, RoomInfo},
    memory::MemorySink,
    sink::PortalSink,
};

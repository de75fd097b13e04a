//! In-process [`PortalSink`].
//!
//! Rooms come into existence when a `RoomCreate` event is queued and uploads
//! are addressed with `memory://` URIs. A recording sink keeps every event and
//! upload descriptor for inspection; a streaming sink only broadcasts events to
//! subscribers and keeps nothing but the room set.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use {async_trait::async_trait, tokio::sync::broadcast, tracing::debug};

use crate::{
    Error, Result,
    event::{PortalKey, RemoteEvent},
    sink::PortalSink,
};

const EVENT_BROADCAST_CAPACITY: usize = 256;

/// A media upload captured by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub uri: String,
    pub key: PortalKey,
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
}

pub struct MemorySink {
    rooms: RwLock<HashSet<PortalKey>>,
    events: Mutex<Vec<RemoteEvent>>,
    uploads: Mutex<Vec<StoredUpload>>,
    identities: RwLock<HashMap<String, String>>,
    fail_uploads: AtomicBool,
    fail_room_lookup: AtomicBool,
    recording: bool,
    tx: broadcast::Sender<RemoteEvent>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// Sink that records events and uploads until drained.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Sink for long-running processes: events reach subscribers only.
    pub fn streaming() -> Self {
        Self::build(false)
    }

    fn build(recording: bool) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        Self {
            rooms: RwLock::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            identities: RwLock::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            fail_room_lookup: AtomicBool::new(false),
            recording,
            tx,
        }
    }

    /// Mark a room as already existing (e.g. restored by the framework).
    pub fn with_existing_room(self, key: PortalKey) -> Self {
        self.rooms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
        self
    }

    pub fn set_identity(&self, identifier: impl Into<String>, name: impl Into<String>) {
        self.identities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identifier.into(), name.into());
    }

    /// Make subsequent uploads fail with [`Error::Unavailable`].
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent room lookups fail with [`Error::Unavailable`].
    pub fn set_fail_room_lookup(&self, fail: bool) {
        self.fail_room_lookup.store(fail, Ordering::Relaxed);
    }

    /// Receive events as they are queued.
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.tx.subscribe()
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drain and return all recorded events.
    pub fn take_events(&self) -> Vec<RemoteEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn uploads(&self) -> Vec<StoredUpload> {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl PortalSink for MemorySink {
    async fn room_exists(&self, key: &PortalKey) -> Result<bool> {
        if self.fail_room_lookup.load(Ordering::Relaxed) {
            return Err(Error::unavailable("room lookup disabled"));
        }
        Ok(self
            .rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key))
    }

    async fn queue_event(&self, event: RemoteEvent) {
        if let RemoteEvent::RoomCreate { key, .. } = &event {
            self.rooms
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.clone());
        }
        debug!(portal = %event.key(), "queued remote event");
        // No subscribers is fine.
        if !self.recording {
            let _ = self.tx.send(event);
            return;
        }
        let _ = self.tx.send(event.clone());
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    async fn upload_media(
        &self,
        key: &PortalKey,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<String> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(Error::unavailable("media uploads disabled"));
        }
        let uri = format!("memory://{}", uuid::Uuid::new_v4().simple());
        if !self.recording {
            return Ok(uri);
        }
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StoredUpload {
                uri: uri.clone(),
                key: key.clone(),
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                size: data.len(),
            });
        Ok(uri)
    }

    async fn resolve_identity(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self
            .identities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(identifier)
            .cloned())
    }
}

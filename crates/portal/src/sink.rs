use async_trait::async_trait;

use crate::{
    Result,
    event::{PortalKey, RemoteEvent},
};

/// Sink for connector output. The bridging framework provides the concrete
/// implementation; delivery retries are its responsibility.
#[async_trait]
pub trait PortalSink: Send + Sync {
    /// Whether a room already exists for this conversation.
    async fn room_exists(&self, key: &PortalKey) -> Result<bool>;

    /// Queue a remote event for asynchronous processing.
    async fn queue_event(&self, event: RemoteEvent);

    /// Upload attachment bytes and return a content URI usable in a
    /// [`ContentPart::Media`](crate::ContentPart::Media).
    async fn upload_media(
        &self,
        key: &PortalKey,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<String>;

    /// Display name the framework already knows for a ghost identifier.
    async fn resolve_identity(&self, _identifier: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
};

// ── Portal addressing ───────────────────────────────────────────────────────

/// Identifies the room mirroring one remote conversation for one login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PortalKey {
    pub login_id: String,
    pub conversation_id: String,
}

impl PortalKey {
    pub fn new(login_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl std::fmt::Display for PortalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.login_id, self.conversation_id)
    }
}

/// Room metadata pushed on create and on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub topic: String,
}

/// Who authored a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSender {
    /// Authored by the logged-in user (double-puppeted by the framework).
    pub is_from_me: bool,
    /// Ghost identifier for remote senders; `None` for the local user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub sender_login: String,
    /// Display name the connector resolved for the ghost, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// ── Content ─────────────────────────────────────────────────────────────────

/// Coarse media classification derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        let top = mime.split('/').next().unwrap_or_default();
        match top.to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::File,
        }
    }
}

/// One deliverable piece of a converted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        filename: String,
        mime_type: String,
        uri: String,
        size: usize,
    },
}

impl ContentPart {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Text body for text parts, filename for media parts.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Media { filename, .. } => filename,
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

/// Events the connector queues into the bridging framework.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEvent {
    /// Create the room for a conversation seen for the first time.
    RoomCreate {
        key: PortalKey,
        info: RoomInfo,
        timestamp: DateTime<Utc>,
        /// Historical messages follow this event.
        backfill: bool,
    },
    /// Refresh name/topic of an existing room.
    RoomInfoUpdate {
        key: PortalKey,
        info: RoomInfo,
        timestamp: DateTime<Utc>,
    },
    /// Deliver one remote message.
    Message {
        key: PortalKey,
        message_id: String,
        timestamp: DateTime<Utc>,
        sender: EventSender,
        parts: Vec<ContentPart>,
    },
}

impl RemoteEvent {
    pub fn key(&self) -> &PortalKey {
        match self {
            Self::RoomCreate { key, .. }
            | Self::RoomInfoUpdate { key, .. }
            | Self::Message { key, .. } => key,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("IMAGE/JPEG"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/ogg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::File);
        assert_eq!(MediaKind::from_mime(""), MediaKind::File);
    }

    #[test]
    fn portal_key_display() {
        let key = PortalKey::new("hostex_abcdefgh", "conv_1");
        assert_eq!(key.to_string(), "hostex_abcdefgh/conv_1");
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = RemoteEvent::Message {
            key: PortalKey::new("l", "c"),
            message_id: "m1".into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            sender: EventSender {
                is_from_me: true,
                sender: None,
                sender_login: "l".into(),
                display_name: None,
            },
            parts: vec![ContentPart::text("hi")],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["parts"][0]["type"], "text");
        assert_eq!(json["parts"][0]["body"], "hi");
        assert!(json["sender"].get("sender").is_none());
    }
}

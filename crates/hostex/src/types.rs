//! Hostex open API data model.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::Value,
};

use crate::attachment::Attachment;

// ── Envelope ────────────────────────────────────────────────────────────────

/// Uniform response wrapper returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// `error_code` has been observed both as a number and as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
    Other(Value),
}

pub const SUCCESS_CODE: i64 = 200;

impl ErrorCode {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Number(code) => *code == SUCCESS_CODE,
            Self::Text(code) => {
                let code = code.trim();
                code.is_empty() || code.parse::<i64>().is_ok_and(|c| c == SUCCESS_CODE)
            },
            Self::Other(value) => {
                value.is_null() || value.as_f64().is_some_and(|c| c == SUCCESS_CODE as f64)
            },
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(code) => write!(f, "{code}"),
            Self::Text(code) => f.write_str(code.trim()),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

/// Treats an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Properties & reservations ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Property {
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub address: String,
    #[serde(deserialize_with = "null_default")]
    pub timezone: String,
    #[serde(deserialize_with = "null_default")]
    pub default_checkin_time: String,
    #[serde(deserialize_with = "null_default")]
    pub default_checkout_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PropertyList {
    #[serde(deserialize_with = "null_default")]
    pub properties: Vec<Property>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reservation {
    #[serde(deserialize_with = "null_default")]
    pub reservation_code: String,
    pub property_id: i64,
    #[serde(deserialize_with = "null_default")]
    pub guest_name: String,
    #[serde(deserialize_with = "null_default")]
    pub guest_email: String,
    #[serde(deserialize_with = "null_default")]
    pub guest_phone: String,
    #[serde(deserialize_with = "null_default")]
    pub check_in_date: String,
    #[serde(deserialize_with = "null_default")]
    pub check_out_date: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub conversation_id: String,
    #[serde(deserialize_with = "null_default")]
    pub channel_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReservationList {
    #[serde(deserialize_with = "null_default")]
    pub reservations: Vec<Reservation>,
}

// ── Conversations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Guest {
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_default")]
    pub email: String,
}

/// One row of the conversation list, newest activity first.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub channel_type: String,
    /// Conversation-level "most recent message" marker.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_default")]
    pub property_title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub check_in_date: String,
    #[serde(default, deserialize_with = "null_default")]
    pub check_out_date: String,
    #[serde(default, deserialize_with = "null_default")]
    pub guest: Guest,
}

impl Conversation {
    /// Activity marker used by the cheap skip; a missing value never advances.
    pub fn activity(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(DateTime::UNIX_EPOCH)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConversationList {
    #[serde(deserialize_with = "null_default")]
    pub conversations: Vec<Conversation>,
}

/// Full conversation: guest, activity records and message history
/// (newest first).
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub channel_type: String,
    #[serde(default, deserialize_with = "null_default")]
    pub guest: Guest,
    #[serde(default, deserialize_with = "null_default")]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub messages: Vec<Message>,
}

pub const UNKNOWN_PROPERTY: &str = "Unknown Property";

impl ConversationDetail {
    /// Title of the first activity record that carries one.
    pub fn property_title(&self) -> Option<&str> {
        self.activities
            .iter()
            .map(|a| a.property.title.trim())
            .find(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Activity {
    #[serde(deserialize_with = "null_default")]
    pub activity_type: String,
    pub reservation_code: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub check_in_date: String,
    #[serde(deserialize_with = "null_default")]
    pub check_out_date: String,
    pub listing_id: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub property: ActivityProperty,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivityProperty {
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub cover_url: String,
    pub room_type: Option<String>,
}

// ── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Host,
    #[default]
    Guest,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub sender_role: SenderRole,
    #[serde(default, deserialize_with = "null_default")]
    pub display_type: String,
    #[serde(default, deserialize_with = "null_default")]
    pub content: String,
    #[serde(default)]
    pub attachment: Attachment,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Local bookkeeping for an outbound message. The API returns no id for
/// created messages, so `local_id` is only meaningful inside this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub local_id: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub has_image: bool,
}

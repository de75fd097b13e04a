//! Stateless wrapper around the Hostex open API.

use std::time::Duration;

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    chrono::Utc,
    reqwest::{Client, Method},
    secrecy::{ExposeSecret, Secret},
    serde::de::{DeserializeOwned, IgnoredAny},
    serde_json::{Value, json},
    tracing::{debug, warn},
    uuid::Uuid,
};

use crate::{
    error::{Error, Result},
    types::{
        Conversation, ConversationDetail, ConversationList, Envelope, Property, PropertyList,
        Reservation, ReservationList, SentMessage,
    },
};

pub const DEFAULT_API_URL: &str = "https://api.hostex.io/v3";
pub const ACCESS_TOKEN_HEADER: &str = "Hostex-Access-Token";
const USER_AGENT: &str = concat!("hostex-bridge/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`Error::Status`].
const MAX_ERROR_BODY: usize = 512;

pub struct HostexClient {
    http: Client,
    base_url: String,
    token: Secret<String>,
}

impl std::fmt::Debug for HostexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostexClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HostexClient {
    pub fn new(token: Secret<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Shared HTTP client, also used for attachment downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, path, "hostex API request");

        let mut req = self
            .http
            .request(method, &url)
            .header(ACCESS_TOKEN_HEADER, self.token.expose_secret());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(source) if status.is_success() => {
                return Err(Error::decode(format!("{path} response"), source));
            },
            Err(_) => {
                return Err(Error::Status {
                    status: status.as_u16(),
                    body: truncate_body(&String::from_utf8_lossy(&bytes)),
                });
            },
        };

        if let Some(code) = envelope.error_code.as_ref().filter(|c| !c.is_success()) {
            let message = envelope.error_msg.unwrap_or_default();
            warn!(
                path,
                code = %code,
                request_id = envelope.request_id.as_deref().unwrap_or_default(),
                "hostex API returned an error"
            );
            return Err(Error::Api {
                code: code.to_string(),
                message,
                request_id: envelope.request_id,
            });
        }

        if !status.is_success() {
            return Err(Error::Api {
                code: status.as_u16().to_string(),
                message: envelope
                    .error_msg
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string()),
                request_id: envelope.request_id,
            });
        }

        let data = envelope.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| Error::decode(format!("{path} data"), e))
    }

    /// Properties visible to the token; also the credential check at login.
    pub async fn list_properties(&self) -> Result<Vec<Property>> {
        let list: PropertyList = self.request(Method::GET, "/properties", None).await?;
        Ok(list.properties)
    }

    /// Conversations ordered by most recent activity.
    pub async fn list_conversations(&self, offset: usize, limit: usize) -> Result<Vec<Conversation>> {
        let path = format!("/conversations?offset={offset}&limit={limit}");
        let list: ConversationList = self.request(Method::GET, &path, None).await?;
        Ok(list.conversations)
    }

    /// Full conversation including message history (newest first).
    pub async fn conversation_detail(&self, conversation_id: &str) -> Result<ConversationDetail> {
        let path = format!("/conversations/{}", urlencoding::encode(conversation_id));
        self.request(Method::GET, &path, None).await
    }

    pub async fn list_reservations(
        &self,
        property_id: Option<i64>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let mut path = format!("/reservations?offset={offset}&limit={limit}");
        if let Some(property_id) = property_id {
            path.push_str(&format!("&property_id={property_id}"));
        }
        let list: ReservationList = self.request(Method::GET, &path, None).await?;
        Ok(list.reservations)
    }

    /// Send text and/or a JPEG image into a conversation.
    ///
    /// The API does not return the created message, so the returned
    /// [`SentMessage`] carries a locally generated id and timestamp.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        jpeg: Option<&[u8]>,
    ) -> Result<SentMessage> {
        let jpeg = jpeg.filter(|bytes| !bytes.is_empty());
        if text.trim().is_empty() && jpeg.is_none() {
            return Err(Error::invalid_input("message needs text or an image"));
        }

        let mut body = json!({});
        if !text.trim().is_empty() {
            body["message"] = Value::String(text.to_string());
        }
        if let Some(bytes) = jpeg {
            body["jpeg"] = Value::String(BASE64.encode(bytes));
        }

        let path = format!("/conversations/{}", urlencoding::encode(conversation_id));
        let _: IgnoredAny = self.request(Method::POST, &path, Some(&body)).await?;

        let created_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(SentMessage {
            local_id: format!(
                "sent-{}-{}",
                created_at.timestamp_millis(),
                &suffix[..8]
            ),
            conversation_id: conversation_id.to_string(),
            created_at,
            body: text.to_string(),
            has_image: jpeg.is_some(),
        })
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

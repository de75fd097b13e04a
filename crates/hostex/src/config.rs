use std::time::Duration;

use {
    chrono::TimeDelta,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::client::DEFAULT_API_URL;

/// Configuration for a single Hostex login.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostexAccountConfig {
    /// Hostex open API access token.
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,

    /// Base URL of the Hostex open API.
    pub api_url: String,

    /// Seconds between polling cycles.
    pub poll_interval_secs: u64,

    /// Only the N most recently active conversations are examined per cycle.
    pub conversation_limit: usize,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long a locally sent message suppresses its remote reflection.
    pub echo_window_secs: u64,

    /// Upper bound on remembered outbound bodies.
    pub echo_capacity: usize,

    /// Per-conversation markers untouched for this long are dropped.
    pub marker_ttl_secs: u64,
}

impl std::fmt::Debug for HostexAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostexAccountConfig")
            .field("access_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("conversation_limit", &self.conversation_limit)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for HostexAccountConfig {
    fn default() -> Self {
        Self {
            access_token: Secret::new(String::new()),
            api_url: DEFAULT_API_URL.into(),
            poll_interval_secs: 30,
            conversation_limit: 10,
            request_timeout_secs: 10,
            echo_window_secs: 120,
            echo_capacity: 1024,
            marker_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl HostexAccountConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(token.into()),
            ..Self::default()
        }
    }

    pub fn has_token(&self) -> bool {
        !self.access_token.expose_secret().trim().is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn echo_window(&self) -> TimeDelta {
        seconds(self.echo_window_secs)
    }

    pub fn marker_ttl(&self) -> TimeDelta {
        seconds(self.marker_ttl_secs)
    }
}

fn seconds(secs: u64) -> TimeDelta {
    TimeDelta::from_std(Duration::from_secs(secs)).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: HostexAccountConfig =
            serde_json::from_value(serde_json::json!({ "access_token": "abc" })).unwrap();
        assert!(cfg.has_token());
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(30));
        assert_eq!(cfg.conversation_limit, 10);
        assert_eq!(cfg.echo_window(), TimeDelta::seconds(120));
        assert_eq!(cfg.marker_ttl(), TimeDelta::days(7));
    }

    #[test]
    fn blank_token_is_missing() {
        let cfg = HostexAccountConfig::with_token("   ");
        assert!(!cfg.has_token());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = HostexAccountConfig::with_token("super-secret-token");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn serialize_round_trips_token() {
        let cfg = HostexAccountConfig::with_token("tok");
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["access_token"], "tok");
        let back: HostexAccountConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back.access_token.expose_secret(), "tok");
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = HostexAccountConfig {
            poll_interval_secs: 0,
            ..HostexAccountConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }
}

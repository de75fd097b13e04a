use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use {
    hostex_portal::{PortalKey, PortalSink},
    secrecy::ExposeSecret,
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    client::HostexClient,
    config::HostexAccountConfig,
    echo::EchoCache,
    error::{Context, Error, Result},
    poller,
    state::{LoginState, LoginStateMap, SyncState},
    supervisor::TaskSupervisor,
    sync::{PollReport, SyncEngine, fallback_guest_name},
    types::SentMessage,
};

/// Cache TTL for probe results.
const PROBE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Page size when resolving `conv_` identifiers.
const RESOLVE_PAGE_SIZE: usize = 50;

const HOST_PREFIX: &str = "host_";
const GUEST_PREFIX: &str = "guest_";
const CONVERSATION_PREFIX: &str = "conv_";

/// Stable login id for an access token: `hostex_` plus its first 8 chars.
pub fn derive_login_id(token: &str) -> String {
    let prefix: String = token.trim().chars().take(8).collect();
    format!("hostex_{prefix}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub connected: bool,
    pub login_id: String,
    pub details: Option<String>,
}

/// Owns every Hostex login: credentials, sync engines and poll loops.
pub struct HostexConnector {
    logins: LoginStateMap,
    sink: Arc<dyn PortalSink>,
    supervisor: Arc<TaskSupervisor>,
    probe_cache: RwLock<HashMap<String, (HealthSnapshot, Instant)>>,
}

impl HostexConnector {
    pub fn new(sink: Arc<dyn PortalSink>) -> Self {
        Self {
            logins: Arc::new(RwLock::new(HashMap::new())),
            sink,
            supervisor: Arc::new(TaskSupervisor::default()),
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// List all registered login IDs, sorted.
    pub fn login_ids(&self) -> Vec<String> {
        let logins = self.logins.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = logins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Validate credentials and register the login without starting its
    /// poll loop.
    pub async fn login(&self, login_id: &str, config: serde_json::Value) -> Result<()> {
        let config: HostexAccountConfig =
            serde_json::from_value(config).map_err(|e| Error::decode("hostex login config", e))?;

        if !config.has_token() {
            return Err(Error::invalid_input("hostex access token is required"));
        }

        let client = Arc::new(HostexClient::new(
            config.access_token.clone(),
            &config.api_url,
            config.request_timeout(),
        )?);

        let properties = client.list_properties().await?;
        info!(
            login_id,
            properties = properties.len(),
            "hostex credentials validated"
        );

        let engine = Arc::new(SyncEngine::new(
            login_id,
            Arc::clone(&client),
            Arc::clone(&self.sink),
            Arc::new(EchoCache::new(config.echo_window(), config.echo_capacity)),
            Arc::new(SyncState::new(config.marker_ttl())),
            config.conversation_limit,
        ));

        let state = LoginState {
            login_id: login_id.to_string(),
            config,
            client,
            engine,
            cancel: CancellationToken::new(),
            connected: false,
        };

        let previous = {
            let mut logins = self.logins.write().unwrap_or_else(|e| e.into_inner());
            logins.insert(login_id.to_string(), state)
        };
        if let Some(previous) = previous {
            warn!(login_id, "replacing existing hostex login");
            previous.cancel.cancel();
        }
        Ok(())
    }

    /// Spawn the poll loop for a registered login. Idempotent.
    pub fn connect(&self, login_id: &str) -> Result<()> {
        let (engine, interval, cancel) = {
            let mut logins = self.logins.write().unwrap_or_else(|e| e.into_inner());
            let state = logins
                .get_mut(login_id)
                .ok_or_else(|| Error::unknown_login(login_id))?;
            if state.connected {
                return Ok(());
            }
            state.connected = true;
            (
                Arc::clone(&state.engine),
                state.config.poll_interval(),
                state.cancel.clone(),
            )
        };

        info!(login_id, "connecting hostex login");
        poller::spawn_polling(engine, interval, cancel, &self.supervisor);
        Ok(())
    }

    /// Validate, register and start polling.
    pub async fn start_login(&self, login_id: &str, config: serde_json::Value) -> Result<()> {
        info!(login_id, "starting hostex login");
        self.login(login_id, config).await?;
        self.connect(login_id)
    }

    pub async fn stop_login(&self, login_id: &str) -> Result<()> {
        let removed = {
            let mut logins = self.logins.write().unwrap_or_else(|e| e.into_inner());
            logins.remove(login_id)
        };

        match removed {
            Some(state) => {
                info!(login_id, "stopping hostex login");
                state.cancel.cancel();
            },
            None => warn!(login_id, "hostex login not found"),
        }
        self.probe_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(login_id);
        Ok(())
    }

    pub fn engine(&self, login_id: &str) -> Result<Arc<SyncEngine>> {
        let logins = self.logins.read().unwrap_or_else(|e| e.into_inner());
        logins
            .get(login_id)
            .map(|s| Arc::clone(&s.engine))
            .ok_or_else(|| Error::unknown_login(login_id))
    }

    fn client(&self, login_id: &str) -> Result<Arc<HostexClient>> {
        let logins = self.logins.read().unwrap_or_else(|e| e.into_inner());
        logins
            .get(login_id)
            .map(|s| Arc::clone(&s.client))
            .ok_or_else(|| Error::unknown_login(login_id))
    }

    /// Run one sync cycle in the caller's task.
    pub async fn poll_now(&self, login_id: &str) -> Result<PollReport> {
        self.engine(login_id)?.poll_once().await
    }

    /// Send into a conversation and remember the body so its reflection on
    /// a later poll is suppressed.
    pub async fn send_message(
        &self,
        login_id: &str,
        conversation_id: &str,
        text: &str,
        jpeg: Option<&[u8]>,
    ) -> Result<SentMessage> {
        let engine = self.engine(login_id)?;
        let client = self.client(login_id)?;

        let sent = client.send_message(conversation_id, text, jpeg).await?;
        engine.echo().record_sent(&sent.body, sent.created_at);

        info!(
            login_id,
            conversation_id,
            local_id = %sent.local_id,
            has_image = sent.has_image,
            "sent hostex message"
        );
        Ok(sent)
    }

    /// Map a `conv_<id>` identifier to the conversation's portal key.
    pub async fn resolve_identifier(&self, login_id: &str, identifier: &str) -> Result<PortalKey> {
        let Some(conversation_id) = identifier.strip_prefix(CONVERSATION_PREFIX) else {
            return Err(Error::invalid_input(format!(
                "unknown identifier format: {identifier}"
            )));
        };

        let client = self.client(login_id)?;
        let conversations = client.list_conversations(0, RESOLVE_PAGE_SIZE).await?;
        conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| PortalKey::new(login_id, c.id.as_str()))
            .with_context(|| format!("conversation not found: {conversation_id}"))
    }

    /// Display name for a ghost id.
    pub async fn user_display_name(&self, login_id: &str, ghost_id: &str) -> String {
        if ghost_id.starts_with(HOST_PREFIX) {
            return "Host".to_string();
        }
        let Some(conversation_id) = ghost_id.strip_prefix(GUEST_PREFIX) else {
            return "Unknown User".to_string();
        };
        match self.engine(login_id) {
            Ok(engine) => engine.guest_display_name(conversation_id).await,
            Err(_) => fallback_guest_name(conversation_id),
        }
    }

    /// Health check for one login, cached for 30 seconds.
    pub async fn probe(&self, login_id: &str) -> HealthSnapshot {
        if let Ok(cache) = self.probe_cache.read()
            && let Some((snap, ts)) = cache.get(login_id)
            && ts.elapsed() < PROBE_CACHE_TTL
        {
            return snap.clone();
        }

        let result = match self.client(login_id) {
            Ok(client) => match client.list_properties().await {
                Ok(properties) => HealthSnapshot {
                    connected: true,
                    login_id: login_id.to_string(),
                    details: Some(format!("{} properties", properties.len())),
                },
                Err(e) => HealthSnapshot {
                    connected: false,
                    login_id: login_id.to_string(),
                    details: Some(format!("API error: {e}")),
                },
            },
            Err(_) => HealthSnapshot {
                connected: false,
                login_id: login_id.to_string(),
                details: Some("login not started".into()),
            },
        };

        if let Ok(mut cache) = self.probe_cache.write() {
            cache.insert(login_id.to_string(), (result.clone(), Instant::now()));
        }
        result
    }

    /// Config of a login with the access token masked.
    pub fn login_config(&self, login_id: &str) -> Option<serde_json::Value> {
        let logins = self.logins.read().unwrap_or_else(|e| e.into_inner());
        let state = logins.get(login_id)?;
        let mut value = serde_json::to_value(&state.config).ok()?;
        let token = state.config.access_token.expose_secret();
        let masked: String = token.chars().take(4).chain("…".chars()).collect();
        value["access_token"] = serde_json::Value::String(masked);
        Some(value)
    }

    /// Cancel every login and wait for supervised tasks.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let logins: Vec<LoginState> = {
            let mut logins = self.logins.write().unwrap_or_else(|e| e.into_inner());
            logins.drain().map(|(_, state)| state).collect()
        };
        for state in &logins {
            info!(login_id = %state.login_id, "stopping hostex login");
            state.cancel.cancel();
        }
        self.supervisor.shutdown(grace).await
    }

    pub(crate) fn spawn_supervised<F>(&self, login_id: &str, task: &str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.supervisor.spawn(login_id, task, fut);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::types::SenderRole,
        chrono::Utc,
        hostex_portal::MemorySink,
        mockito::{Matcher, Server},
        serde_json::json,
    };

    fn ok(data: serde_json::Value) -> String {
        json!({"request_id": "r", "error_code": 200, "data": data}).to_string()
    }

    async fn mock_properties(server: &mut Server) -> mockito::Mock {
        server
            .mock("GET", "/properties")
            .with_status(200)
            .with_body(ok(json!({"properties": [{"id": 1, "title": "Loft"}], "total": 1})))
            .create_async()
            .await
    }

    fn config(server: &Server) -> serde_json::Value {
        json!({"access_token": "abcdefghijkl", "api_url": server.url()})
    }

    #[test]
    fn login_id_uses_token_prefix() {
        assert_eq!(derive_login_id("abcdefghijkl"), "hostex_abcdefgh");
        assert_eq!(derive_login_id("abc"), "hostex_abc");
    }

    #[tokio::test]
    async fn login_rejects_empty_token() {
        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        let err = connector
            .login("l", json!({"access_token": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(connector.login_ids().is_empty());
    }

    #[tokio::test]
    async fn login_rejects_invalid_credentials() {
        let mut server = Server::new_async().await;
        let _props = server
            .mock("GET", "/properties")
            .with_status(200)
            .with_body(json!({"error_code": 401, "error_msg": "invalid token"}).to_string())
            .create_async()
            .await;

        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        let err = connector.login("l", config(&server)).await.unwrap_err();
        assert!(matches!(err, Error::Api { .. }));
        assert!(connector.login_ids().is_empty());
    }

    #[tokio::test]
    async fn send_records_echo_for_suppression() {
        let mut server = Server::new_async().await;
        let _props = mock_properties(&mut server).await;
        let send = server
            .mock("POST", "/conversations/c1")
            .match_body(Matcher::PartialJson(json!({"message": "Check-in is at 3pm"})))
            .with_status(200)
            .with_body(json!({"error_code": 200}).to_string())
            .create_async()
            .await;

        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.login("l", config(&server)).await.unwrap();
        let sent = connector
            .send_message("l", "c1", "Check-in is at 3pm", None)
            .await
            .unwrap();
        assert!(!sent.has_image);
        send.assert_async().await;

        let engine = connector.engine("l").unwrap();
        assert!(engine.echo().should_suppress(
            "Check-in is at 3pm",
            SenderRole::Host,
            Utc::now()
        ));
    }

    #[tokio::test]
    async fn unknown_login_is_an_error() {
        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        let err = connector
            .send_message("missing", "c1", "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownLogin { .. }));
        assert!(connector.connect("missing").is_err());
    }

    #[tokio::test]
    async fn resolves_conversation_identifiers() {
        let mut server = Server::new_async().await;
        let _props = mock_properties(&mut server).await;
        let _list = server
            .mock("GET", "/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ok(json!({"conversations": [{"id": "c1"}, {"id": "c2"}]})))
            .create_async()
            .await;

        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.login("l", config(&server)).await.unwrap();

        let key = connector.resolve_identifier("l", "conv_c2").await.unwrap();
        assert_eq!(key, PortalKey::new("l", "c2"));
        let missing = connector
            .resolve_identifier("l", "conv_zz")
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::Message { .. }));
        assert_eq!(missing.to_string(), "conversation not found: zz");
        assert!(matches!(
            connector.resolve_identifier("l", "c2").await,
            Err(Error::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn display_names_by_ghost_kind() {
        let mut server = Server::new_async().await;
        let _props = mock_properties(&mut server).await;
        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.login("l", config(&server)).await.unwrap();
        connector
            .engine("l")
            .unwrap()
            .state()
            .set_guest_name("c1", "Ada", Utc::now());

        assert_eq!(connector.user_display_name("l", "host_l").await, "Host");
        assert_eq!(connector.user_display_name("l", "guest_c1").await, "Ada");
        assert_eq!(connector.user_display_name("l", "guest_c2").await, "Guest c2");
        assert_eq!(connector.user_display_name("l", "bot").await, "Unknown User");
    }

    #[tokio::test]
    async fn probe_is_cached() {
        let mut server = Server::new_async().await;
        let props = server
            .mock("GET", "/properties")
            .with_status(200)
            .with_body(ok(json!({"properties": [{"id": 1}, {"id": 2}], "total": 2})))
            .expect(2)
            .create_async()
            .await;

        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.login("l", config(&server)).await.unwrap();

        let first = connector.probe("l").await;
        let second = connector.probe("l").await;
        assert!(first.connected);
        assert_eq!(first.details.as_deref(), Some("2 properties"));
        assert_eq!(first, second);
        // One call for login validation, one for the first probe.
        props.assert_async().await;

        let missing = connector.probe("nope").await;
        assert!(!missing.connected);
    }

    #[tokio::test]
    async fn stop_login_cancels_and_forgets() {
        let mut server = Server::new_async().await;
        let _props = mock_properties(&mut server).await;
        let _list = server
            .mock("GET", "/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ok(json!({"conversations": []})))
            .create_async()
            .await;

        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.start_login("l", config(&server)).await.unwrap();
        assert_eq!(connector.login_ids(), vec!["l"]);

        connector.stop_login("l").await.unwrap();
        assert!(connector.login_ids().is_empty());
        assert!(connector.supervisor().shutdown(Duration::from_secs(5)).await);
        assert!(connector.supervisor().failures().is_empty());
    }

    #[tokio::test]
    async fn login_config_masks_token() {
        let mut server = Server::new_async().await;
        let _props = mock_properties(&mut server).await;
        let connector = HostexConnector::new(Arc::new(MemorySink::new()));
        connector.login("l", config(&server)).await.unwrap();

        let value = connector.login_config("l").unwrap();
        assert_eq!(value["access_token"], "abcd…");
        assert_eq!(value["poll_interval_secs"], 30);
    }
}

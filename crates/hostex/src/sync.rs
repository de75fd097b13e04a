//! Incremental conversation synchronization.
//!
//! One [`SyncEngine`] exists per login. [`SyncEngine::poll_once`] walks the
//! most recently active conversations, skips those whose activity marker has
//! not moved, and emits room and message events for everything newer than the
//! conversation's low-water mark.

use std::sync::Arc;

use {
    chrono::Utc,
    hostex_portal::{EventSender, PortalKey, PortalSink, RemoteEvent, RoomInfo},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    client::HostexClient,
    echo::EchoCache,
    error::Result,
    normalize::Normalizer,
    state::SyncState,
    types::{Conversation, ConversationDetail, Message, SenderRole, UNKNOWN_PROPERTY},
};

/// Ghost identifier for a conversation's guest.
pub fn guest_ghost_id(conversation_id: &str) -> String {
    format!("guest_{conversation_id}")
}

pub fn fallback_guest_name(conversation_id: &str) -> String {
    format!("Guest {conversation_id}")
}

/// `(property) - guest`
pub fn room_name(property: &str, guest: &str) -> String {
    format!("({property}) - {guest}")
}

/// Outcome counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Conversations examined from the list.
    pub checked: usize,
    /// Skipped because their activity marker had not advanced.
    pub skipped: usize,
    /// Detail fetches that succeeded.
    pub fetched: usize,
    /// Rooms created (with backfill).
    pub created: usize,
    /// Existing rooms refreshed.
    pub updated: usize,
    /// Existing rooms seen for the first time; baseline recorded, nothing emitted.
    pub baselined: usize,
    /// Message events queued.
    pub emitted: usize,
    /// Reflections of locally sent messages that were dropped.
    pub suppressed: usize,
    /// Conversations whose detail fetch failed.
    pub failed: usize,
}

pub struct SyncEngine {
    login_id: String,
    client: Arc<HostexClient>,
    sink: Arc<dyn PortalSink>,
    normalizer: Normalizer,
    echo: Arc<EchoCache>,
    state: Arc<SyncState>,
    conversation_limit: usize,
}

impl SyncEngine {
    pub fn new(
        login_id: impl Into<String>,
        client: Arc<HostexClient>,
        sink: Arc<dyn PortalSink>,
        echo: Arc<EchoCache>,
        state: Arc<SyncState>,
        conversation_limit: usize,
    ) -> Self {
        let normalizer = Normalizer::new(client.http().clone());
        Self {
            login_id: login_id.into(),
            client,
            sink,
            normalizer,
            echo,
            state,
            conversation_limit: conversation_limit.max(1),
        }
    }

    pub fn login_id(&self) -> &str {
        &self.login_id
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn echo(&self) -> &EchoCache {
        &self.echo
    }

    /// Run one synchronization cycle.
    ///
    /// A failed conversation list aborts the cycle with `Err`; a failed
    /// detail fetch only skips that conversation until the next cycle.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let login_id = self.login_id.as_str();
        let mut report = PollReport::default();

        self.echo.sweep(Utc::now());

        let conversations = self
            .client
            .list_conversations(0, self.conversation_limit)
            .await?;

        debug!(
            login_id,
            count = conversations.len(),
            "checking hostex conversations"
        );

        for conv in conversations.iter().take(self.conversation_limit) {
            report.checked += 1;

            if let Some(cached) = self.state.last_activity(&conv.id)
                && conv.activity() <= cached
            {
                debug!(
                    login_id,
                    conversation_id = %conv.id,
                    "conversation unchanged, skipping"
                );
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.sync_conversation(conv, &mut report).await {
                report.failed += 1;
                warn!(
                    login_id,
                    conversation_id = %conv.id,
                    error = %e,
                    transient = e.is_transient(),
                    "failed to sync hostex conversation"
                );
            }
        }

        let swept = self.state.sweep(Utc::now());
        if swept.total() > 0 {
            debug!(login_id, ?swept, "evicted stale conversation markers");
        }

        if report.emitted > 0 || report.created > 0 || report.failed > 0 {
            info!(login_id, ?report, "hostex poll complete");
        } else {
            debug!(login_id, ?report, "hostex poll complete");
        }
        Ok(report)
    }

    async fn sync_conversation(&self, conv: &Conversation, report: &mut PollReport) -> Result<()> {
        let login_id = self.login_id.as_str();
        let detail = self.client.conversation_detail(&conv.id).await?;
        report.fetched += 1;

        let now = Utc::now();
        self.state.advance_activity(&conv.id, conv.activity(), now);

        let guest_name = first_non_empty(&conv.guest.name, &detail.guest.name);
        if let Some(name) = guest_name {
            self.state.set_guest_name(&conv.id, name, now);
        }
        let guest_display = match guest_name {
            Some(name) => name.to_string(),
            None => self.guest_display_name(&conv.id).await,
        };

        let property = detail.property_title().unwrap_or(UNKNOWN_PROPERTY);
        let info = RoomInfo {
            name: room_name(property, &guest_display),
            topic: property.to_string(),
        };
        let key = PortalKey::new(login_id, conv.id.as_str());

        let exists = match self.sink.room_exists(&key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    login_id,
                    conversation_id = %conv.id,
                    error = %e,
                    "room lookup failed, treating as missing"
                );
                false
            },
        };

        let ordered = chronological(&detail);

        if !exists {
            info!(
                login_id,
                conversation_id = %conv.id,
                room_name = %info.name,
                messages = ordered.len(),
                "creating room with backfill"
            );
            self.sink
                .queue_event(RemoteEvent::RoomCreate {
                    key: key.clone(),
                    info,
                    timestamp: conv.last_message_at.unwrap_or(now),
                    backfill: true,
                })
                .await;
            report.created += 1;

            for msg in &ordered {
                self.emit(&key, msg, &guest_display, report).await;
            }
            if let Some(newest) = ordered.last() {
                self.state
                    .advance_low_water(&conv.id, newest.created_at, Utc::now());
            }
            return Ok(());
        }

        self.sink
            .queue_event(RemoteEvent::RoomInfoUpdate {
                key: key.clone(),
                info,
                timestamp: conv.last_message_at.unwrap_or(now),
            })
            .await;
        report.updated += 1;

        if self.state.low_water(&conv.id).is_none() {
            if let (Some(oldest), Some(newest)) = (ordered.first(), ordered.last()) {
                self.state
                    .advance_low_water(&conv.id, oldest.created_at, now);
                self.state.set_baseline(&conv.id, newest.created_at, now);
                report.baselined += 1;
                debug!(
                    login_id,
                    conversation_id = %conv.id,
                    low_water = %oldest.created_at,
                    baseline = %newest.created_at,
                    "existing room seen first time, recorded baseline"
                );
            }
            return Ok(());
        }
        let Some(cutoff) = self.state.delivery_cutoff(&conv.id) else {
            return Ok(());
        };

        let fresh: Vec<&Message> = ordered
            .into_iter()
            .filter(|m| m.created_at > cutoff)
            .collect();
        for msg in &fresh {
            self.emit(&key, msg, &guest_display, report).await;
        }
        if let Some(newest) = fresh.last() {
            self.state
                .advance_low_water(&conv.id, newest.created_at, Utc::now());
        }
        if !fresh.is_empty() {
            debug!(
                login_id,
                conversation_id = %conv.id,
                new_messages = fresh.len(),
                "processed new messages"
            );
        }
        Ok(())
    }

    async fn emit(&self, key: &PortalKey, msg: &Message, guest_display: &str, report: &mut PollReport) {
        if self
            .echo
            .should_suppress(&msg.content, msg.sender_role, Utc::now())
        {
            debug!(
                login_id = %self.login_id,
                conversation_id = %key.conversation_id,
                message_id = %msg.id,
                "skipping echo of recently sent message"
            );
            report.suppressed += 1;
            return;
        }

        let sender = match msg.sender_role {
            SenderRole::Host => EventSender {
                is_from_me: true,
                sender: None,
                sender_login: self.login_id.clone(),
                display_name: None,
            },
            SenderRole::Guest | SenderRole::Other => EventSender {
                is_from_me: false,
                sender: Some(guest_ghost_id(&key.conversation_id)),
                sender_login: self.login_id.clone(),
                display_name: Some(guest_display.to_string()),
            },
        };

        let parts = self
            .normalizer
            .normalize(msg, key, self.sink.as_ref())
            .await;

        self.sink
            .queue_event(RemoteEvent::Message {
                key: key.clone(),
                message_id: msg.id.clone(),
                timestamp: msg.created_at,
                sender,
                parts,
            })
            .await;
        report.emitted += 1;
    }

    /// Cached guest name, else what the framework knows for the ghost, else
    /// a generic label.
    pub async fn guest_display_name(&self, conversation_id: &str) -> String {
        if let Some(name) = self.state.guest_name(conversation_id) {
            return name;
        }
        let ghost = guest_ghost_id(conversation_id);
        match self.sink.resolve_identity(&ghost).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => fallback_guest_name(conversation_id),
            Err(e) => {
                debug!(
                    login_id = %self.login_id,
                    conversation_id,
                    error = %e,
                    "identity lookup failed"
                );
                fallback_guest_name(conversation_id)
            },
        }
    }
}

fn first_non_empty<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    [a.trim(), b.trim()].into_iter().find(|s| !s.is_empty())
}

/// Oldest first; equal timestamps keep the reverse of the API's
/// newest-first list order.
fn chronological(detail: &ConversationDetail) -> Vec<&Message> {
    let mut ordered: Vec<&Message> = detail.messages.iter().rev().collect();
    ordered.sort_by_key(|m| m.created_at);
    ordered
}

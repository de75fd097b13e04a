//! Short-lived memory of bodies sent from the bridge.
//!
//! The send endpoint returns no id that could be matched against the
//! reflected message on a later poll, so body text plus send time is the
//! only signal. Two identical bodies sent through different channels inside
//! the window collide and the second is suppressed.

use std::{collections::HashMap, sync::RwLock};

use {
    chrono::{DateTime, TimeDelta, Utc},
    tracing::debug,
};

use crate::types::SenderRole;

pub const DEFAULT_ECHO_CAPACITY: usize = 1024;

pub fn default_echo_window() -> TimeDelta {
    TimeDelta::minutes(2)
}

#[derive(Debug)]
pub struct EchoCache {
    window: TimeDelta,
    capacity: usize,
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl Default for EchoCache {
    fn default() -> Self {
        Self::new(default_echo_window(), DEFAULT_ECHO_CAPACITY)
    }
}

impl EchoCache {
    pub fn new(window: TimeDelta, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Remember a body sent at `now`. Image-only sends have no body and are
    /// not recorded.
    pub fn record_sent(&self, body: &str, now: DateTime<Utc>) {
        if body.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(body.to_string(), now);

        while entries.len() > self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, sent)| **sent)
                .map(|(body, _)| body.clone())
            else {
                break;
            };
            entries.remove(&oldest);
        }
    }

    /// True only for host-authored messages whose body was recorded less
    /// than one window before `now`.
    pub fn should_suppress(&self, body: &str, role: SenderRole, now: DateTime<Utc>) -> bool {
        if role != SenderRole::Host {
            return false;
        }
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(body)
            .is_some_and(|sent| now.signed_duration_since(*sent) < self.window)
    }

    /// Drop entries that can no longer suppress anything.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, sent| now.signed_duration_since(*sent) < self.window);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "swept echo cache");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

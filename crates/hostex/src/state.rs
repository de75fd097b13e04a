use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    chrono::{DateTime, TimeDelta, Utc},
    tokio_util::sync::CancellationToken,
};

use crate::{client::HostexClient, config::HostexAccountConfig, sync::SyncEngine};

/// Shared login state map.
pub type LoginStateMap = Arc<RwLock<HashMap<String, LoginState>>>;

/// Per-login runtime state.
pub struct LoginState {
    pub login_id: String,
    pub config: HostexAccountConfig,
    pub client: Arc<HostexClient>,
    pub engine: Arc<SyncEngine>,
    pub cancel: CancellationToken,
    /// Whether the poll loop has been spawned.
    pub connected: bool,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    touched: DateTime<Utc>,
}

/// Counts returned by [`SyncState::sweep`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub low_water: usize,
    pub baselines: usize,
    pub activity: usize,
    pub guest_names: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.low_water + self.baselines + self.activity + self.guest_names
    }
}

/// Per-login conversation bookkeeping, owned by one [`SyncEngine`].
///
/// Each map has its own lock and no lock is held across an `.await`, so
/// overlapping polls for the same login interleave at map granularity only.
/// Timestamps only ever move forward.
#[derive(Debug)]
pub struct SyncState {
    ttl: TimeDelta,
    low_water: RwLock<HashMap<String, Entry<DateTime<Utc>>>>,
    baselines: RwLock<HashMap<String, Entry<DateTime<Utc>>>>,
    activity: RwLock<HashMap<String, Entry<DateTime<Utc>>>>,
    guest_names: RwLock<HashMap<String, Entry<String>>>,
}

impl SyncState {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            low_water: RwLock::default(),
            baselines: RwLock::default(),
            activity: RwLock::default(),
            guest_names: RwLock::default(),
        }
    }

    /// Timestamp at or below which everything in the conversation counts as
    /// delivered.
    pub fn low_water(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        read(&self.low_water, conversation_id)
    }

    /// Returns the mark in effect after the update.
    pub fn advance_low_water(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        advance(&self.low_water, conversation_id, at, now)
    }

    /// Newest message timestamp seen when an existing room was first
    /// observed. History up to it belongs to the room already.
    pub fn baseline(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        read(&self.baselines, conversation_id)
    }

    pub fn set_baseline(
        &self,
        conversation_id: &str,
        newest: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        advance(&self.baselines, conversation_id, newest, now)
    }

    /// Messages at or before this timestamp are never emitted again.
    pub fn delivery_cutoff(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        match (self.low_water(conversation_id), self.baseline(conversation_id)) {
            (Some(mark), Some(ceiling)) => Some(mark.max(ceiling)),
            (mark, ceiling) => mark.or(ceiling),
        }
    }

    pub fn last_activity(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        read(&self.activity, conversation_id)
    }

    pub fn advance_activity(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        advance(&self.activity, conversation_id, at, now)
    }

    /// Forget every activity marker so the next poll fetches each
    /// conversation's detail again. Low-water marks are kept.
    pub fn clear_activity(&self) -> usize {
        let mut map = self.activity.write().unwrap_or_else(|e| e.into_inner());
        let cleared = map.len();
        map.clear();
        cleared
    }

    pub fn guest_name(&self, conversation_id: &str) -> Option<String> {
        let map = self.guest_names.read().unwrap_or_else(|e| e.into_inner());
        map.get(conversation_id).map(|e| e.value.clone())
    }

    pub fn set_guest_name(&self, conversation_id: &str, name: &str, now: DateTime<Utc>) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let mut map = self.guest_names.write().unwrap_or_else(|e| e.into_inner());
        map.insert(conversation_id.to_string(), Entry {
            value: name.to_string(),
            touched: now,
        });
    }

    /// Drop entries untouched for longer than the TTL. A conversation whose
    /// low-water mark is dropped falls back to the cold-start baseline.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        SweepReport {
            low_water: sweep_map(&self.low_water, now, self.ttl),
            baselines: sweep_map(&self.baselines, now, self.ttl),
            activity: sweep_map(&self.activity, now, self.ttl),
            guest_names: sweep_map(&self.guest_names, now, self.ttl),
        }
    }

    pub fn tracked_conversations(&self) -> usize {
        self.low_water.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn read(
    map: &RwLock<HashMap<String, Entry<DateTime<Utc>>>>,
    key: &str,
) -> Option<DateTime<Utc>> {
    let map = map.read().unwrap_or_else(|e| e.into_inner());
    map.get(key).map(|e| e.value)
}

fn advance(
    map: &RwLock<HashMap<String, Entry<DateTime<Utc>>>>,
    key: &str,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut map = map.write().unwrap_or_else(|e| e.into_inner());
    let entry = map.entry(key.to_string()).or_insert(Entry {
        value: at,
        touched: now,
    });
    if at > entry.value {
        entry.value = at;
    }
    entry.touched = now;
    entry.value
}

fn sweep_map<T>(map: &RwLock<HashMap<String, Entry<T>>>, now: DateTime<Utc>, ttl: TimeDelta) -> usize {
    let mut map = map.write().unwrap_or_else(|e| e.into_inner());
    let before = map.len();
    map.retain(|_, e| now.signed_duration_since(e.touched) <= ttl);
    before - map.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap_or_default()
    }

    #[test]
    fn low_water_never_moves_backwards() {
        let state = SyncState::new(TimeDelta::days(7));
        assert_eq!(state.low_water("c1"), None);

        assert_eq!(state.advance_low_water("c1", at(100), at(0)), at(100));
        assert_eq!(state.advance_low_water("c1", at(50), at(1)), at(100));
        assert_eq!(state.advance_low_water("c1", at(200), at(2)), at(200));
        assert_eq!(state.low_water("c1"), Some(at(200)));
    }

    #[test]
    fn activity_is_monotonic_and_clearable() {
        let state = SyncState::new(TimeDelta::days(7));
        state.advance_activity("c1", at(10), at(0));
        state.advance_activity("c1", at(5), at(0));
        state.advance_activity("c2", at(7), at(0));
        assert_eq!(state.last_activity("c1"), Some(at(10)));

        assert_eq!(state.clear_activity(), 2);
        assert_eq!(state.last_activity("c1"), None);
    }

    #[test]
    fn clear_activity_keeps_low_water() {
        let state = SyncState::new(TimeDelta::days(7));
        state.advance_low_water("c1", at(10), at(0));
        state.advance_activity("c1", at(10), at(0));
        state.clear_activity();
        assert_eq!(state.low_water("c1"), Some(at(10)));
    }

    #[test]
    fn delivery_cutoff_respects_baseline() {
        let state = SyncState::new(TimeDelta::days(7));
        assert_eq!(state.delivery_cutoff("c1"), None);

        state.advance_low_water("c1", at(10), at(0));
        state.set_baseline("c1", at(50), at(0));
        assert_eq!(state.low_water("c1"), Some(at(10)));
        assert_eq!(state.delivery_cutoff("c1"), Some(at(50)));

        state.advance_low_water("c1", at(80), at(1));
        assert_eq!(state.delivery_cutoff("c1"), Some(at(80)));
    }

    #[test]
    fn guest_names_ignore_blank() {
        let state = SyncState::new(TimeDelta::days(7));
        state.set_guest_name("c1", "  Ada  ", at(0));
        state.set_guest_name("c1", "", at(1));
        assert_eq!(state.guest_name("c1").as_deref(), Some("Ada"));
    }

    #[test]
    fn sweep_drops_untouched_entries() {
        let state = SyncState::new(TimeDelta::seconds(60));
        state.advance_low_water("stale", at(0), at(0));
        state.set_baseline("stale", at(0), at(0));
        state.advance_activity("stale", at(0), at(0));
        state.set_guest_name("stale", "Old", at(0));
        state.advance_low_water("fresh", at(0), at(100));

        let report = state.sweep(at(120));
        assert_eq!(report, SweepReport {
            low_water: 1,
            baselines: 1,
            activity: 1,
            guest_names: 1,
        });
        assert_eq!(report.total(), 4);
        assert_eq!(state.low_water("stale"), None);
        assert_eq!(state.low_water("fresh"), Some(at(0)));
        assert_eq!(state.tracked_conversations(), 1);
    }
}

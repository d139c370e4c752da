//! Concurrency-safe session aggregation
//!
//! Maps session id to running [`SessionTokenMetrics`]. Updates are strictly
//! additive and serialized per key through the map's sharded entry locking,
//! so concurrent folds to distinct sessions never block each other and
//! concurrent folds to one session sum exactly. There is no global lock.
//!
//! Lifetime: the orchestrator creates one aggregator per analysis run. A
//! long-lived process embedding this as a tracker can hold one across runs
//! and evict stale sessions with [`SessionAggregator::cleanup`].

use crate::config::get_config;
use crate::models::{EntryObservation, SessionTokenMetrics};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

pub struct SessionAggregator {
    sessions: DashMap<String, SessionTokenMetrics>,
    sample_limit: usize,
    sample_max_chars: usize,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        let config = get_config();
        Self::with_sample_bounds(
            config.analysis.sample_limit,
            config.analysis.sample_max_chars,
        )
    }

    pub fn with_sample_bounds(sample_limit: usize, sample_max_chars: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            sample_limit,
            sample_max_chars,
        }
    }

    /// Fold one observation into its session, creating the session on first
    /// sight. Additive only; holds the per-key entry lock for the duration
    /// of the fold.
    pub fn update(&self, obs: &EntryObservation) {
        let mut entry = self
            .sessions
            .entry(obs.session_id.clone())
            .or_insert_with(|| SessionTokenMetrics::new(obs.session_id.clone()));
        entry.fold(obs, self.sample_limit, self.sample_max_chars);
    }

    /// Point-in-time snapshot of one session.
    pub fn get(&self, session_id: &str) -> Option<SessionTokenMetrics> {
        self.sessions.get(session_id).map(|m| m.clone())
    }

    /// Point-in-time snapshot of every session.
    pub fn snapshot(&self) -> HashMap<String, SessionTokenMetrics> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Evict sessions whose last observed activity predates `older_than`.
    /// Sessions with no timestamps are kept. Returns the number evicted.
    /// Used by long-running trackers, not by one-shot corpus analysis.
    pub fn cleanup(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, metrics| metrics.end_time.map_or(true, |end| end >= older_than));
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(evicted, "evicted stale sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

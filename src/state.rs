//! Transient store of in-flight login attempts.
//!
//! Records are keyed by the opaque state token that correlates an issued
//! challenge with its later callback. The store is shared by every request
//! handler; per-token mutation goes through the map's entry lock so one
//! callback's accumulation can never interleave with another. Expiry runs
//! as an opportunistic sweep before each new challenge, never on a timer,
//! so eviction precision is best-effort.

use crate::errors::{Result, SsoError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// How long an in-flight login attempt stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(60);

/// One in-flight login attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PendingLogin {
    /// Opaque protocol state owned by the issuing adapter. Not serialized:
    /// it can hold secrets such as a PKCE verifier.
    #[serde(skip)]
    pub protocol_state: String,
    pub created_at: DateTime<Utc>,
    pub valid: bool,
    pub username: Option<String>,
    pub is_admin: bool,
    pub folders: BTreeSet<String>,
}

impl PendingLogin {
    fn new(protocol_state: String) -> Self {
        Self {
            protocol_state,
            created_at: Utc::now(),
            valid: false,
            username: None,
            is_admin: false,
            folders: BTreeSet::new(),
        }
    }
}

/// Concurrent, TTL-evicted map from state tokens to in-flight login records.
#[derive(Debug)]
pub struct StateStore {
    entries: DashMap<String, PendingLogin>,
    ttl: Duration,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    /// Create a store with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Insert a fresh record under `token`.
    pub fn create(&self, token: &str, protocol_state: impl Into<String>) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(token.to_string()) {
            Entry::Occupied(_) => Err(SsoError::DuplicateState),
            Entry::Vacant(slot) => {
                slot.insert(PendingLogin::new(protocol_state.into()));
                Ok(())
            }
        }
    }

    /// Clone out the record under `token`.
    pub fn get(&self, token: &str) -> Result<PendingLogin> {
        self.entries
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(SsoError::NoMatchingState)
    }

    /// Apply an in-place mutation atomically under the entry lock and return
    /// the updated record.
    pub fn update<F>(&self, token: &str, mutate: F) -> Result<PendingLogin>
    where
        F: FnOnce(&mut PendingLogin),
    {
        let mut entry = self.entries.get_mut(token).ok_or(SsoError::NoMatchingState)?;
        mutate(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Delete the record under `token`, returning it if present.
    pub fn remove(&self, token: &str) -> Option<PendingLogin> {
        self.entries.remove(token).map(|(_, record)| record)
    }

    /// Remove every record older than the TTL.
    ///
    /// Expired keys are collected first and removed afterwards so no map
    /// reference is held across removals.
    pub fn sweep(&self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| self.is_expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        let mut removed = 0usize;
        for token in expired {
            if self.entries.remove(&token).is_some() {
                removed += 1;
            }
        }
        debug!(removed, "swept expired login states");
    }

    /// Diagnostic snapshot of every in-flight record.
    pub fn snapshot(&self) -> Vec<(String, PendingLogin)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, record: &PendingLogin) -> bool {
        Utc::now()
            .signed_duration_since(record.created_at)
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    #[test]
    fn create_get_remove_roundtrip() {
        let store = StateStore::new();
        store.create("token-1", "verifier").unwrap();

        let record = store.get("token-1").unwrap();
        assert_eq!(record.protocol_state, "verifier");
        assert!(!record.valid);
        assert!(record.username.is_none());

        assert!(store.remove("token-1").is_some());
        assert!(matches!(
            store.get("token-1"),
            Err(SsoError::NoMatchingState)
        ));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let store = StateStore::new();
        store.create("token-1", "a").unwrap();
        assert!(matches!(
            store.create("token-1", "b"),
            Err(SsoError::DuplicateState)
        ));
        // The original record survives the rejected insert.
        assert_eq!(store.get("token-1").unwrap().protocol_state, "a");
    }

    #[test]
    fn update_mutates_in_place() {
        let store = StateStore::new();
        store.create("token-1", "s").unwrap();

        let updated = store
            .update("token-1", |record| {
                record.valid = true;
                record.username = Some("alice".to_string());
                record.folders.insert("movies".to_string());
            })
            .unwrap();
        assert!(updated.valid);

        let record = store.get("token-1").unwrap();
        assert_eq!(record.username.as_deref(), Some("alice"));
        assert!(record.folders.contains("movies"));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let store = StateStore::with_ttl(Duration::from_millis(80));
        store.create("old", "s").unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        store.create("fresh", "s").unwrap();

        // Both retrievable until a sweep runs.
        assert!(store.get("old").is_ok());
        store.sweep();

        assert!(matches!(store.get("old"), Err(SsoError::NoMatchingState)));
        assert!(store.get("fresh").is_ok());
    }

    #[tokio::test]
    async fn record_survives_until_ttl_elapses() {
        let store = StateStore::with_ttl(Duration::from_millis(200));
        store.create("token", "s").unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sweep();
        assert!(store.get("token").is_ok());

        tokio::time::sleep(Duration::from_millis(200)).await;
        store.sweep();
        assert!(store.get("token").is_err());
    }

    #[tokio::test]
    async fn concurrent_operations_on_distinct_tokens() {
        let store = Arc::new(StateStore::new());
        let mut join_set = JoinSet::new();

        for task in 0..8 {
            let store = store.clone();
            join_set.spawn(async move {
                for i in 0..50 {
                    let token = format!("token-{task}-{i}");
                    store.create(&token, "s").unwrap();
                    store
                        .update(&token, |record| {
                            record.valid = true;
                            record.folders.insert(format!("folder-{i}"));
                        })
                        .unwrap();
                    let record = store.get(&token).unwrap();
                    assert!(record.valid);
                }
            });
        }

        while let Some(result) = join_set.join_next().await {
            result.unwrap();
        }
        assert_eq!(store.len(), 8 * 50);
    }
}

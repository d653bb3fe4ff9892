//! In-process key-value store with per-key deadlines.
//!
//! Used as the best-effort cache behind the local rate-limit strategy and as
//! the registry backend for single-node deployments. Expired entries are
//! hidden on read and dropped lazily; `purge_expired` reclaims memory.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Counter(_) => "counter",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// A concurrent in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter, arming `window` as its TTL on first use.
    pub fn increment(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut guard = self.live_entry(key, now, || Value::Counter(0));
        let entry = &mut *guard;
        match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(now + window);
                }
                Ok(*count)
            }
            other => Err(wrong_type(key, "counter", other)),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a mutable handle to a live entry, replacing an expired one with `init`.
    fn live_entry(
        &self,
        key: &str,
        now: Instant,
        init: impl FnOnce() -> Value,
    ) -> dashmap::mapref::one::RefMut<'_, String, Entry> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Entry::new(init()));
                }
                occupied.into_ref()
            }
            MapEntry::Vacant(vacant) => vacant.insert(Entry::new(init())),
        }
    }

    /// Read a clone of a live value.
    fn read(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("expected {}, found {}", expected, found.kind()),
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn increment_window(&self, key: &str, window: Duration) -> Result<i64, StoreError> {
        self.increment(key, window)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entry = self.live_entry(key, now, || Value::Hash(HashMap::new()));
        match &mut entry.value {
            Value::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hash_set_if_exists(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if entry.is_expired(now) {
            return Ok(false);
        }
        match &mut entry.value {
            Value::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(true)
            }
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        match self.read(key) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash),
            Some(other) => Err(wrong_type(key, "hash", &other)),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entry = self.live_entry(key, now, || Value::Set(BTreeSet::new()));
        match &mut entry.value {
            Value::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            other => Err(wrong_type(key, "set", other)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired(now) {
                return Ok(());
            }
            match &mut entry.value {
                Value::Set(set) => {
                    set.remove(member);
                }
                other => return Err(wrong_type(key, "set", other)),
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.read(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.into_iter().collect()),
            Some(other) => Err(wrong_type(key, "set", &other)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

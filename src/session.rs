// ABOUTME: TTL- and capacity-bounded keyed store for CRM session tokens
// ABOUTME: Entries older than the TTL are unusable even if still present

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct SessionEntry {
    value: String,
    stored_at: Instant,
}

/// In-process keyed store with an explicit expiry invariant: a `get` never
/// returns an entry older than the TTL. When the store is full, inserting a
/// new key evicts the oldest entry.
pub struct SessionStore {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a live entry. Expired entries are removed on access.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry, evicting the oldest one if at capacity.
    pub fn put(&self, key: &str, value: String) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!("Session store at capacity, evicting '{}'", oldest);
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            SessionEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

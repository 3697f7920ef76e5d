use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::cache::expiration::ExpirationPolicy;
use crate::models::HttpResponse;

#[derive(Clone, Debug)]
struct CachedEntry {
    response: HttpResponse,
    stored_at: SystemTime,
    sequence: u64,
}

#[derive(Debug, Default)]
struct NamedCache {
    entries: HashMap<String, CachedEntry>,
}

#[derive(Debug, Default)]
struct StorageState {
    caches: BTreeMap<String, NamedCache>,
    next_sequence: u64,
}

/// Named response caches keyed by request URL. Shared by every request the
/// router handles; the lock is never held across an await point.
#[derive(Debug, Default)]
pub struct CacheStorage {
    state: Mutex<StorageState>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the cache if it does not exist yet.
    pub fn open(&self, cache_name: &str) {
        self.lock_state()
            .caches
            .entry(cache_name.to_string())
            .or_default();
    }

    pub fn has(&self, cache_name: &str) -> bool {
        self.lock_state().caches.contains_key(cache_name)
    }

    pub fn delete(&self, cache_name: &str) -> bool {
        self.lock_state().caches.remove(cache_name).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_state().caches.keys().cloned().collect()
    }

    pub fn put(&self, cache_name: &str, url: &str, response: HttpResponse) {
        self.put_at(cache_name, url, response, SystemTime::now());
    }

    /// Re-putting a URL refreshes its position as the newest entry.
    pub fn put_at(&self, cache_name: &str, url: &str, response: HttpResponse, stored_at: SystemTime) {
        let mut state = self.lock_state();
        let sequence = state.next_sequence;
        state.next_sequence = state.next_sequence.saturating_add(1);
        state
            .caches
            .entry(cache_name.to_string())
            .or_default()
            .entries
            .insert(
                url.to_string(),
                CachedEntry {
                    response,
                    stored_at,
                    sequence,
                },
            );
    }

    pub fn lookup(&self, cache_name: &str, url: &str) -> Option<HttpResponse> {
        self.lock_state()
            .caches
            .get(cache_name)
            .and_then(|cache| cache.entries.get(url))
            .map(|entry| entry.response.clone())
    }

    /// Like [`lookup`](Self::lookup), but an entry past the policy's max age is
    /// removed instead of served.
    pub fn lookup_fresh(
        &self,
        cache_name: &str,
        url: &str,
        policy: &ExpirationPolicy,
        now: SystemTime,
    ) -> Option<HttpResponse> {
        let mut state = self.lock_state();
        let cache = state.caches.get_mut(cache_name)?;
        let expired = policy.is_expired(cache.entries.get(url)?.stored_at, now);
        if expired {
            cache.entries.remove(url);
            return None;
        }
        cache.entries.get(url).map(|entry| entry.response.clone())
    }

    /// First match across every cache, in cache-name order.
    pub fn match_any(&self, url: &str) -> Option<HttpResponse> {
        self.lock_state()
            .caches
            .values()
            .find_map(|cache| cache.entries.get(url))
            .map(|entry| entry.response.clone())
    }

    pub fn entry_count(&self, cache_name: &str) -> usize {
        self.lock_state()
            .caches
            .get(cache_name)
            .map(|cache| cache.entries.len())
            .unwrap_or(0)
    }

    /// Cached URLs, oldest-added first.
    pub fn urls(&self, cache_name: &str) -> Vec<String> {
        let state = self.lock_state();
        let Some(cache) = state.caches.get(cache_name) else {
            return Vec::new();
        };
        let mut entries: Vec<(&String, u64)> = cache
            .entries
            .iter()
            .map(|(url, entry)| (url, entry.sequence))
            .collect();
        entries.sort_by_key(|(_, sequence)| *sequence);
        entries.into_iter().map(|(url, _)| url.clone()).collect()
    }

    /// Applies `policy` to the named cache and returns the evicted URLs.
    pub fn enforce(
        &self,
        cache_name: &str,
        policy: &ExpirationPolicy,
        now: SystemTime,
    ) -> Vec<String> {
        let mut state = self.lock_state();
        let Some(cache) = state.caches.get_mut(cache_name) else {
            return Vec::new();
        };

        let snapshot: Vec<(String, SystemTime, u64)> = cache
            .entries
            .iter()
            .map(|(url, entry)| (url.clone(), entry.stored_at, entry.sequence))
            .collect();
        let evicted = policy.select_evictions(&snapshot, now);
        for url in &evicted {
            cache.entries.remove(url);
        }
        evicted
    }

    fn lock_state(&self) -> MutexGuard<'_, StorageState> {
        // Entries are plain data; a panic mid-update cannot leave them torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

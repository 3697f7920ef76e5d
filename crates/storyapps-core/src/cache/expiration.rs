use std::time::{Duration, SystemTime};

/// Per-cache bounds. Entries past `max_age` are dropped first, then the
/// oldest-added entries until at most `max_entries` remain.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExpirationPolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl ExpirationPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries: Some(max_entries),
            max_age: Some(max_age),
        }
    }

    pub fn is_expired(&self, stored_at: SystemTime, now: SystemTime) -> bool {
        match self.max_age {
            // A clock that went backwards leaves the entry fresh.
            Some(max_age) => now
                .duration_since(stored_at)
                .map(|age| age > max_age)
                .unwrap_or(false),
            None => false,
        }
    }

    /// `entries` is `(key, stored_at, sequence)`; `sequence` orders insertions.
    pub(crate) fn select_evictions(
        &self,
        entries: &[(String, SystemTime, u64)],
        now: SystemTime,
    ) -> Vec<String> {
        let mut evicted = Vec::new();
        let mut survivors: Vec<&(String, SystemTime, u64)> = Vec::with_capacity(entries.len());

        for entry in entries {
            if self.is_expired(entry.1, now) {
                evicted.push(entry.0.clone());
            } else {
                survivors.push(entry);
            }
        }

        let max_entries = self.max_entries.unwrap_or(usize::MAX);
        if survivors.len() > max_entries {
            survivors.sort_by_key(|entry| entry.2);
            let excess = survivors.len() - max_entries;
            evicted.extend(survivors.iter().take(excess).map(|entry| entry.0.clone()));
        }

        evicted
    }
}

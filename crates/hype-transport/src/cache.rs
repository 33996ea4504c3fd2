//! TTL response cache keyed by request fingerprint.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::request::ProxyResponse;

#[derive(Debug)]
struct Entry {
    expires_at: Instant,
    response: ProxyResponse,
}

/// In-memory response cache.
///
/// Expired entries are dropped lazily on lookup and in bulk whenever the
/// cache reaches its capacity.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ResponseCache {
    /// Creates a cache holding at most `capacity` responses.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns a fresh cached response.
    pub fn get(&self, fingerprint: &str) -> Option<ProxyResponse> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(fingerprint) {
            Some(entry) if entry.expires_at > now => {
                let mut response = entry.response.clone();
                response.cached = true;
                Some(response)
            }
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    /// Stores a response for `ttl`.
    pub fn insert(&self, fingerprint: String, response: ProxyResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&fingerprint) {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            fingerprint,
            Entry {
                expires_at: now + ttl,
                response,
            },
        );
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResponseCache::default();
        cache.insert("a".into(), ProxyResponse::new(200, "x"), Duration::from_secs(30));

        let hit = cache.get("a").unwrap();
        assert!(hit.cached);
        assert_eq!(hit.text(), "x");

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_soonest_expiry() {
        let cache = ResponseCache::new(2);
        cache.insert("short".into(), ProxyResponse::new(200, "1"), Duration::from_secs(5));
        cache.insert("long".into(), ProxyResponse::new(200, "2"), Duration::from_secs(50));
        cache.insert("new".into(), ProxyResponse::new(200, "3"), Duration::from_secs(20));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("short").is_none());
        assert!(cache.get("long").is_some());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = ResponseCache::default();
        cache.insert("a".into(), ProxyResponse::new(200, "x"), Duration::ZERO);
        assert!(cache.is_empty());
    }
}

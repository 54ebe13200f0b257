//! Bounded, time-limited, key→response store for idempotent reads (§4.4).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

/// Stable cache key: uppercased method, scheme+host+path, query parameters
/// sorted by name, and an optional body fingerprint. Two requests that
/// differ only in query-parameter order hash to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        method: &str,
        url_without_query: &str,
        query: &[(String, String)],
        body_fingerprint: Option<&str>,
    ) -> Self {
        let mut sorted_query = query.to_vec();
        sorted_query.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let query_part = sorted_query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Self(format!(
            "{}\n{}\n{}\n{}",
            method.to_uppercase(),
            url_without_query,
            query_part,
            body_fingerprint.unwrap_or(""),
        ))
    }
}

#[derive(Clone)]
struct Entry {
    body: Value,
    status: u16,
    stored_at: Instant,
}

/// Mutex-guarded LRU map with per-entry TTL. A lookup that finds an entry
/// past its TTL treats it as absent (and evicts it); the mutex is held
/// across the whole check for a given key so concurrent readers see a
/// consistent entry-or-absent view.
pub struct ResponseCache {
    ttl: Duration,
    inner: Mutex<LruCache<CacheKey, Entry>>,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns `Some((body, status))` on a fresh hit, `None` otherwise.
    /// A stale hit is removed as a side effect.
    pub fn get(&self, key: &CacheKey) -> Option<(Value, u16)> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let is_fresh = matches!(guard.peek(key), Some(entry) if entry.stored_at.elapsed() < self.ttl);
        if is_fresh {
            let entry = guard.get(key).expect("checked present above");
            Some((entry.body.clone(), entry.status))
        } else {
            guard.pop(key);
            None
        }
    }

    /// Stores a successful read. Callers are responsible for only calling
    /// this for idempotent methods (GET/HEAD) and 2xx responses — the cache
    /// itself has no notion of HTTP semantics.
    pub fn put(&self, key: CacheKey, body: Value, status: u16) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.put(
            key,
            Entry {
                body,
                status,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops all entries. Called from [`crate::engine::RequestEngine::release`].
    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

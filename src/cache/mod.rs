//! Response Cache (C3): fingerprint-keyed, TTL + byte-bounded, single-flight.
//!
//! Grounded in the pack's `r2e-cache` crate (`Plawn-r2e/r2e-cache/src/lib.rs`):
//! a `DashMap`-backed store. Unlike `r2e-cache`'s lazy-TTL-only `TtlCache`,
//! this adds byte-budget eviction and single-flight, neither of which
//! `r2e-cache` needs for its use case.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub status: u16,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl.saturating_sub(now.saturating_duration_since(self.inserted_at))
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub bytes: usize,
    pub entries: usize,
}

pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    insert_order: Mutex<BTreeMap<Instant, String>>,
    in_flight: DashMap<String, Arc<Notify>>,
    bytes: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    max_bytes: usize,
}

impl ResponseCache {
    pub fn new(max_size_mb: u64) -> Self {
        ResponseCache {
            entries: DashMap::new(),
            insert_order: Mutex::new(BTreeMap::new()),
            in_flight: DashMap::new(),
            bytes: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            max_bytes: (max_size_mb as usize) * 1024 * 1024,
        }
    }

    /// Look up a cache entry by fingerprint. An expired entry is evicted
    /// before reporting a miss.
    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(fingerprint) {
            if entry.is_expired(now) {
                drop(entry);
                self.remove(fingerprint);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// `GetOrFill(fp, ttl, fill) -> entry`, with single-flight: the first
    /// concurrent miss on `fingerprint` runs `fill`; every other caller
    /// awaits its `Notify` and re-reads the (now populated) entry.
    pub async fn get_or_fill<F, Fut, E>(&self, fingerprint: &str, ttl: Duration, fill: F) -> Result<CacheEntry, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CacheEntry, E>>,
    {
        if let Some(entry) = self.get(fingerprint) {
            return Ok(entry);
        }

        let notify = Arc::new(Notify::new());
        match self.in_flight.entry(fingerprint.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let waiter = existing.get().clone();
                drop(existing);
                waiter.notified().await;
                if let Some(entry) = self.get(fingerprint) {
                    return Ok(entry);
                }
                // Filler failed to populate; fall through and try filling ourselves.
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(notify.clone());
            }
        }

        let result = fill().await;
        if let Ok(entry) = &result {
            self.insert(fingerprint, entry.clone());
        }
        self.in_flight.remove(fingerprint);
        notify.notify_waiters();
        result
    }

    pub fn insert(&self, fingerprint: &str, entry: CacheEntry) {
        self.evict_for_budget(entry.size());
        self.bytes.fetch_add(entry.size(), Ordering::Relaxed);
        self.insert_order.lock().unwrap().insert(Instant::now(), fingerprint.to_string());
        self.entries.insert(fingerprint.to_string(), entry);
    }

    pub fn invalidate(&self, fingerprint: &str) {
        self.remove(fingerprint);
    }

    /// Full clear, used by `POST /_/cache/clear` with no `endpoint` filter.
    pub fn clear_all(&self) {
        let keys: Vec<String> = self.entries.iter().map(|kv| kv.key().clone()).collect();
        for k in keys {
            self.remove(&k);
        }
    }

    pub fn invalidate_by_prefix(&self, prefix: &str) {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|kv| kv.key().starts_with(prefix))
            .map(|kv| kv.key().clone())
            .collect();
        for k in keys {
            self.remove(&k);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed) as u64,
            misses: self.misses.load(Ordering::Relaxed) as u64,
            bytes: self.bytes.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn remove(&self, fingerprint: &str) {
        if let Some((_, entry)) = self.entries.remove(fingerprint) {
            self.bytes.fetch_sub(entry.size(), Ordering::Relaxed);
        }
        self.insert_order.lock().unwrap().retain(|_, v| v != fingerprint);
    }

    /// Sweep expired entries first; if still over budget, drop
    /// oldest-by-insert-time until within budget.
    fn evict_for_budget(&self, incoming: usize) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|kv| kv.value().is_expired(now))
            .map(|kv| kv.key().clone())
            .collect();
        for k in expired {
            self.remove(&k);
        }

        while self.bytes.load(Ordering::Relaxed) + incoming > self.max_bytes {
            let oldest = { self.insert_order.lock().unwrap().keys().next().copied() };
            match oldest {
                Some(instant) => {
                    let key = self.insert_order.lock().unwrap().remove(&instant);
                    if let Some(key) = key {
                        if let Some((_, entry)) = self.entries.remove(&key) {
                            self.bytes.fetch_sub(entry.size(), Ordering::Relaxed);
                        }
                    }
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &[u8], ttl_secs: u64) -> CacheEntry {
        CacheEntry {
            body: body.to_vec(),
            content_type: "application/json".to_string(),
            headers: vec![],
            status: 200,
            inserted_at: Instant::now(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[test]
    fn test_insert_and_get_hit() {
        let cache = ResponseCache::new(64);
        cache.insert("fp1", entry(b"hello", 60));
        assert!(cache.get("fp1").is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_evicted_on_read() {
        let cache = ResponseCache::new(64);
        cache.insert("fp1", entry(b"hello", 0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("fp1").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_single_flight_fills_once() {
        let cache = Arc::new(ResponseCache::new(64));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fill::<_, _, ()>("fp", Duration::from_secs(60), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(entry(b"x", 60))
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

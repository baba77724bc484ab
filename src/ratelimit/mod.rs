//! Rate Limiter (C4): named token-bucket pools keyed by templated
//! identity, composite AND admission across pools.
//!
//! Grounded directly in `Plawn-r2e/r2e-rate-limit/src/lib.rs`'s
//! `refill_and_try_consume` token-bucket math, generalized from a single
//! fixed `(max, window)` limiter to named pools plus composite AND and
//! longest-retry-after reporting, neither of which `r2e-rate-limit` needs.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub requests_per_second: f64,
    pub burst: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    pools: DashMap<String, PoolConfig>,
    buckets: DashMap<(String, String), Mutex<Bucket>>,
}

/// Outcome of `allow`: admitted, or denied with a retry-after duration.
#[derive(Debug, Clone, Copy)]
pub enum Admission {
    Allowed,
    Denied { retry_after_sec: u64 },
}

impl RateLimiter {
    pub fn new(pools: impl IntoIterator<Item = (String, PoolConfig)>) -> Self {
        let map = DashMap::new();
        for (name, cfg) in pools {
            map.insert(name, cfg);
        }
        RateLimiter { pools: map, buckets: DashMap::new() }
    }

    /// Token-bucket admission check: `refill = min(burst, tokens +
    /// (now-last)*rate)`. Returns the admitted state and, on denial, the
    /// seconds until enough tokens refill.
    pub fn allow(&self, pool_name: &str, key: &str) -> Admission {
        let Some(pool) = self.pools.get(pool_name) else {
            // Unknown pool never throttles; the compiler should have
            // already rejected unresolved rate_limit_refs.
            return Admission::Allowed;
        };
        let pool = *pool;
        let entry = self
            .buckets
            .entry((pool_name.to_string(), key.to_string()))
            .or_insert_with(|| Mutex::new(Bucket { tokens: pool.burst, last_refill: Instant::now() }));
        let mut bucket = entry.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let refilled = (bucket.tokens + elapsed * pool.requests_per_second).min(pool.burst);
        bucket.last_refill = now;

        if refilled >= 1.0 {
            bucket.tokens = refilled - 1.0;
            Admission::Allowed
        } else {
            bucket.tokens = refilled;
            let deficit = 1.0 - refilled;
            let retry_after = deficit / pool.requests_per_second;
            Admission::Denied { retry_after_sec: retry_after.ceil() as u64 }
        }
    }

    /// Composite admission: **all** named pools must admit (AND). On
    /// denial, reports the longest per-pool retry-after.
    pub fn allow_all(&self, pools: &[(String, String)]) -> Admission {
        let mut longest: Option<u64> = None;
        for (pool_name, key) in pools {
            match self.allow(pool_name, key) {
                Admission::Allowed => {}
                Admission::Denied { retry_after_sec } => {
                    longest = Some(longest.map_or(retry_after_sec, |l: u64| l.max(retry_after_sec)));
                }
            }
        }
        match longest {
            Some(retry_after_sec) => Admission::Denied { retry_after_sec },
            None => Admission::Allowed,
        }
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.pools.iter().map(|kv| kv.key().clone()).collect()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn pool_config(&self, name: &str) -> Option<PoolConfig> {
        self.pools.get(name).map(|p| *p)
    }

    /// Number of active buckets (distinct keys) currently tracked under a pool.
    pub fn bucket_count_for_pool(&self, pool_name: &str) -> usize {
        self.buckets.iter().filter(|kv| kv.key().0 == pool_name).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_deny() {
        let limiter = RateLimiter::new([("strict".to_string(), PoolConfig { requests_per_second: 1.0, burst: 1.0 })]);
        assert!(matches!(limiter.allow("strict", "k"), Admission::Allowed));
        assert!(matches!(limiter.allow("strict", "k"), Admission::Denied { .. }));
    }

    #[test]
    fn test_composite_and_reports_longest_retry() {
        let limiter = RateLimiter::new([
            ("a".to_string(), PoolConfig { requests_per_second: 1.0, burst: 1.0 }),
            ("b".to_string(), PoolConfig { requests_per_second: 0.5, burst: 1.0 }),
        ]);
        // Exhaust both pools for key "k".
        limiter.allow("a", "k");
        limiter.allow("b", "k");
        let result = limiter.allow_all(&[("a".to_string(), "k".to_string()), ("b".to_string(), "k".to_string())]);
        match result {
            Admission::Denied { retry_after_sec } => assert!(retry_after_sec >= 1),
            Admission::Allowed => panic!("expected denial"),
        }
    }
}

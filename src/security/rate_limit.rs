//! Fixed-window rate limiting keyed by resolved client identity.
//!
//! A window is `floor(now / window)`; the counter resets when the window id
//! changes. Windows are not sliding, so a client can spend its whole budget at
//! the end of one window and again at the start of the next (up to twice the
//! limit across a boundary). Counters live in this process only; instances
//! behind a load balancer each count separately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// One throttling check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub key: String,
    pub limit: u32,
    pub window: Duration,
}

/// Result of a check. `retry_after_secs` is set only when denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
        }
    }

    fn deny(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowBucket {
    window_start_ms: u64,
    window_ms: u64,
    count: u32,
}

impl WindowBucket {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= self.window_ms
    }
}

/// Shared counter store. Only this type writes rate-limit keys.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    buckets: DashMap<String, WindowBucket>,
    max_tracked_keys: usize,
    /// Earliest time the next full-map prune may run. At most one scan per window.
    next_prune_ms: AtomicU64,
}

impl FixedWindowLimiter {
    pub fn new(max_tracked_keys: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            max_tracked_keys: max_tracked_keys.max(1),
            next_prune_ms: AtomicU64::new(0),
        }
    }

    /// Count one hit against `rule.key` at the current wall-clock time.
    pub fn enforce(&self, rule: &RateLimitRule) -> RateLimitDecision {
        self.enforce_at(rule, now_ms())
    }

    /// Count one hit against `rule.key` at `now_ms` (milliseconds since the epoch).
    pub fn enforce_at(&self, rule: &RateLimitRule, now_ms: u64) -> RateLimitDecision {
        let window_ms = u64::try_from(rule.window.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let window_start_ms = now_ms / window_ms * window_ms;

        if self.buckets.len() >= self.max_tracked_keys {
            self.maybe_prune(now_ms, window_ms);
        }

        let mut bucket = self
            .buckets
            .entry(rule.key.clone())
            .or_insert(WindowBucket {
                window_start_ms,
                window_ms,
                count: 0,
            });

        if bucket.window_start_ms != window_start_ms {
            bucket.window_start_ms = window_start_ms;
            bucket.window_ms = window_ms;
            bucket.count = 0;
        }

        if bucket.count >= rule.limit {
            let reset_at_ms = window_start_ms.saturating_add(window_ms);
            let retry_after = reset_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1);
            return RateLimitDecision::deny(retry_after);
        }

        bucket.count += 1;
        RateLimitDecision::allow()
    }

    /// Prune unless another caller already did within the current window.
    /// Live buckets are never evicted, so the map can exceed the cap until
    /// their windows end.
    fn maybe_prune(&self, now_ms: u64, window_ms: u64) {
        let due = self.next_prune_ms.load(Ordering::Relaxed);
        if now_ms < due {
            return;
        }
        let next = now_ms.saturating_add(window_ms);
        if self
            .next_prune_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.prune_expired(now_ms);
        }
    }

    /// Drop buckets whose window has ended.
    pub fn prune_expired(&self, now_ms: u64) {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.expired(now_ms));
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Pruned expired rate-limit windows");
        }
    }

    /// Number of keys currently holding a counter.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

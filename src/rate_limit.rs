// src/rate_limit.rs
//! Per-source sliding-window rate limiter.
//!
//! Process-local and advisory: it bounds outbound call volume for cost and
//! terms-of-service compliance. Windows are not shared across workers, so
//! this is not a distributed guarantee.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::model::Source;

/// Fixed per-source policy; windows are expressed in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window_ms: i64,
}

pub struct RateLimiter {
    policies: HashMap<Source, RateLimitPolicy>,
    windows: Mutex<HashMap<Source, Vec<i64>>>,
}

impl RateLimiter {
    pub fn new(policies: HashMap<Source, RateLimitPolicy>) -> Self {
        Self {
            policies,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Upstream-documented request budgets: catalog 100/min,
    /// ticketing 5/sec, feed 10/min.
    pub fn with_default_policies() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            Source::Catalog,
            RateLimitPolicy {
                max_requests: 100,
                window_ms: 60_000,
            },
        );
        policies.insert(
            Source::Ticketing,
            RateLimitPolicy {
                max_requests: 5,
                window_ms: 1_000,
            },
        );
        policies.insert(
            Source::Feed,
            RateLimitPolicy {
                max_requests: 10,
                window_ms: 60_000,
            },
        );
        Self::new(policies)
    }

    /// Record a request against `source` if its window has room.
    /// Returns false when the budget is exhausted; callers skip the source
    /// for the current pass, no blocking or retry.
    pub fn allow(&self, source: Source) -> bool {
        self.allow_at(source, Utc::now().timestamp_millis())
    }

    pub fn allow_at(&self, source: Source, now_ms: i64) -> bool {
        let Some(policy) = self.policies.get(&source) else {
            // No policy configured for this source means no limit.
            return true;
        };

        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let stamps = windows.entry(source).or_default();
        stamps.retain(|ts| now_ms - ts < policy.window_ms);

        if stamps.len() >= policy.max_requests {
            return false;
        }
        stamps.push(now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: usize, window_ms: i64) -> RateLimiter {
        let mut policies = HashMap::new();
        policies.insert(
            Source::Feed,
            RateLimitPolicy {
                max_requests,
                window_ms,
            },
        );
        RateLimiter::new(policies)
    }

    #[test]
    fn allows_up_to_budget_then_refuses() {
        let rl = limiter(3, 1_000);
        let t0 = 1_000_000;
        assert!(rl.allow_at(Source::Feed, t0));
        assert!(rl.allow_at(Source::Feed, t0 + 10));
        assert!(rl.allow_at(Source::Feed, t0 + 20));
        assert!(!rl.allow_at(Source::Feed, t0 + 30));
    }

    #[test]
    fn window_expiry_frees_budget() {
        let rl = limiter(2, 1_000);
        let t0 = 1_000_000;
        assert!(rl.allow_at(Source::Feed, t0));
        assert!(rl.allow_at(Source::Feed, t0 + 1));
        assert!(!rl.allow_at(Source::Feed, t0 + 500));
        // both initial stamps fall out of the window
        assert!(rl.allow_at(Source::Feed, t0 + 1_001));
    }

    #[test]
    fn sources_are_limited_independently() {
        let rl = limiter(1, 1_000);
        let t0 = 42;
        assert!(rl.allow_at(Source::Feed, t0));
        assert!(!rl.allow_at(Source::Feed, t0 + 1));
        // Catalog has no policy in this limiter, so it is unconstrained.
        assert!(rl.allow_at(Source::Catalog, t0 + 1));
    }
}

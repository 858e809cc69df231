// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Token-bucket rate limiter for provider API calls.
//!
//! One limiter is shared across all handler calls of one account so that
//! several DNSProviders pointing at the same credentials cannot jointly
//! exceed the backend's quota. The bucket refills continuously at the
//! configured qps up to the burst capacity; `acquire` waits without
//! blocking a worker thread.

use crate::constants::{DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_QPS, SECONDS_PER_DAY};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Effective rate-limit settings for one account.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimiterOptions {
    /// Sustained queries per second
    pub qps: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            qps: DEFAULT_RATE_LIMIT_QPS,
            burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl RateLimiterOptions {
    /// Convert a per-day request budget into sustained qps.
    ///
    /// The qps floor of 0.01 keeps pathological budgets (one request per
    /// day) from stalling reconciles for hours.
    #[must_use]
    pub fn from_requests_per_day(requests_per_day: u64, burst: u32) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let qps = (requests_per_day as f64 / SECONDS_PER_DAY).max(0.01);
        Self { qps, burst }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous-refill token bucket.
pub struct RateLimiter {
    options: RateLimiterOptions,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(options: RateLimiterOptions) -> Self {
        Self {
            options,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(options.burst),
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> RateLimiterOptions {
        self.options
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().expect("rate limiter poisoned");
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - bucket.tokens) / self.options.qps,
                    ))
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    /// Take one token without waiting. Intended for tests.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter poisoned");
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.options.qps).min(f64::from(self.options.burst));
        bucket.last_refill = now;
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod rate_limit_tests;

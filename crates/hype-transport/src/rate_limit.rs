//! Per-destination rate limiting.
//!
//! Each destination owns an independent limiter state. The outer map lock is
//! held only to fetch (or create) the per-destination `Arc<Mutex<_>>`, so
//! calls to unrelated destinations never contend with each other.
//!
//! A destination can also be put on hold, for example after the upstream
//! answered `429 Too Many Requests` with a `Retry-After`. Holds apply under
//! every policy, including [`RateLimitPolicy::Unlimited`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Rate-limiting policy for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RateLimitPolicy {
    /// No limit.
    #[default]
    Unlimited,
    /// Burst of up to `capacity` calls, refilled by one token every
    /// `refill_every`.
    TokenBucket {
        /// Maximum burst size.
        capacity: u32,
        /// Time to regain one token.
        refill_every: Duration,
    },
    /// At most `max_requests` calls per `window`, counted from the first
    /// call of the window.
    FixedWindow {
        /// Calls allowed per window.
        max_requests: u32,
        /// Window length.
        window: Duration,
    },
}

#[derive(Debug)]
enum LimiterState {
    Unlimited,
    Bucket { tokens: f64, last_refill: Instant },
    Window { count: u32, started: Instant },
}

impl LimiterState {
    fn new(policy: &RateLimitPolicy, now: Instant) -> Self {
        match policy {
            RateLimitPolicy::Unlimited => Self::Unlimited,
            RateLimitPolicy::TokenBucket { capacity, .. } => Self::Bucket {
                tokens: f64::from(*capacity),
                last_refill: now,
            },
            RateLimitPolicy::FixedWindow { .. } => Self::Window {
                count: 0,
                started: now,
            },
        }
    }

    /// Takes one permit, or returns how long until one is available.
    fn try_take(&mut self, policy: &RateLimitPolicy, now: Instant) -> Result<(), Duration> {
        match (self, policy) {
            (
                Self::Bucket {
                    tokens,
                    last_refill,
                },
                RateLimitPolicy::TokenBucket {
                    capacity,
                    refill_every,
                },
            ) => {
                if refill_every.is_zero() {
                    return Ok(());
                }
                let elapsed = now.saturating_duration_since(*last_refill);
                let regained = elapsed.as_secs_f64() / refill_every.as_secs_f64();
                *tokens = (*tokens + regained).min(f64::from(*capacity));
                *last_refill = now;
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    Ok(())
                } else {
                    Err(refill_every.mul_f64(1.0 - *tokens))
                }
            }
            (
                Self::Window { count, started },
                RateLimitPolicy::FixedWindow {
                    max_requests,
                    window,
                },
            ) => {
                let elapsed = now.saturating_duration_since(*started);
                if elapsed >= *window {
                    *started = now;
                    *count = 0;
                }
                if *count < *max_requests {
                    *count += 1;
                    Ok(())
                } else {
                    Err(window.saturating_sub(now.saturating_duration_since(*started)))
                }
            }
            _ => Ok(()),
        }
    }
}

/// Shared limiter state for every destination.
#[derive(Debug, Default)]
pub struct RateLimiter {
    states: Mutex<HashMap<String, Arc<Mutex<LimiterState>>>>,
    holds: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, key: &str, policy: &RateLimitPolicy) -> Arc<Mutex<LimiterState>> {
        let mut states = self.states.lock();
        states
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LimiterState::new(policy, Instant::now()))))
            .clone()
    }

    /// Takes a permit without waiting.
    ///
    /// On refusal returns the time until the next permit.
    pub fn try_acquire(&self, key: &str, policy: &RateLimitPolicy) -> Result<(), Duration> {
        self.check_hold(key, Instant::now())?;
        if matches!(policy, RateLimitPolicy::Unlimited) {
            return Ok(());
        }
        let state = self.state_for(key, policy);
        let mut state = state.lock();
        state.try_take(policy, Instant::now())
    }

    /// Refuses every permit for `key` during the next `duration`.
    ///
    /// A shorter hold never cuts an existing longer one.
    pub fn hold(&self, key: &str, duration: Duration) {
        let now = Instant::now();
        let Some(until) = now.checked_add(duration) else {
            return;
        };
        let mut holds = self.holds.lock();
        let current = holds.entry(key.to_string()).or_insert(until);
        if *current < until {
            *current = until;
        }
        tracing::debug!(destination = key, hold = ?duration, "Destination on hold");
    }

    fn check_hold(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut holds = self.holds.lock();
        if let Some(&until) = holds.get(key) {
            if now < until {
                return Err(until - now);
            }
            holds.remove(key);
        }
        Ok(())
    }

    /// Takes a permit, sleeping for at most `max_wait` in total.
    ///
    /// On refusal returns the remaining time until the next permit.
    pub async fn acquire(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        max_wait: Duration,
    ) -> Result<(), Duration> {
        let deadline = Instant::now() + max_wait;
        loop {
            match self.try_acquire(key, policy) {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    if Instant::now() + wait > deadline {
                        return Err(wait);
                    }
                    tracing::trace!(destination = key, wait = ?wait, "Waiting for rate-limit permit");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: RateLimitPolicy = RateLimitPolicy::FixedWindow {
        max_requests: 2,
        window: Duration::from_secs(10),
    };

    const BUCKET: RateLimitPolicy = RateLimitPolicy::TokenBucket {
        capacity: 2,
        refill_every: Duration::from_secs(1),
    };

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
        let wait = limiter.try_acquire("riot", &WINDOW).unwrap_err();
        assert_eq!(wait, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            limiter.try_acquire("riot", &WINDOW).unwrap_err(),
            Duration::from_secs(6)
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refills() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("stocks", &BUCKET).is_ok());
        assert!(limiter.try_acquire("stocks", &BUCKET).is_ok());
        assert!(limiter.try_acquire("stocks", &BUCKET).is_err());

        tokio::time::advance(Duration::from_millis(500)).await;
        let wait = limiter.try_acquire("stocks", &BUCKET).unwrap_err();
        assert_eq!(wait, Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire("stocks", &BUCKET).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destinations_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
        assert!(limiter.try_acquire("riot", &WINDOW).is_err());
        assert!(limiter.try_acquire("stocks", &WINDOW).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_within_budget() {
        let limiter = RateLimiter::new();
        limiter.try_acquire("stocks", &BUCKET).unwrap();
        limiter.try_acquire("stocks", &BUCKET).unwrap();

        let start = Instant::now();
        limiter
            .acquire("stocks", &BUCKET, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));

        let refused = limiter
            .acquire("stocks", &BUCKET, Duration::from_millis(100))
            .await;
        assert!(refused.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_blocks_until_it_passes() {
        let limiter = RateLimiter::new();
        limiter.hold("riot", Duration::from_secs(30));
        limiter.hold("riot", Duration::from_secs(5));
        assert_eq!(
            limiter.try_acquire("riot", &RateLimitPolicy::Unlimited).unwrap_err(),
            Duration::from_secs(30)
        );
        assert!(limiter.try_acquire("stocks", &RateLimitPolicy::Unlimited).is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());

        limiter.hold("riot", Duration::MAX);
        assert!(limiter.try_acquire("riot", &WINDOW).is_ok());
    }

    #[test]
    fn test_unlimited_never_refuses() {
        let limiter = RateLimiter::new();
        for _ in 0..1000 {
            assert!(limiter.try_acquire("any", &RateLimitPolicy::Unlimited).is_ok());
        }
    }
}

// src/retry.rs
//! Explicit retry policy applied at each blocking call site
//! (page fetch, LLM, image service, publish).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff with optional jitter.
///
/// `max_attempts` counts the first try, so `1` means "no retries".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: u32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            factor: 2,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never waits.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            factor: 1,
            jitter: false,
        }
    }

    /// `attempts` tries with zero delay between them (tests, local runs).
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::none()
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    ///
    /// Without jitter this is `base * factor^(attempt-1)` capped at `max_delay_ms`.
    /// With jitter the result is drawn uniformly from `[raw/2, raw]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let mut raw = self.base_delay_ms;
        for _ in 0..exp {
            raw = raw.saturating_mul(u64::from(self.factor.max(1)));
            if raw >= self.max_delay_ms {
                break;
            }
        }
        let raw = raw.min(self.max_delay_ms);
        if !self.jitter || raw < 2 {
            return Duration::from_millis(raw);
        }
        let half = raw / 2;
        let ms = half + rand::rng().random_range(0..=raw - half);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < max && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        target: "retry",
                        label,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "call failed, backing off"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_and_cap_without_jitter() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
            factor: 2,
            jitter: false,
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let p = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 400,
            max_delay_ms: 10_000,
            factor: 2,
            jitter: true,
        };
        for _ in 0..200 {
            let d = p.delay_for(2).as_millis();
            assert!((400..=800).contains(&d), "got {d}");
        }
    }

    #[tokio::test]
    async fn retries_only_retryable_errors_up_to_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<(), String> = RetryPolicy::immediate(3)
            .run("t", |_e: &String| true, move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out: Result<(), String> = RetryPolicy::immediate(5)
            .run("t", |e: &String| e != "fatal", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            })
            .await;
        assert_eq!(out.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_later_attempt() {
        let out: Result<u32, String> = RetryPolicy::immediate(4)
            .run("t", |_e: &String| true, |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt}"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(out.unwrap(), 3);
    }
}

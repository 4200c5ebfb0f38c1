use async_trait::async_trait;
use std::{fmt::Display, future::Future, time::Duration};
use tracing::{info, warn};

use crate::config::PublishConfig;

/// Upper bound for a single backoff wait.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry with exponential backoff: attempt `n` (0-based) that fails
/// with a retryable error waits `base_delay * multiplier^n` before the next,
/// capped at [`MAX_RETRY_DELAY`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier,
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.retry_base_delay_secs),
            config.retry_multiplier,
        )
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }

    /// Runs `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or `max_retries` retries have been spent.
    pub async fn run<T, E, Op, Fut, P>(&self, sleeper: &dyn Sleeper, mut operation: Op, is_retryable: P) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Retry attempt {}/{} in {:.1}s after error: {}",
                        attempt + 1,
                        self.max_retries,
                        delay.as_secs_f64(),
                        e
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(2), 1.5)
    }

    #[test]
    fn test_backoff_schedule() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_secs(2));
        assert_eq!(p.delay_for(1), Duration::from_secs(3));
        assert_eq!(p.delay_for(2), Duration::from_millis(4500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let runaway = RetryPolicy::new(3, Duration::from_secs(5), f64::INFINITY);
        assert_eq!(runaway.delay_for(0), Duration::from_secs(5));
        assert_eq!(runaway.delay_for(1), MAX_RETRY_DELAY);

        let many = RetryPolicy::new(u32::MAX, Duration::from_secs(5), 1.5);
        assert_eq!(many.delay_for(40), MAX_RETRY_DELAY);
        assert_eq!(many.delay_for(u32::MAX), MAX_RETRY_DELAY);
        assert_eq!(many.delay_for(1), Duration::from_millis(7500));
    }

    #[tokio::test]
    async fn test_succeeds_after_retryable_failures() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = policy()
            .run(
                &sleeper,
                || async {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err("429".to_string()),
                        _ => Ok("done"),
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(3)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_at_ceiling() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = policy()
            .run(
                &sleeper,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("429".to_string())
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.total(), Duration::from_millis(9500));
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = policy()
            .run(
                &sleeper,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("400".to_string())
                },
                |e| e.as_str() == "429",
            )
            .await;

        assert_eq!(result, Err("400".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }
}

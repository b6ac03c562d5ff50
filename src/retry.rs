use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, err: &StoreError) -> Duration {
        let computed = self
            .initial_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt.saturating_sub(1)));
        let delay = match err {
            StoreError::RateLimited {
                retry_after: Some(hint),
            } => *hint,
            _ => computed,
        };
        delay.min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt, &err);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    kind = err.kind(),
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let err = StoreError::Network("reset".into());
        assert_eq!(policy.backoff(1, &err), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, &err), Duration::from_secs(2));
        assert_eq!(policy.backoff(3, &err), Duration::from_secs(4));
        assert_eq!(policy.backoff(10, &err), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let policy = RetryPolicy::default();
        let hinted = StoreError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(policy.backoff(1, &hinted), Duration::from_secs(7));
        let long = StoreError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.backoff(1, &long), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_backoff(&RetryPolicy::no_delay(3), "probe", || {
            calls.set(calls.get() + 1);
            async { Err(StoreError::RateLimited { retry_after: None }) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::RateLimited { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_backoff(&RetryPolicy::no_delay(5), "probe", || {
            calls.set(calls.get() + 1);
            async { Err(StoreError::NotFound("db".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn recovers_from_network_blip() {
        let calls = Cell::new(0);
        let result = with_backoff(&RetryPolicy::no_delay(4), "probe", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 2 {
                    Err(StoreError::Network("timeout".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}

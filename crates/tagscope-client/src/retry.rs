use std::future::Future;
use std::time::Duration;

use tagscope_models::policy::RetryPolicy;
use tokio::time::Instant;
use tracing::debug;

/// Errors the retry wrapper can classify.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Why [`with_retry`] gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// A non-retryable error; returned immediately.
    Aborted { attempts: u32, error: E },
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, error: E },
    /// The caller's deadline passed before another attempt could be made.
    DeadlineExceeded { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Aborted { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }
}

/// Delay before the next attempt: the policy's exponential backoff plus up to
/// 50% random jitter when enabled, never above `max_delay`.
pub fn delay_for(policy: &RetryPolicy, failed_attempt: u32) -> Duration {
    let base = policy.backoff(failed_attempt);
    if !policy.jitter || base.is_zero() {
        return base;
    }
    let jitter = base.mul_f64(fastrand::f64() * 0.5);
    (base + jitter).min(policy.max_delay.max(base))
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out of
/// attempts or hits `deadline`. `op` receives the 1-based attempt number and
/// the time budget left for that attempt.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    E: Retryable,
    F: FnMut(u32, Option<Duration>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last: Option<E> = None;

    for attempt in 1..=max_attempts {
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt - 1,
                        last,
                    });
                }
                Some(deadline - now)
            }
            None => None,
        };

        match op(attempt, remaining).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if !error.is_retryable() => {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    error,
                })
            }
            Err(error) => {
                if attempt == max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
                let delay = delay_for(policy, attempt);
                if let Some(deadline) = deadline {
                    if Instant::now() + delay >= deadline {
                        return Err(RetryError::DeadlineExceeded {
                            attempts: attempt,
                            last: Some(error),
                        });
                    }
                }
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
                last = Some(error);
                tokio::time::sleep(delay).await;
            }
        }
    }

    // max_attempts >= 1, so the loop always returns.
    Err(RetryError::DeadlineExceeded {
        attempts: max_attempts,
        last,
    })
}

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with an error that must not be retried.
    #[error("{0}")]
    Aborted(E),

    #[error("Failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt number `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached. `on_retry` is called with the failed attempt
    /// number, its error and the delay before the next attempt.
    pub async fn run<T, E, Op, Fut, R, N>(
        &self,
        mut op: Op,
        is_retryable: R,
        mut on_retry: N,
    ) -> Result<T, RetryError<E>>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        N: FnMut(u32, &E, Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(RetryError::Aborted(err)),
                Err(err) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    on_retry(attempt, &err, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn delay_is_linear_in_attempt_number() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let mut notices = Vec::new();
        let result: Result<&str, RetryError<&str>> = instant()
            .run(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { if n < 3 { Err("busy") } else { Ok("done") } }
                },
                |_| true,
                |attempt, _, _| notices.push(attempt),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
        assert_eq!(notices, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<&str>> = instant()
            .run(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("down") }
                },
                |_| true,
                |_, _, _| {},
            )
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "down");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<&str>> = instant()
            .run(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("no ingredients") }
                },
                |e| *e != "no ingredients",
                |_, _, _| panic!("must not retry"),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Aborted("no ingredients"))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn zero_max_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay: Duration::ZERO,
        };
        let result: Result<u8, RetryError<&str>> =
            policy.run(|| async { Ok(7) }, |_| true, |_, _, _| {}).await;
        assert_eq!(result.unwrap(), 7);
    }
}

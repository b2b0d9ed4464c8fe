use {
    crate::domain::error::ActivityError,
    std::{future::Future, time::Duration},
};

/// Retry policy applied uniformly to every side-effecting step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
    /// Ceiling for a single attempt. A timed-out attempt counts as retryable.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: 3,
            attempt_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): 1s, 2s, 4s, ... capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        Duration::from_secs_f64(secs.min(self.maximum_interval.as_secs_f64()))
    }
}

/// Outcome of one wrapped step together with the attempts it took.
#[derive(Debug)]
pub struct ActivityRun<T> {
    pub attempts: u32,
    pub result: Result<T, ActivityError>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityExecutor {
    policy: RetryPolicy,
}

impl ActivityExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails non-retryably, or the attempt budget
    /// is spent. `op` receives the 1-based attempt number.
    ///
    /// Steps must tolerate re-execution with identical input: a crash between
    /// a successful attempt and its recording in history runs it again.
    pub async fn execute<T, F, Fut>(&self, activity: &str, mut op: F) -> ActivityRun<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.policy.attempt_timeout, op(attempt)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ActivityError::Timeout(self.policy.attempt_timeout.as_secs())),
            };

            let err = match outcome {
                Ok(value) => {
                    return ActivityRun {
                        attempts: attempt,
                        result: Ok(value),
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(activity, attempt, error = %err, "activity failed, not retrying");
                return ActivityRun {
                    attempts: attempt,
                    result: Err(err),
                };
            }

            if attempt >= self.policy.maximum_attempts {
                tracing::error!(activity, attempt, error = %err, "activity retries exhausted");
                return ActivityRun {
                    attempts: attempt,
                    result: Err(ActivityError::Exhausted {
                        activity: activity.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    }),
                };
            }

            let delay = self.policy.backoff(attempt);
            tracing::warn!(
                activity,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "activity failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

//! Retry with exponential backoff.
//!
//! Recoverable errors (timeouts, missing elements, transient driver
//! failures) are retried; everything else propagates on the first attempt.

use std::future::Future;
use tracing::{debug, warn};

use crate::error::{ExtractionError, Result};
use crate::types::config::RetryPolicy;
use crate::types::text::truncate_chars;

/// Characters of an error message kept in retry logs.
const LOG_MESSAGE_CHARS: usize = 200;

/// Result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Runs an operation under a [`RetryPolicy`].
///
/// Holds only a label for logs; the policy is passed per call so different
/// passes can use different budgets.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    label: String,
}

impl RetryExecutor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or the policy runs out.
    ///
    /// Exhausting the policy yields [`ExtractionError::RetriesExhausted`]
    /// wrapping the last error.
    pub async fn execute<T, F, Fut>(&self, policy: &RetryPolicy, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(policy, operation).await.result
    }

    /// Like [`execute`](Self::execute) but also reports the attempt count.
    pub async fn run<T, F, Fut>(&self, policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = %self.label, attempt, "Succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if !err.is_recoverable() {
                debug!(
                    op = %self.label,
                    attempt,
                    error = %truncate_chars(&err.to_string(), LOG_MESSAGE_CHARS),
                    "Fatal error, not retrying"
                );
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            if attempt >= max_attempts {
                warn!(
                    op = %self.label,
                    attempts = attempt,
                    error = %truncate_chars(&err.to_string(), LOG_MESSAGE_CHARS),
                    "Retries exhausted"
                );
                return RetryOutcome {
                    result: Err(ExtractionError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    }),
                    attempts: attempt,
                };
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                op = %self.label,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %truncate_chars(&err.to_string(), LOG_MESSAGE_CHARS),
                "Recoverable error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

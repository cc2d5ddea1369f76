//! Bounded local retry around an [`AgentGateway`].
//!
//! Each call is attempted at most `1 + max_retries` times. Between attempts
//! the wrapper waits for the error's `Retry-After` hint when one is given,
//! otherwise for an exponential back-off capped at `max_backoff_ms`.
//! Non-retryable errors are returned immediately.
//!
//! Cancellation is checked before every attempt and interrupts the back-off
//! wait; either way the call ends with [`AgentError::Cancelled`] and no
//! further request is issued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AgentError, AgentGateway, AgentOutput, AgentTask, RetryConfig, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct RetryingGateway {
    inner: Arc<dyn AgentGateway>,
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn AgentGateway>, config: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            inner,
            config,
            cancel,
        }
    }

    /// Back-off before retry number `retry` (0-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = self
            .config
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.config.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[async_trait]
impl AgentGateway for RetryingGateway {
    async fn invoke(&self, task: &AgentTask) -> Result<AgentOutput, AgentError> {
        let mut retry = 0;
        loop {
            if self.cancel.is_cancelled() {
                info!(role = %task.role, task = %task.task_type, retry, "call abandoned; run cancelled");
                return Err(AgentError::Cancelled);
            }
            let error = match self.inner.invoke(task).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            let delay = match error.retry_policy() {
                RetryPolicy::NonRetryable => return Err(error),
                _ if retry >= self.config.max_retries => return Err(error),
                RetryPolicy::Retryable { after } => after.unwrap_or_else(|| self.backoff(retry)),
            };

            warn!(
                role = %task.role,
                task = %task.task_type,
                error = %error,
                retry = retry + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                "agent call failed; retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            }
            retry += 1;
        }
    }
}

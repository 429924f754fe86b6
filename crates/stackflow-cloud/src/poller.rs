//! Completion poller
//!
//! Describes a stack until its status satisfies a predicate. The wait is
//! unbounded unless a timeout is configured or the cancellation token fires;
//! only the calling task is suspended between polls.

use crate::error::{CloudError, Result};
use crate::provider::{RemoteStack, StackApi, StackStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Suspends the polling task between observations
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between two observations
    pub interval: Duration,

    /// Give up after this much waiting. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Verdict of a predicate on one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Done,
    Failed,
}

/// Waits for a predicate on the stack status (`None` = stack absent)
pub struct CompletionPoller {
    config: PollerConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl Default for CompletionPoller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}

impl CompletionPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops every wait in progress on this poller
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll `stack_name` until `check` reports done or failed.
    ///
    /// Returns the last observation (`None` if the stack was absent).
    pub async fn wait_for<F>(
        &self,
        api: &dyn StackApi,
        stack_name: &str,
        mut check: F,
    ) -> Result<Option<RemoteStack>>
    where
        F: FnMut(Option<&StackStatus>) -> PollState + Send,
    {
        let mut waited = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CloudError::Cancelled(stack_name.to_string()));
            }

            attempt += 1;
            let stack = api.describe_stack(stack_name).await?;
            let status = stack.as_ref().map(|s| &s.status);

            match check(status) {
                PollState::Done => {
                    tracing::debug!(
                        stack = stack_name,
                        attempt,
                        status = status.map(StackStatus::as_str).unwrap_or("<absent>"),
                        "Stack reached target state"
                    );
                    return Ok(stack);
                }
                PollState::Failed => {
                    return Err(CloudError::OperationFailed {
                        stack: stack_name.to_string(),
                        status: status
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_else(|| "<absent>".to_string()),
                    });
                }
                PollState::Pending => {}
            }

            if let Some(timeout) = self.config.timeout {
                if waited >= timeout {
                    return Err(CloudError::Timeout(format!(
                        "stack {} still {} after {:?}",
                        stack_name,
                        status.map(StackStatus::as_str).unwrap_or("<absent>"),
                        waited
                    )));
                }
            }

            tracing::debug!(
                stack = stack_name,
                attempt,
                status = status.map(StackStatus::as_str).unwrap_or("<absent>"),
                "Waiting for stack"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(CloudError::Cancelled(stack_name.to_string()));
                }
                _ = self.sleeper.sleep(self.config.interval) => {}
            }
            waited += self.config.interval;
        }
    }
}

/// Done at `target`, failed on rollback/failed statuses, pending otherwise
pub fn until_status(target: StackStatus) -> impl FnMut(Option<&StackStatus>) -> PollState + Send {
    move |status| match status {
        Some(s) if *s == target => PollState::Done,
        Some(s) if s.is_failure() => PollState::Failed,
        _ => PollState::Pending,
    }
}

/// Done once the stack is gone or `DELETE_COMPLETE`
pub fn until_deleted() -> impl FnMut(Option<&StackStatus>) -> PollState + Send {
    |status| match status {
        None | Some(StackStatus::DeleteComplete) => PollState::Done,
        Some(StackStatus::DeleteFailed) => PollState::Failed,
        _ => PollState::Pending,
    }
}

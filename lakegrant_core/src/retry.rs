//! Retrying calls to the permissions service.
//!
//! The service is eventually consistent: a principal or location created a
//! moment ago may be rejected for a while. Those rejections are recognized
//! from their code and message and retried within a per-operation budget.
//! Everything else fails straight away.

use std::future::Future;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{Jitter, RetryDecision, RetryPolicy as _};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::Operation;
use crate::remote::{ErrorCode, RemoteError};

/// A service error known to clear up on its own.
struct TransientCondition {
    code: ErrorCode,
    /// Substring of the message. Empty matches any message.
    fragment: &'static str,
    operations: &'static [Operation],
}

const TRANSIENT_CONDITIONS: &[TransientCondition] = &[
    // New IAM principals take a while to show up.
    TransientCondition {
        code: ErrorCode::InvalidInput,
        fragment: "Invalid principal",
        operations: &[Operation::Create, Operation::Read],
    },
    TransientCondition {
        code: ErrorCode::InvalidInput,
        fragment: "Grantee has no permissions",
        operations: &[Operation::Create],
    },
    // The location was registered, but not everywhere yet.
    TransientCondition {
        code: ErrorCode::InvalidInput,
        fragment: "register the S3 path",
        operations: &[Operation::Create, Operation::Delete],
    },
    TransientCondition {
        code: ErrorCode::ConcurrentModification,
        fragment: "",
        operations: &[Operation::Create, Operation::Delete],
    },
    TransientCondition {
        code: ErrorCode::AccessDenied,
        fragment: "is not authorized to access requested permissions",
        operations: &[Operation::Create],
    },
];

/// What to do with the outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The call worked.
    Success,
    /// The call failed, but may work if tried again.
    Retry,
    /// The call failed for good.
    Terminal,
}

/// Classify the outcome of a call made on behalf of `operation`.
pub fn classify<T>(operation: Operation, result: &Result<T, RemoteError>) -> Classification {
    match result {
        Ok(_) => Classification::Success,
        Err(err) if is_transient(operation, err) => Classification::Retry,
        Err(_) => Classification::Terminal,
    }
}

fn is_transient(operation: Operation, err: &RemoteError) -> bool {
    TRANSIENT_CONDITIONS
        .iter()
        .any(|c| c.operations.contains(&operation) && err.is(c.code, c.fragment))
}

/// Why a retried call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The service error from the last attempt.
    Failed(RemoteError),
    /// Cancellation was requested between attempts.
    Cancelled,
}

/// Runs service calls under a retry budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: ExponentialBackoff,
    cancel: CancellationToken,
}

impl RetryPolicy {
    /// Create a policy that stops early when `cancel` fires.
    ///
    /// Fails if `config` doesn't validate.
    pub fn new(config: RetryConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        config.validate().context("invalid retry config")?;
        let backoff = ExponentialBackoff::builder()
            .retry_bounds(config.initial_backoff(), config.max_backoff())
            .jitter(Jitter::None)
            .base(config.backoff_base)
            .build_with_max_retries(u32::MAX);
        Ok(Self {
            config,
            backoff,
            cancel,
        })
    }

    /// The time budget for an operation.
    pub fn budget(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create | Operation::Read => self.config.propagation_timeout(),
            Operation::Delete => self.config.delete_timeout(),
        }
    }

    /// Call `attempt` until it succeeds, fails terminally, or the budget for
    /// `operation` runs out.
    ///
    /// Once the budget is spent one more attempt is made, unclassified, and
    /// its result is returned as is.
    pub async fn run<T, F, Fut>(&self, operation: Operation, mut attempt: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let start = Instant::now();
        let deadline = start.checked_add(self.budget(operation)).unwrap_or(start);
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempts = attempts.saturating_add(1);
            let result = attempt().await;
            match classify(operation, &result) {
                Classification::Success | Classification::Terminal => {
                    return result.map_err(RetryError::Failed)
                }
                Classification::Retry => (),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if let Err(e) = &result {
                warn!(%operation, attempts, error = %e, "transient error, retrying");
            }
            let delay = self.delay(attempts - 1).min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => (),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        debug!(%operation, attempts, "retry budget spent, making a final attempt");
        attempt().await.map_err(RetryError::Failed)
    }

    /// How long to wait after the nth retry.
    fn delay(&self, past_retries: u32) -> Duration {
        // The schedule answers in wall-clock time; only the offset is used.
        let now = SystemTime::now();
        match self.backoff.should_retry(now, past_retries) {
            RetryDecision::Retry { execute_after } => execute_after
                .duration_since(now)
                .map(whole_millis)
                .unwrap_or_default(),
            RetryDecision::DoNotRetry => self.config.max_backoff(),
        }
    }
}

/// Drop the skew between two reads of the wall clock.
fn whole_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

//! Error classification driven retry with bounded exponential backoff
//!
//! All retry and backoff logic in the crate lives here; callers never roll
//! their own loops. Retry state is owned by the caller through
//! [`RetryContext`], so there is no global mutable counter state and
//! cancellation and test isolation come for free.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ErrorClass, Result};

/// Per-class retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Zero means fail fast.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn for_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Authentication => Self {
                max_attempts: 2,
                base_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(5000),
                multiplier: 2,
            },
            ErrorClass::Network => Self {
                max_attempts: 3,
                base_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(10_000),
                multiplier: 2,
            },
            ErrorClass::RemoteExecution => Self {
                max_attempts: 3,
                base_delay: Duration::from_millis(2000),
                max_delay: Duration::from_millis(15_000),
                multiplier: 2,
            },
            ErrorClass::Authorization | ErrorClass::Validation => Self {
                max_attempts: 0,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                multiplier: 1,
            },
        }
    }

    /// Exponential delay before the next attempt, given how many attempts
    /// have already been made. Capped at `max_delay`.
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempts_made.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Is this specific error worth retrying at all?
pub fn is_retryable(err: &AppError) -> bool {
    match err {
        // Only the refresh step is auto-retried; login and callback failures
        // go back to the user.
        AppError::Authentication { step, .. } => *step == crate::error::AuthStep::Refresh,
        AppError::Network { status, .. } => {
            matches!(status, None | Some(408) | Some(429) | Some(500) | Some(502) | Some(503) | Some(504))
        }
        AppError::RemoteExecution { code, .. } => matches!(
            code,
            crate::error::RemoteErrorCode::WorkflowBusy
                | crate::error::RemoteErrorCode::RateLimited
                | crate::error::RemoteErrorCode::TemporaryFailure
                | crate::error::RemoteErrorCode::Timeout
                | crate::error::RemoteErrorCode::ServiceUnavailable
        ),
        AppError::Authorization { .. } | AppError::Validation { .. } | AppError::Cancelled(_) => {
            false
        }
    }
}

/// Delay before the next attempt. HTTP 429 gets its own longer schedule
/// (5000 + 2000 x attempt ms) instead of the exponential curve.
pub fn backoff_delay(err: &AppError, policy: &RetryPolicy, attempts_made: u32) -> Duration {
    if let AppError::Network {
        status: Some(429), ..
    } = err
    {
        return Duration::from_millis(5000 + 2000 * u64::from(attempts_made));
    }
    policy.delay_after(attempts_made)
}

/// Lifecycle of an in-flight retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Retrying(u32),
    Succeeded,
    Failed,
}

/// Caller-owned retry state for one logical operation.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation: String,
    pub state: RetryState,
    pub attempts: u32,
    /// Operator override for the class-default attempt cap.
    pub max_attempts_override: Option<u32>,
}

impl RetryContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            state: RetryState::Pending,
            attempts: 0,
            max_attempts_override: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts_override = Some(max_attempts);
        self
    }
}

/// Run `op`, retrying per the error-class policy table until it succeeds,
/// exhausts its attempts, or hits a non-retryable error.
///
/// Cancellation aborts an in-progress backoff wait immediately; an aborted
/// operation mutates no further retry state and `op` is not invoked again.
pub async fn run_with_retry<F, Fut, T>(
    ctx: &mut RetryContext,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "{} aborted before attempt",
                ctx.operation
            )));
        }

        ctx.attempts += 1;
        match op().await {
            Ok(value) => {
                ctx.state = RetryState::Succeeded;
                return Ok(value);
            }
            Err(err) => {
                let Some(class) = err.class() else {
                    ctx.state = RetryState::Failed;
                    return Err(err);
                };

                let mut policy = RetryPolicy::for_class(class);
                if let Some(cap) = ctx.max_attempts_override {
                    policy.max_attempts = cap;
                }

                if !is_retryable(&err) {
                    ctx.state = RetryState::Failed;
                    tracing::debug!(
                        operation = %ctx.operation,
                        code = err.code(),
                        "error is not retryable, failing fast"
                    );
                    return Err(err);
                }
                if ctx.attempts >= policy.max_attempts {
                    ctx.state = RetryState::Failed;
                    tracing::warn!(
                        operation = %ctx.operation,
                        attempts = ctx.attempts,
                        code = err.code(),
                        "retries exhausted"
                    );
                    return Err(exhausted(err, ctx.attempts));
                }

                let delay = backoff_delay(&err, &policy, ctx.attempts);
                ctx.state = RetryState::Retrying(ctx.attempts);
                tracing::warn!(
                    operation = %ctx.operation,
                    attempt = ctx.attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(AppError::Cancelled(format!(
                            "{} aborted during backoff",
                            ctx.operation
                        )));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Terminal error after exhausting attempts: same class and fields, but a
/// user-presentable message. Suggestions ride along in `details()`.
fn exhausted(err: AppError, attempts: u32) -> AppError {
    match err {
        AppError::Authentication { step, .. } => AppError::Authentication {
            step,
            message: format!("could not re-establish the session after {attempts} attempts"),
        },
        AppError::Network { status, .. } => AppError::Network {
            message: format!("the request could not be completed after {attempts} attempts"),
            status,
        },
        AppError::RemoteExecution { code, .. } => AppError::RemoteExecution {
            message: format!("the workflow engine kept failing after {attempts} attempts"),
            code,
        },
        other => other,
    }
}

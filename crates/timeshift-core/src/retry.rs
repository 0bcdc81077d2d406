//! Resilient invocation of the image model.
//!
//! Retries only server-side faults, with pure exponential backoff
//! (`initial_delay * 2^(attempt-1)`, no jitter) up to a fixed attempt ceiling.
//! The loop has exactly three exits: a response, a terminal fault, or a
//! transient fault on the last allowed attempt.

use crate::error::{Result, StyleError};
use async_trait::async_trait;
use std::time::Duration;
use timeshift_abstraction::{GenerationRequest, GenerationResponse, ImageModel, ModelError};
use tracing::{debug, error, info, warn};

/// Default number of calls per cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Markers that identify an internal server fault in free-text messages.
const INTERNAL_FAULT_MARKERS: [&str; 2] = ["500", "INTERNAL"];

/// Retry ceiling and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed per cycle, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// The wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

/// Whether a fault is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Internal server fault; retry after backoff.
    Transient,
    /// Anything else; surface immediately.
    Terminal,
}

/// Classifies a model error. All retry rules live here.
///
/// A fault that carries an HTTP status or a backend fault code is judged on
/// those fields alone. Only errors with nothing but free text fall back to
/// looking for a `500` or `INTERNAL` marker in the message.
pub fn classify_fault(error: &ModelError) -> FaultClass {
    let transient = match error {
        ModelError::ServiceFault { status: None, code: None, message } => {
            has_internal_marker(message)
        }
        ModelError::ServiceFault { status, code, .. } => {
            *status == Some(500)
                || code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case("INTERNAL"))
        }
        ModelError::MissingCredential(_) | ModelError::QuotaExceeded { .. } => false,
        other => has_internal_marker(other.message()),
    };

    if transient {
        FaultClass::Transient
    } else {
        FaultClass::Terminal
    }
}

fn has_internal_marker(message: &str) -> bool {
    INTERNAL_FAULT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Suspends the current operation between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// A `Sleeper` backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Per-cycle attempt state. Lives only for one `invoke` call.
#[derive(Debug, Clone, Copy)]
struct AttemptContext {
    attempt: u32,
    delay: Duration,
}

impl AttemptContext {
    fn first(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            delay: policy.delay_for(1),
        }
    }

    fn next(self, policy: &RetryPolicy) -> Self {
        let attempt = self.attempt + 1;
        Self {
            attempt,
            delay: policy.delay_for(attempt),
        }
    }
}

/// Calls an image model under a [`RetryPolicy`].
pub struct ResilientInvoker<'a> {
    model: &'a dyn ImageModel,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> ResilientInvoker<'a> {
    /// Creates an invoker borrowing the model and sleeper for one cycle.
    pub fn new(model: &'a dyn ImageModel, policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            model,
            policy,
            sleeper,
        }
    }

    /// Sends `request`, retrying transient faults.
    ///
    /// # Errors
    /// Returns `StyleError::Configuration` for a missing credential and
    /// `StyleError::Service` for any other fault that ends the loop; the
    /// wrapped source is always the last fault seen.
    pub async fn invoke(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut ctx = AttemptContext::first(&self.policy);

        loop {
            debug!(
                model_id = %self.model.model_id(),
                attempt = ctx.attempt,
                max_attempts,
                "Calling image model"
            );

            let fault = match self.model.generate_image(request).await {
                Ok(response) => {
                    if ctx.attempt > 1 {
                        info!(
                            attempt = ctx.attempt,
                            max_attempts,
                            "Image model recovered after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(fault) => fault,
            };

            let class = classify_fault(&fault);
            if class == FaultClass::Transient && ctx.attempt < max_attempts {
                warn!(
                    attempt = ctx.attempt,
                    max_attempts,
                    delay_ms = u64::try_from(ctx.delay.as_millis()).unwrap_or(u64::MAX),
                    error = %fault,
                    "Transient image model fault, backing off"
                );
                self.sleeper.sleep(ctx.delay).await;
                ctx = ctx.next(&self.policy);
                continue;
            }

            error!(
                attempt = ctx.attempt,
                max_attempts,
                class = ?class,
                error = %fault,
                "Image model call failed"
            );
            return Err(StyleError::from_model_error(fault, ctx.attempt));
        }
    }
}

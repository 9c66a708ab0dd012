//! Retry with exponential backoff and a non-retryable error predicate.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ApiError, ErrorCode, UpstreamError};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Applies +/- 50% random jitter to the computed delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: DEFAULT_DELAY,
            factor: 2.0,
            max: MAX_DELAY,
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };
                let delay = Duration::from_secs_f64(capped);

                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis((millis - spread).saturating_add(offset))
            }
        }
    }
}

/// Decides whether a failure may be retried.
pub trait RetryClassify {
    fn is_non_retryable(&self) -> bool;
}

fn non_retryable(code: Option<ErrorCode>, status: Option<u16>) -> bool {
    matches!(
        code,
        Some(ErrorCode::InvalidSymbol | ErrorCode::AssetNotFound)
    ) || status.is_some_and(|status| (400..500).contains(&status))
}

impl RetryClassify for ApiError {
    fn is_non_retryable(&self) -> bool {
        non_retryable(Some(self.code), Some(self.status))
    }
}

impl RetryClassify for UpstreamError {
    fn is_non_retryable(&self) -> bool {
        match self {
            Self::Classified(error) => error.is_non_retryable(),
            Self::Other {
                code: Some(code), ..
            } => non_retryable(code.parse().ok(), None),
            other => non_retryable(None, other.http_status()),
        }
    }
}

/// How many times to attempt an operation and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// `delay * 2^attempt` when `backoff` is set, otherwise a flat `delay`.
    pub fn new(max_retries: u32, delay: Duration, backoff: bool) -> Self {
        let backoff = if backoff {
            Backoff::Exponential {
                base: delay,
                factor: 2.0,
                max: MAX_DELAY,
                jitter: false,
            }
        } else {
            Backoff::Fixed { delay }
        };
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self) -> Self {
        if let Backoff::Exponential { jitter, .. } = &mut self.backoff {
            *jitter = true;
        }
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Runs `operation` until it succeeds, fails non-retryably, or the
    /// budget runs out. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: RetryClassify + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.max_retries {
                warn!(attempts = attempt + 1, %error, "retry budget exhausted");
                return Err(error);
            }
            if error.is_non_retryable() {
                debug!(attempt, %error, "non-retryable failure; giving up");
                return Err(error);
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after failure");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Runs `operation` with the given retry parameters.
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    max_retries: u32,
    delay: Duration,
    backoff: bool,
) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(max_retries, delay, backoff)
        .run(operation)
        .await
}

/// Serializable retry settings, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_retries: u32,
    pub delay_ms: u64,
    pub backoff: bool,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: 1_000,
            backoff: true,
            jitter: false,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        let policy = Self::new(
            settings.max_retries,
            Duration::from_millis(settings.delay_ms),
            settings.backoff,
        );
        if settings.jitter {
            policy.with_jitter()
        } else {
            policy
        }
    }
}

//! Bounded retries for idempotent read-style upstream calls.
//!
//! # Responsibilities
//! - Retry token/discovery/entitlement fetches with exponential backoff
//! - Never retry the proxied business request itself
//!
//! # Design Decisions
//! - Only upstream failures (502/504 class) are retried; authentication and
//!   authorization verdicts are final
//! - Attempts and delays come from [`RetryConfig`]

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::SidecarError;

/// Whether a failure is worth another attempt against the same upstream.
pub fn is_retryable(error: &SidecarError) -> bool {
    matches!(
        error,
        SidecarError::Upstream { .. } | SidecarError::UpstreamTimeout(_)
    )
}

/// Delay before retrying after `attempt` (1-based) failures: doubles per
/// attempt from `base_delay_ms`, capped at `max_delay_ms`, plus up to 10%
/// jitter so synchronized callers spread out.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let capped = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(config.max_delay_ms);
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Run an idempotent upstream call with bounded exponential backoff.
pub async fn retry_idempotent<T, F, Fut>(
    config: &RetryConfig,
    context: &str,
    op: F,
) -> Result<T, SidecarError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SidecarError>>,
{
    let max_attempts = if config.enabled { config.max_attempts.max(1) } else { 1 };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = backoff_delay(config, attempt);
                tracing::info!(
                    context = context,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying upstream call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

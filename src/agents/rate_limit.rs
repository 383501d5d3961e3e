//! Bounded exponential backoff for rate-limited model calls

use crate::config::RateLimitPolicy;
use crate::llm::{CompletionRequest, LlmError, ReasoningBackend};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{error, warn};

fn build_backoff(policy: &RateLimitPolicy) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_multiplier(policy.multiplier)
        .with_randomization_factor(policy.randomization_factor)
        .with_max_elapsed_time(Some(policy.max_elapsed))
        .build()
}

/// Call the backend, sleeping and retrying only while it reports rate limiting.
/// Any other outcome is returned as-is on the first try.
pub async fn complete_with_backoff(
    backend: &dyn ReasoningBackend,
    request: &CompletionRequest,
    policy: &RateLimitPolicy,
) -> Result<String, LlmError> {
    let mut backoff = build_backoff(policy);
    let mut retries = 0u32;

    loop {
        match backend.complete(request).await {
            Err(LlmError::RateLimited(msg)) => {
                if retries >= policy.max_retries {
                    error!(role = %request.role, retries, "Rate limit persisted, giving up");
                    return Err(LlmError::RateLimited(format!(
                        "{} (gave up after {} retries)",
                        msg, retries
                    )));
                }

                let Some(delay) = backoff.next_backoff() else {
                    error!(role = %request.role, retries, "Rate limit backoff window exceeded");
                    return Err(LlmError::RateLimited(format!(
                        "{} (backoff window of {:?} exceeded)",
                        msg, policy.max_elapsed
                    )));
                };

                retries += 1;
                warn!(role = %request.role, retry = retries, ?delay, "Rate limit exceeded, backing off");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

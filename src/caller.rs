//! Upstream call wrapping: throttle-only retry with backoff, raced against an
//! overall deadline.

use rand::Rng;
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep, timeout};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::metrics::{UPSTREAM_RETRIES, UPSTREAM_TIMEOUTS};
use crate::models::{CompletionRequest, GenerationParams};
use crate::upstream::{CompletionClient, UpstreamFailure};

/// Substituted when the upstream succeeds without any text.
pub const NO_OUTPUT: &str = "No output.";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Cap on the exponential base delay.
    pub max_delay: Duration,
    /// Hard ceiling on any single sleep, whatever its source.
    pub max_wait: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            max_wait: Duration::from_secs(5),
            max_jitter: Duration::from_millis(250),
        }
    }
}

// Lives for one call
struct RetryState {
    attempt: u32,
    base_delay: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            base_delay: policy.initial_delay,
        }
    }

    // upstream hint wins over our own backoff; both are clamped
    fn next_wait(&mut self, policy: &RetryPolicy, hint: Option<Duration>) -> Duration {
        let wait = hint
            .unwrap_or_else(|| self.base_delay + jitter(policy.max_jitter))
            .min(policy.max_wait);
        self.base_delay = (self.base_delay * 2).min(policy.max_delay);
        wait
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Trimmed completion text, or [`NO_OUTPUT`] when there is none.
pub fn normalize_completion(text: Option<String>) -> String {
    match text.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => NO_OUTPUT.to_string(),
    }
}

pub struct UpstreamCaller {
    client: Arc<dyn CompletionClient>,
    params: GenerationParams,
    policy: RetryPolicy,
    deadline: Duration,
}

impl UpstreamCaller {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        params: GenerationParams,
        policy: RetryPolicy,
        deadline: Duration,
    ) -> Self {
        Self {
            client,
            params,
            policy,
            deadline,
        }
    }

    /// Run one prompt through the upstream. Success always carries non-empty
    /// text. If the deadline passes first, whatever is in flight (a backoff
    /// sleep or an HTTP call) is dropped and `UpstreamTimeout` is returned.
    pub async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let request = CompletionRequest {
            prompt: prompt.to_string(),
            params: self.params.clone(),
        };

        match timeout(self.deadline, self.call_with_retry(&request)).await {
            Ok(Ok(text)) => Ok(normalize_completion(text)),
            Ok(Err(failure)) => {
                warn!(
                    upstream = self.client.name(),
                    status = ?failure.status,
                    message = %failure.message,
                    "upstream call failed"
                );
                Err(failure.into())
            }
            Err(_) => {
                UPSTREAM_TIMEOUTS.inc();
                warn!(
                    upstream = self.client.name(),
                    deadline_ms = self.deadline.as_millis() as u64,
                    "upstream deadline exceeded"
                );
                Err(GatewayError::UpstreamTimeout)
            }
        }
    }

    async fn call_with_retry(&self, request: &CompletionRequest) -> Result<Option<String>, UpstreamFailure> {
        let mut state = RetryState::new(&self.policy);
        let started = Instant::now();

        loop {
            state.attempt += 1;

            let failure = match self.client.complete(request).await {
                Ok(text) => {
                    if state.attempt > 1 {
                        info!(attempt = state.attempt, "upstream succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(failure) => failure,
            };

            // only throttling is worth another try
            if !failure.is_throttle() || state.attempt >= self.policy.max_attempts {
                return Err(failure);
            }

            let wait = state.next_wait(&self.policy, failure.retry_after);
            UPSTREAM_RETRIES.inc();
            warn!(
                upstream = self.client.name(),
                attempt = state.attempt,
                max_attempts = self.policy.max_attempts,
                wait_ms = wait.as_millis() as u64,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upstream throttled, backing off"
            );

            sleep(wait).await;
        }
    }
}

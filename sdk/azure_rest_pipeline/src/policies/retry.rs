use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::delay::delay;
use crate::error::{RestError, RestResult};
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::retry_strategies::{
    ExponentialRetryStrategy, RetryDecision, RetryInformation, RetryStrategy,
    ThrottlingRetryStrategy, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY,
};

pub const DEFAULT_RETRY_POLICY_NAME: &str = "defaultRetryPolicy";
pub const EXPONENTIAL_RETRY_POLICY_NAME: &str = "exponentialRetryPolicy";
pub const SYSTEM_ERROR_RETRY_POLICY_NAME: &str = "systemErrorRetryPolicy";
pub const THROTTLING_RETRY_POLICY_NAME: &str = "throttlingRetryPolicy";

/// Configuration for automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay: Duration,
    /// Cap for exponential backoff.
    pub max_retry_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

/// Re-sends a request while any of its strategies asks for it.
///
/// Strategies are consulted in order and the first one that does not skip
/// decides. Cancellation and configuration errors are returned immediately.
/// After `max_retries` retries the last response or error is returned as is.
pub struct RetryPolicy {
    name: String,
    strategies: Vec<Arc<dyn RetryStrategy>>,
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(
        name: impl Into<String>,
        strategies: Vec<Arc<dyn RetryStrategy>>,
        max_retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            strategies,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn exponential(options: &RetryOptions) -> ExponentialRetryStrategy {
        ExponentialRetryStrategy {
            retry_delay: options.retry_delay,
            max_retry_delay: options.max_retry_delay,
            ..ExponentialRetryStrategy::default()
        }
    }

    /// Throttling hints first, then exponential backoff.
    pub fn default_policy(options: RetryOptions) -> Self {
        Self::new(
            DEFAULT_RETRY_POLICY_NAME,
            vec![
                Arc::new(ThrottlingRetryStrategy),
                Arc::new(Self::exponential(&options)),
            ],
            options.max_retries,
        )
    }

    /// Exponential backoff on HTTP statuses only.
    pub fn exponential_policy(options: RetryOptions) -> Self {
        let strategy = ExponentialRetryStrategy {
            ignore_system_errors: true,
            ..Self::exponential(&options)
        };
        Self::new(
            EXPONENTIAL_RETRY_POLICY_NAME,
            vec![Arc::new(strategy)],
            options.max_retries,
        )
    }

    /// Exponential backoff on transport errors only.
    pub fn system_error_policy(options: RetryOptions) -> Self {
        let strategy = ExponentialRetryStrategy {
            ignore_http_status_codes: true,
            ..Self::exponential(&options)
        };
        Self::new(
            SYSTEM_ERROR_RETRY_POLICY_NAME,
            vec![Arc::new(strategy)],
            options.max_retries,
        )
    }

    /// Only server-requested delays.
    pub fn throttling_policy(max_retries: u32) -> Self {
        Self::new(
            THROTTLING_RETRY_POLICY_NAME,
            vec![Arc::new(ThrottlingRetryStrategy)],
            max_retries,
        )
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        let mut retry_count: u32 = 0;
        loop {
            request.retry_count = retry_count;
            tracing::debug!(
                request_id = %request.request_id,
                retry_count,
                "attempting to send request"
            );
            let outcome = next.run(request).await;

            if let Err(error) = &outcome {
                if error.is_fatal() {
                    return outcome;
                }
                tracing::debug!(
                    request_id = %request.request_id,
                    retry_count,
                    %error,
                    "attempt failed"
                );
            }
            if request.is_cancelled() {
                return Err(RestError::cancelled("The operation was aborted.")
                    .with_request(request.info()));
            }
            if retry_count >= self.max_retries {
                tracing::debug!(
                    request_id = %request.request_id,
                    retry_count,
                    "maximum retries reached, returning last outcome"
                );
                return outcome;
            }

            let decision = {
                let info = RetryInformation {
                    response: outcome.as_ref().ok(),
                    error: outcome.as_ref().err(),
                    retry_count,
                };
                self.strategies
                    .iter()
                    .map(|strategy| (strategy.name(), strategy.retry(&info)))
                    .find(|(_, decision)| !decision.is_skip())
            };

            match decision {
                Some((_, RetryDecision::Fail(error))) => return Err(error),
                Some((strategy, RetryDecision::RetryAfter(wait))) => {
                    tracing::info!(
                        request_id = %request.request_id,
                        retry_count,
                        strategy,
                        delay_ms = wait.as_millis() as u64,
                        "retrying request"
                    );
                    delay(wait, request.abort_signal.as_ref())
                        .await
                        .map_err(|e| e.with_request(request.info()))?;
                }
                Some((strategy, RetryDecision::Redirect(url))) => {
                    tracing::info!(
                        request_id = %request.request_id,
                        retry_count,
                        strategy,
                        %url,
                        "retrying request at new location"
                    );
                    request.url = url;
                }
                Some((_, RetryDecision::Skip)) | None => return outcome,
            }
            retry_count += 1;
        }
    }
}

use async_trait::async_trait;
use tracing::Level;

use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::sanitizer::Sanitizer;

pub const LOG_POLICY_NAME: &str = "logPolicy";

/// Logs each outgoing request and its response at `DEBUG`.
///
/// Header values and query parameters are passed through a [`Sanitizer`]
/// first. Nothing is formatted unless `DEBUG` is enabled.
#[derive(Debug, Clone, Default)]
pub struct LogPolicy {
    sanitizer: Sanitizer,
}

impl LogPolicy {
    pub fn new(sanitizer: Sanitizer) -> Self {
        Self { sanitizer }
    }
}

#[async_trait]
impl Policy for LogPolicy {
    fn name(&self) -> &str {
        LOG_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        if !tracing::enabled!(Level::DEBUG) {
            return next.run(request).await;
        }

        tracing::debug!(
            request_id = %request.request_id,
            method = %request.method,
            url = %self.sanitizer.sanitize_url(&request.url),
            headers = ?self.sanitizer.sanitize_headers(&request.headers),
            "request"
        );

        let result = next.run(request).await;
        match &result {
            Ok(response) => tracing::debug!(
                request_id = %request.request_id,
                status = response.status,
                headers = ?self.sanitizer.sanitize_headers(&response.headers),
                "response"
            ),
            Err(err) => tracing::debug!(
                request_id = %request.request_id,
                error = %err,
                "request failed"
            ),
        }
        result
    }
}

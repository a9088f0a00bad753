use async_trait::async_trait;
use tracing::field::Empty;
use tracing::Instrument;

use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::sanitizer::Sanitizer;

pub const TRACING_POLICY_NAME: &str = "tracingPolicy";

/// Wraps each request in an `HTTP <method>` span.
///
/// The span records the sanitized URL and the client request id up front,
/// and the status code plus `x-ms-request-id` once a response arrives.
#[derive(Debug, Clone, Default)]
pub struct TracingPolicy {
    sanitizer: Sanitizer,
}

impl TracingPolicy {
    pub fn new(sanitizer: Sanitizer) -> Self {
        Self { sanitizer }
    }
}

#[async_trait]
impl Policy for TracingPolicy {
    fn name(&self) -> &str {
        TRACING_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        let span = tracing::info_span!(
            "azure_rest::http",
            otel.name = %format_args!("HTTP {}", request.method),
            http.method = %request.method,
            http.url = %self.sanitizer.sanitize_url(&request.url),
            http.user_agent = request.headers.get("User-Agent").unwrap_or_default(),
            request_id = %request.request_id,
            http.status_code = Empty,
            service_request_id = Empty,
        );

        let result = next.run(request).instrument(span.clone()).await;
        match &result {
            Ok(response) => {
                span.record("http.status_code", response.status);
                if let Some(id) = response.headers.get("x-ms-request-id") {
                    span.record("service_request_id", id);
                }
            }
            Err(err) => {
                if let Some(status) = err.status_code() {
                    span.record("http.status_code", status);
                }
                span.in_scope(|| tracing::debug!(error = %err, "request failed"));
            }
        }
        result
    }
}

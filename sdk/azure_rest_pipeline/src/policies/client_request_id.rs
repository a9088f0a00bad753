use async_trait::async_trait;

use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;

pub const SET_CLIENT_REQUEST_ID_POLICY_NAME: &str = "setClientRequestIdPolicy";

pub const DEFAULT_CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Copies [`Request::request_id`] into a header so the service can correlate
/// its logs with ours. An existing header value wins.
#[derive(Debug, Clone)]
pub struct SetClientRequestIdPolicy {
    header_name: String,
}

impl SetClientRequestIdPolicy {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl Default for SetClientRequestIdPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_REQUEST_ID_HEADER)
    }
}

#[async_trait]
impl Policy for SetClientRequestIdPolicy {
    fn name(&self) -> &str {
        SET_CLIENT_REQUEST_ID_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        if !request.headers.has(&self.header_name) {
            let id = request.request_id.clone();
            request.headers.set(self.header_name.as_str(), id);
        }
        next.run(request).await
    }
}

use async_trait::async_trait;

use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;

pub const USER_AGENT_POLICY_NAME: &str = "userAgentPolicy";

const SDK_NAME: &str = "azsdk-rust-rest-pipeline";

/// The user agent sent when the caller supplies no prefix.
pub fn default_user_agent() -> String {
    format!(
        "{SDK_NAME}/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Sets `User-Agent` unless the request already carries one.
#[derive(Debug, Clone)]
pub struct UserAgentPolicy {
    value: String,
}

impl UserAgentPolicy {
    pub fn new(prefix: Option<&str>) -> Self {
        let value = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix} {}", default_user_agent()),
            _ => default_user_agent(),
        };
        Self { value }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Policy for UserAgentPolicy {
    fn name(&self) -> &str {
        USER_AGENT_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        if !request.headers.has("User-Agent") {
            request.headers.set("User-Agent", self.value.as_str());
        }
        next.run(request).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::KeyCredential;
use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;

pub const KEY_CREDENTIAL_AUTHENTICATION_POLICY_NAME: &str = "keyCredentialAuthenticationPolicy";

/// Header used by Cognitive Services style APIs for subscription keys.
pub const DEFAULT_API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Sends an API key in a fixed header on every request.
#[derive(Debug)]
pub struct KeyCredentialAuthenticationPolicy {
    credential: Arc<KeyCredential>,
    header_name: String,
}

impl KeyCredentialAuthenticationPolicy {
    pub fn new(credential: Arc<KeyCredential>, header_name: impl Into<String>) -> Self {
        Self {
            credential,
            header_name: header_name.into(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

#[async_trait]
impl Policy for KeyCredentialAuthenticationPolicy {
    fn name(&self) -> &str {
        KEY_CREDENTIAL_AUTHENTICATION_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        request
            .headers
            .set(self.header_name.as_str(), self.credential.key());
        next.run(request).await
    }
}

use async_trait::async_trait;
use azure_rest_pipeline::error::RestResult;
use azure_rest_pipeline::pipeline::{Next, Policy};
use azure_rest_pipeline::request::Request;
use azure_rest_pipeline::response::Response;

pub const API_VERSION_POLICY_NAME: &str = "ApiVersionPolicy";

/// Appends `api-version=<version>` unless the URL already has one.
#[derive(Debug, Clone)]
pub struct ApiVersionPolicy {
    api_version: String,
}

impl ApiVersionPolicy {
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
        }
    }
}

#[async_trait]
impl Policy for ApiVersionPolicy {
    fn name(&self) -> &str {
        API_VERSION_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        let present = request.url.query_pairs().any(|(name, _)| name == "api-version");
        if !present {
            request
                .url
                .query_pairs_mut()
                .append_pair("api-version", &self.api_version);
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_rest_pipeline::pipeline::{AddPolicyOptions, Pipeline};
    use azure_rest_pipeline::test_support::{Scripted, ScriptedHttpClient};
    use reqwest::Method;
    use std::sync::Arc;
    use url::Url;

    async fn sent_url(url: &str) -> String {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_policy(
                Arc::new(ApiVersionPolicy::new("2023-10-01")),
                AddPolicyOptions::default(),
            )
            .unwrap();
        let client = ScriptedHttpClient::new([Scripted::status(200)]);
        let mut request = Request::new(Method::GET, Url::parse(url).unwrap());
        pipeline.send_request(&client, &mut request).await.unwrap();
        client.requests()[0].url.to_string()
    }

    #[tokio::test]
    async fn appends_when_missing() {
        assert_eq!(
            sent_url("https://example.com/a").await,
            "https://example.com/a?api-version=2023-10-01"
        );
        assert_eq!(
            sent_url("https://example.com/a?features=read").await,
            "https://example.com/a?features=read&api-version=2023-10-01"
        );
    }

    #[tokio::test]
    async fn keeps_existing_version() {
        assert_eq!(
            sent_url("https://example.com/a?api-version=2022-01-01").await,
            "https://example.com/a?api-version=2022-01-01"
        );
    }
}

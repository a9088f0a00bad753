use std::time::Duration;

use azure_rest_pipeline::error::RestResult;
use azure_rest_pipeline::headers::HeaderCollection;
use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::url_builder::{QueryValue, UrlOptions};

/// Content type sent with JSON bodies unless overridden.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
/// Content type sent with text bodies unless overridden.
pub const TEXT_CONTENT_TYPE: &str = "text/plain";
/// Content type sent with binary bodies unless overridden.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
/// `Accept` sent unless overridden.
pub const DEFAULT_ACCEPT: &str = "application/json";

/// A request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Bytes),
}

impl RequestBody {
    /// Serialize any value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> RestResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// The content type implied by the body kind.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => JSON_CONTENT_TYPE,
            Self::Text(_) => TEXT_CONTENT_TYPE,
            Self::Binary(_) => BINARY_CONTENT_TYPE,
        }
    }

    pub fn into_bytes(self) -> RestResult<Bytes> {
        Ok(match self {
            Self::Json(value) => Bytes::from(serde_json::to_vec(&value)?),
            Self::Text(text) => Bytes::from(text),
            Self::Binary(bytes) => bytes,
        })
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

/// Per-call options for a client operation.
///
/// # Example
///
/// ```
/// use azure_rest_client::request_parameters::RequestParameters;
/// use serde_json::json;
///
/// let params = RequestParameters::new()
///     .query("features", vec!["caption", "read"])
///     .header("x-ms-client-request-id", "my-id")
///     .json_body(json!({"url": "https://example.com/image.jpg"}));
///
/// assert!(params.body.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    pub headers: HeaderCollection,
    pub body: Option<RequestBody>,
    pub query_parameters: Vec<(String, QueryValue)>,
    /// Overrides any `Content-Type` header.
    pub content_type: Option<String>,
    /// Overrides any `Accept` header.
    pub accept: Option<String>,
    pub timeout: Option<Duration>,
    pub abort_signal: Option<CancellationToken>,
    pub skip_url_encoding: bool,
    /// Values for `{name}` placeholders in the client endpoint.
    pub path_parameters: Vec<(String, String)>,
    /// Overrides the client-wide setting when present.
    pub allow_insecure_connection: Option<bool>,
}

impl RequestParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json_body(self, value: serde_json::Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_parameters.push((name.into(), value.into()));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort_signal(mut self, token: CancellationToken) -> Self {
        self.abort_signal = Some(token);
        self
    }

    pub fn skip_url_encoding(mut self, skip: bool) -> Self {
        self.skip_url_encoding = skip;
        self
    }

    pub fn path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters.push((name.into(), value.into()));
        self
    }

    pub fn allow_insecure_connection(mut self, allow: bool) -> Self {
        self.allow_insecure_connection = Some(allow);
        self
    }

    pub(crate) fn url_options(&self) -> UrlOptions {
        UrlOptions {
            path_parameters: self.path_parameters.iter().cloned().collect(),
            query_parameters: self.query_parameters.clone(),
            skip_url_encoding: self.skip_url_encoding,
        }
    }

    /// `Accept`: explicit option, then header, then JSON.
    pub(crate) fn resolved_accept(&self) -> String {
        self.accept
            .clone()
            .or_else(|| self.headers.get("accept").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ACCEPT.to_string())
    }

    /// `Content-Type`: explicit option, then header, then the body kind.
    /// `None` without a body.
    pub(crate) fn resolved_content_type(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        Some(
            self.content_type
                .clone()
                .or_else(|| self.headers.get("content-type").map(str::to_string))
                .unwrap_or_else(|| body.default_content_type().to_string()),
        )
    }
}

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::headers::HeaderCollection;

/// An outgoing HTTP request as it travels through the pipeline.
///
/// A request is owned by exactly one in-flight call. Policies receive it
/// mutably and may rewrite any field before handing it on.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderCollection,
    pub body: Option<Bytes>,
    /// Upper bound for a single transport attempt.
    pub timeout: Option<Duration>,
    /// Unique id for this logical request, stable across retries.
    pub request_id: String,
    pub abort_signal: Option<CancellationToken>,
    /// Zero-based attempt counter maintained by the retry policy.
    pub retry_count: u32,
    /// Permit plain `http://` URLs.
    pub allow_insecure_connection: bool,
    /// Hand back the body as a stream rather than buffering it.
    pub stream_response: bool,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderCollection::new(),
            body: None,
            timeout: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            abort_signal: None,
            retry_count: 0,
            allow_insecure_connection: false,
            stream_response: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_abort_signal(mut self, token: CancellationToken) -> Self {
        self.abort_signal = Some(token);
        self
    }

    pub fn allow_insecure_connection(mut self, allow: bool) -> Self {
        self.allow_insecure_connection = allow;
        self
    }

    pub fn stream_response(mut self, stream: bool) -> Self {
        self.stream_response = stream;
        self
    }

    /// Whether the caller has cancelled this request.
    pub fn is_cancelled(&self) -> bool {
        self.abort_signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// A lightweight description of this request for responses and errors.
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            url: self.url.clone(),
            request_id: self.request_id.clone(),
        }
    }
}

/// Identifies the request a response or error belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: Method,
    pub url: Url,
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/analyze").unwrap()
    }

    #[test]
    fn new_request_has_unique_id_and_zero_retries() {
        let a = Request::new(Method::GET, url());
        let b = Request::new(Method::GET, url());

        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.retry_count, 0);
        assert!(!a.allow_insecure_connection);
        assert!(a.body.is_none());
    }

    #[test]
    fn builder_helpers_set_fields() {
        let token = CancellationToken::new();
        let request = Request::new(Method::POST, url())
            .with_header("Content-Type", "application/json")
            .with_body("{}")
            .with_timeout(Duration::from_secs(5))
            .with_abort_signal(token.clone())
            .stream_response(true);

        assert_eq!(request.headers.get("content-type"), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.stream_response);
        assert!(!request.is_cancelled());

        token.cancel();
        assert!(request.is_cancelled());
    }

    #[test]
    fn info_mirrors_request() {
        let request = Request::new(Method::DELETE, url());
        let info = request.info();
        assert_eq!(info.method, Method::DELETE);
        assert_eq!(info.url, request.url);
        assert_eq!(info.request_id, request.request_id);
    }
}

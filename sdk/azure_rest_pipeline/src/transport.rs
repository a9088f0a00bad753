//! The transport boundary between the pipeline and the network.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{RestError, RestResult};
use crate::headers::HeaderCollection;
use crate::request::Request;
use crate::response::{BodyStream, Response};

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read/response timeout (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default streaming timeout (5 minutes).
///
/// Applied instead of the read timeout when a request asks for a streamed
/// response body.
pub const DEFAULT_STREAMING_TIMEOUT: Duration = Duration::from_secs(300);

/// Sends a single request and returns whatever the server answered.
///
/// Implementations must not follow redirects or retry; those are pipeline
/// policies.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send_request(&self, request: &Request) -> RestResult<Response>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    streaming_timeout: Duration,
}

impl ReqwestHttpClient {
    /// Build a client with the default timeouts.
    pub fn new() -> RestResult<Self> {
        Self::with_timeouts(
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_READ_TIMEOUT,
            DEFAULT_STREAMING_TIMEOUT,
        )
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
        streaming_timeout: Duration,
    ) -> RestResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RestError::configuration("failed to build HTTP client").with_source(e))?;
        Ok(Self {
            client,
            streaming_timeout,
        })
    }

    /// Wrap an existing `reqwest` client.
    ///
    /// The client should be built with `redirect::Policy::none()` so that the
    /// redirect policy stays in charge of `Location` handling.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            streaming_timeout: DEFAULT_STREAMING_TIMEOUT,
        }
    }

    fn map_send_error(err: reqwest::Error, request: &Request) -> RestError {
        let error = if err.is_timeout() {
            RestError::timeout(format!("Request to {} timed out", request.url)).with_source(err)
        } else {
            RestError::request_send(format!("Error sending request: {err}"), err)
        };
        error.with_request(request.info())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send_request(&self, request: &Request) -> RestResult<Response> {
        if request.url.scheme() == "http" && !request.allow_insecure_connection {
            return Err(RestError::configuration(format!(
                "Cannot connect to {} while allow_insecure_connection is false.",
                request.url
            ))
            .with_request(request.info()));
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.to_header_map()?);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if request.stream_response {
            builder = builder.timeout(self.streaming_timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, request))?;

        let status = response.status().as_u16();
        let headers = HeaderCollection::from(response.headers());
        let info = request.info();

        if request.stream_response {
            let stream_info = info.clone();
            let stream: BodyStream = Box::pin(response.bytes_stream().map(move |chunk| {
                chunk.map_err(|e| {
                    RestError::request_send(format!("Error reading response body: {e}"), e)
                        .with_request(stream_info.clone())
                })
            }));
            return Ok(Response::streaming(info, status, headers, stream));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(e, request))?;
        Ok(Response::new(info, status, headers, body))
    }
}

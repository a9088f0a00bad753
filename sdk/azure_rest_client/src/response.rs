use std::pin::Pin;
use std::task::{Context, Poll};

use azure_rest_pipeline::error::{RestError, RestResult};
use azure_rest_pipeline::headers::HeaderCollection;
use azure_rest_pipeline::request::RequestInfo;
use azure_rest_pipeline::response::{BodyStream, Response, ResponseSnapshot};
use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;

use crate::error::create_rest_error;

/// A buffered response with its body already decoded.
///
/// Non-success statuses are not errors here. Use [`HttpResponse::is_success`]
/// or [`HttpResponse::error_for_status`] to decide.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    request: RequestInfo,
    status: u16,
    headers: HeaderCollection,
    body: serde_json::Value,
    raw: Bytes,
}

fn mime_type(headers: &HeaderCollection) -> Option<String> {
    headers
        .get("content-type")
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
}

fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

/// Decode a raw body according to the response content type.
///
/// - `text/plain` is returned as a JSON string.
/// - An empty body is `null`.
/// - Anything else is parsed as JSON, falling back to a string unless the
///   content type claims JSON, in which case it is a parse error.
pub fn parse_body(headers: &HeaderCollection, raw: &[u8]) -> RestResult<serde_json::Value> {
    let mime = mime_type(headers);
    let text = String::from_utf8_lossy(raw);
    if mime.as_deref() == Some("text/plain") {
        return Ok(serde_json::Value::String(text.into_owned()));
    }
    if raw.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    match serde_json::from_slice(raw) {
        Ok(value) => Ok(value),
        Err(e) if mime.as_deref().is_some_and(is_json_mime) => Err(RestError::parse(
            format!("Error \"{e}\" occurred while parsing the response body - {text}."),
            e,
        )),
        Err(_) => Ok(serde_json::Value::String(text.into_owned())),
    }
}

impl HttpResponse {
    pub fn new(
        request: RequestInfo,
        status: u16,
        headers: HeaderCollection,
        body: serde_json::Value,
        raw: Bytes,
    ) -> Self {
        Self {
            request,
            status,
            headers,
            body,
            raw,
        }
    }

    /// Read and decode a pipeline response.
    pub async fn from_response(response: Response) -> RestResult<Self> {
        let request = response.request.clone();
        let status = response.status;
        let headers = response.headers.clone();
        let raw = response.bytes().await?;
        let body = parse_body(&headers, &raw).map_err(|e| {
            e.with_response(ResponseSnapshot {
                request: request.clone(),
                status,
                headers: headers.clone(),
                body: Some(raw.clone()),
            })
        })?;
        Ok(Self::new(request, status, headers, body, raw))
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    /// The decoded body.
    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// The body exactly as received.
    pub fn raw_body(&self) -> &Bytes {
        &self.raw
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the decoded body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> RestResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            RestError::parse(
                format!("Error \"{e}\" occurred while deserializing the response body."),
                e,
            )
            .with_response(self.snapshot())
        })
    }

    /// Turn a non-success response into a [`RestError`].
    pub fn error_for_status(self) -> RestResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(create_rest_error(&self))
        }
    }

    pub fn snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            request: self.request.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: Some(self.raw.clone()),
        }
    }
}

/// A response whose body has not been read yet.
///
/// Implements [`Stream`] over body chunks.
pub struct StreamingResponse {
    request: RequestInfo,
    status: u16,
    headers: HeaderCollection,
    body: BodyStream,
}

impl StreamingResponse {
    pub fn from_response(response: Response) -> Self {
        let request = response.request.clone();
        let status = response.status;
        let headers = response.headers.clone();
        Self {
            request,
            status,
            headers,
            body: response.into_stream(),
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("request", &self.request)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Stream for StreamingResponse {
    type Item = RestResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

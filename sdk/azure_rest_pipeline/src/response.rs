use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::{RestError, RestResult};
use crate::headers::HeaderCollection;
use crate::request::RequestInfo;

/// A stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = RestResult<Bytes>> + Send>>;

/// Response payload, either fully read or still streaming.
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Streaming(_) => write!(f, "Streaming(..)"),
        }
    }
}

/// A response received from the transport.
///
/// Non-success statuses are still `Ok(Response)` inside the pipeline; only
/// failures to obtain a response at all become errors.
#[derive(Debug)]
pub struct Response {
    pub request: RequestInfo,
    pub status: u16,
    pub headers: HeaderCollection,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(
        request: RequestInfo,
        status: u16,
        headers: HeaderCollection,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            request,
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn streaming(
        request: RequestInfo,
        status: u16,
        headers: HeaderCollection,
        body: BodyStream,
    ) -> Self {
        Self {
            request,
            status,
            headers,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body, if it has already been read.
    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    /// Read the whole body.
    pub async fn bytes(self) -> RestResult<Bytes> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub async fn text(self) -> RestResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> RestResult<T> {
        let request = self.request.clone();
        let status = self.status;
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let message = format!(
                "Error \"{e}\" occurred while parsing the response body - {}.",
                String::from_utf8_lossy(&bytes)
            );
            RestError::parse(message, e)
                .with_status_code(status)
                .with_request(request)
        })
    }

    /// Turn the body into a stream of chunks, buffered or not.
    pub fn into_stream(self) -> BodyStream {
        match self.body {
            ResponseBody::Buffered(bytes) => {
                Box::pin(futures::stream::once(async move { Ok::<_, RestError>(bytes) }))
            }
            ResponseBody::Streaming(stream) => stream,
        }
    }

    /// A cloneable copy of everything except a streaming body.
    pub fn snapshot(&self) -> ResponseSnapshot {
        ResponseSnapshot {
            request: self.request.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.buffered_body().cloned(),
        }
    }
}

/// Cloneable view of a response, attached to errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub request: RequestInfo,
    pub status: u16,
    pub headers: HeaderCollection,
    pub body: Option<Bytes>,
}

use std::sync::Arc;

use thiserror::Error;

use crate::request::RequestInfo;
use crate::response::ResponseSnapshot;

/// Error code used when a request could not be sent to the service.
pub const REQUEST_SEND_ERROR: &str = "REQUEST_SEND_ERROR";

/// Error code used when a response body could not be parsed.
pub const PARSE_ERROR: &str = "PARSE_ERROR";

/// Broad classification of a [`RestError`].
///
/// The retry machinery only ever retries [`ErrorKind::RequestSend`] and
/// [`ErrorKind::Timeout`]; every other kind is surfaced to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid pipeline or request configuration (ordering cycles, duplicate
    /// policy names, insecure URLs with authentication, bad URL input).
    Configuration,
    /// The request could not be delivered (connection, DNS, TLS, I/O).
    RequestSend,
    /// The request did not complete before its timeout elapsed.
    Timeout,
    /// The caller cancelled the operation through its abort signal.
    Cancelled,
    /// A response body could not be decoded.
    Parse,
    /// A credential failed to produce an access token.
    Authentication,
    /// The service answered with an unexpected status code.
    Service,
}

/// The single error type surfaced by the pipeline and the REST client.
///
/// Carries an optional service error `code`, the HTTP `status_code`, and the
/// request and response that produced it when those are known.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct RestError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    status_code: Option<u16>,
    request: Option<RequestInfo>,
    response: Option<Box<ResponseSnapshot>>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

/// Result type alias for pipeline operations.
pub type RestResult<T> = std::result::Result<T, RestError>;

impl RestError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status_code: None,
            request: None,
            response: None,
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// A transport failure, tagged with [`REQUEST_SEND_ERROR`].
    pub fn request_send(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorKind::RequestSend, message)
            .with_code(REQUEST_SEND_ERROR)
            .with_source(source)
    }

    /// A request timeout, tagged with [`REQUEST_SEND_ERROR`].
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_code(REQUEST_SEND_ERROR)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// A body decoding failure, tagged with [`PARSE_ERROR`].
    pub fn parse(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorKind::Parse, message)
            .with_code(PARSE_ERROR)
            .with_source(source)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// A non-success status returned by the service.
    pub fn service(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Service, message).with_status_code(status_code)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }

    /// Attach a response snapshot. Also fills in the status code when unset.
    pub fn with_response(mut self, response: ResponseSnapshot) -> Self {
        if self.status_code.is_none() {
            self.status_code = Some(response.status);
        }
        if self.request.is_none() {
            self.request = Some(response.request.clone());
        }
        self.response = Some(Box::new(response));
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseSnapshot> {
        self.response.as_deref()
    }

    /// Whether the failure happened while delivering the request.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::RequestSend | ErrorKind::Timeout)
    }

    /// Errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::Configuration)
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        let message = format!("Error \"{err}\" occurred while serializing or parsing JSON");
        RestError::parse(message, err)
    }
}

impl From<url::ParseError> for RestError {
    fn from(err: url::ParseError) -> Self {
        RestError::configuration(format!("Invalid URL: {err}")).with_source(err)
    }
}

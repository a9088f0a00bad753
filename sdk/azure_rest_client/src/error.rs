//! Structured service error bodies and their conversion into [`RestError`].
//!
//! Azure services report failures as
//! `{"error": {"code": ..., "message": ..., "details": [...], "innererror": {...}}}`.
//! [`create_rest_error`] reads that shape (or the bare inner object) from a
//! non-success [`HttpResponse`] and produces a [`RestError`] whose message
//! has credentials redacted and is capped in length.

use azure_rest_pipeline::error::{RestError, RestResult};
use serde::{Deserialize, Serialize};

use crate::response::HttpResponse;

/// Maximum length for error messages taken from response bodies.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

const REDACTED: &str = "[REDACTED]";

/// The `error` object of a service error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModel {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub innererror: Option<InnerError>,
}

/// Nested service-specific error detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub innererror: Option<Box<InnerError>>,
}

/// Top-level service error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorModel,
}

impl ErrorResponse {
    /// Parse a service error body from JSON bytes.
    pub fn from_slice(body: &[u8]) -> RestResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Build a [`RestError`] from a response, reading `code` and `message` from
/// the body's `error` object, or from the body itself when it has none.
///
/// The message falls back to `Unexpected status code: <status>`.
pub fn create_rest_error(response: &HttpResponse) -> RestError {
    let message = inner_error(response)
        .and_then(|inner| inner.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unexpected status code: {}", response.status()));
    create_rest_error_with_message(message, response)
}

/// Like [`create_rest_error`] with a caller-chosen message.
pub fn create_rest_error_with_message(message: impl AsRef<str>, response: &HttpResponse) -> RestError {
    let mut error = RestError::service(response.status(), truncate_message(message.as_ref()))
        .with_response(response.snapshot());
    if let Some(code) = inner_error(response)
        .and_then(|inner| inner.get("code"))
        .and_then(|c| c.as_str())
    {
        error = error.with_code(code);
    }
    error
}

fn inner_error(response: &HttpResponse) -> Option<&serde_json::Value> {
    let body = response.body();
    match body.get("error") {
        Some(inner) if inner.is_object() => Some(inner),
        _ if body.is_object() => Some(body),
        _ => None,
    }
}

fn token_end(s: &str, from: usize) -> usize {
    s[from..]
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
        .map(|pos| from + pos)
        .unwrap_or(s.len())
}

/// Redact bearer tokens and `sk-` style keys from a message.
pub fn sanitize_error_message(msg: &str) -> String {
    let mut result = msg.to_string();

    let mut search_start = 0;
    while let Some(relative) = result[search_start..].find("Bearer ") {
        let token_start = search_start + relative + "Bearer ".len();
        if result[token_start..].starts_with(REDACTED) {
            search_start = token_start + REDACTED.len();
            continue;
        }
        let end = token_end(&result, token_start);
        if end > token_start {
            result.replace_range(token_start..end, REDACTED);
            search_start = token_start + REDACTED.len();
        } else {
            search_start = token_start;
        }
    }

    search_start = 0;
    while let Some(relative) = result[search_start..].find("sk-") {
        let key_start = search_start + relative;
        let end = token_end(&result, key_start);
        if end > key_start + 3 {
            result.replace_range(key_start..end, REDACTED);
            search_start = key_start + REDACTED.len();
        } else {
            search_start = key_start + 3;
        }
    }

    result
}

/// Sanitize, then cap at [`MAX_ERROR_MESSAGE_LEN`] bytes.
pub fn truncate_message(msg: &str) -> String {
    let sanitized = sanitize_error_message(msg);
    if sanitized.len() <= MAX_ERROR_MESSAGE_LEN {
        return sanitized;
    }
    let mut cut = MAX_ERROR_MESSAGE_LEN;
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &sanitized[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_rest_pipeline::error::ErrorKind;
    use azure_rest_pipeline::headers::HeaderCollection;
    use azure_rest_pipeline::request::RequestInfo;
    use serde_json::json;

    fn response(status: u16, body: serde_json::Value) -> HttpResponse {
        let request = RequestInfo {
            method: reqwest::Method::GET,
            url: url::Url::parse("https://example.com/items").unwrap(),
            request_id: "req-1".into(),
        };
        HttpResponse::new(request, status, HeaderCollection::new(), body, Default::default())
    }

    // -----------------------------------------------------------------------
    // create_rest_error
    // -----------------------------------------------------------------------

    #[test]
    fn reads_code_and_message_from_error_object() {
        let err = create_rest_error(&response(
            404,
            json!({"error": {"code": "NotFound", "message": "Resource missing"}}),
        ));
        assert_eq!(err.kind(), ErrorKind::Service);
        assert_eq!(err.message(), "Resource missing");
        assert_eq!(err.code(), Some("NotFound"));
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.request().map(|r| r.request_id.as_str()), Some("req-1"));
        assert_eq!(err.response().map(|r| r.status), Some(404));
    }

    #[test]
    fn falls_back_to_bare_body() {
        let err = create_rest_error(&response(400, json!({"code": "Bad", "message": "nope"})));
        assert_eq!(err.message(), "nope");
        assert_eq!(err.code(), Some("Bad"));
    }

    #[test]
    fn falls_back_to_status_message() {
        let err = create_rest_error(&response(502, serde_json::Value::Null));
        assert_eq!(err.message(), "Unexpected status code: 502");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn explicit_message_wins() {
        let err = create_rest_error_with_message(
            "custom",
            &response(500, json!({"error": {"code": "X", "message": "ignored"}})),
        );
        assert_eq!(err.message(), "custom");
        assert_eq!(err.code(), Some("X"));
    }

    #[test]
    fn error_message_is_sanitized() {
        let err = create_rest_error(&response(
            401,
            json!({"error": {"code": "Unauthorized", "message": "token Bearer abc.def rejected"}}),
        ));
        assert_eq!(err.message(), "token Bearer [REDACTED] rejected");
    }

    #[test]
    fn error_response_deserializes_nested_details() {
        let body = br#"{"error":{"code":"InvalidRequest","message":"bad","target":"url",
            "details":[{"code":"InvalidImageUrl","message":"unreachable"}],
            "innererror":{"code":"InvalidImageUrl","innererror":{"code":"Timeout"}}}}"#;
        let parsed = ErrorResponse::from_slice(body).unwrap();
        assert_eq!(parsed.error.target.as_deref(), Some("url"));
        assert_eq!(parsed.error.details[0].code, "InvalidImageUrl");
        let inner = parsed.error.innererror.unwrap();
        assert_eq!(inner.innererror.unwrap().code.as_deref(), Some("Timeout"));
    }

    // -----------------------------------------------------------------------
    // sanitize / truncate
    // -----------------------------------------------------------------------

    #[test]
    fn sanitization_removes_bearer_tokens_and_keys() {
        let msg = "Bearer abc, Bearer [REDACTED] and key sk-1234567890 leaked";
        assert_eq!(
            sanitize_error_message(msg),
            "Bearer [REDACTED], Bearer [REDACTED] and key [REDACTED] leaked"
        );
    }

    #[test]
    fn sanitization_preserves_legitimate_errors() {
        let msg = "The image URL is not reachable (timed out after 30s)";
        assert_eq!(sanitize_error_message(msg), msg);
    }

    #[test]
    fn sanitization_happens_before_truncation() {
        let msg = format!("Bearer secret-token {}", "x".repeat(2000));
        let truncated = truncate_message(&msg);
        assert!(truncated.starts_with("Bearer [REDACTED] "));
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.len(), MAX_ERROR_MESSAGE_LEN + "... (truncated)".len());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let msg = "é".repeat(MAX_ERROR_MESSAGE_LEN);
        let truncated = truncate_message(&msg);
        assert!(truncated.ends_with("... (truncated)"));
    }
}

//! Redaction of headers and query parameters before they reach logs.

use std::collections::HashSet;

use url::Url;

use crate::headers::HeaderCollection;

/// Replacement shown for any value not on an allow list.
pub const REDACTED: &str = "REDACTED";

const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "x-ms-client-request-id",
    "x-ms-return-client-request-id",
    "x-ms-useragent",
    "x-ms-correlation-request-id",
    "x-ms-request-id",
    "client-request-id",
    "ms-cv",
    "return-client-request-id",
    "traceparent",
    "Access-Control-Allow-Credentials",
    "Access-Control-Allow-Headers",
    "Access-Control-Allow-Methods",
    "Access-Control-Allow-Origin",
    "Access-Control-Expose-Headers",
    "Access-Control-Max-Age",
    "Access-Control-Request-Headers",
    "Access-Control-Request-Method",
    "Origin",
    "Accept",
    "Accept-Encoding",
    "Cache-Control",
    "Connection",
    "Content-Length",
    "Content-Type",
    "Date",
    "ETag",
    "Expires",
    "If-Match",
    "If-Modified-Since",
    "If-None-Match",
    "If-Unmodified-Since",
    "Last-Modified",
    "Pragma",
    "Request-Id",
    "Retry-After",
    "Server",
    "Transfer-Encoding",
    "User-Agent",
    "WWW-Authenticate",
];

const DEFAULT_ALLOWED_QUERY_PARAMETERS: &[&str] = &["api-version"];

/// Redacts everything that is not explicitly allowed.
///
/// Header and query parameter names are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_headers: HashSet<String>,
    allowed_query_parameters: HashSet<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl Sanitizer {
    /// Build a sanitizer that allows the defaults plus the given names.
    pub fn new(additional_headers: &[String], additional_query_parameters: &[String]) -> Self {
        let allowed_headers = DEFAULT_ALLOWED_HEADERS
            .iter()
            .copied()
            .chain(additional_headers.iter().map(String::as_str))
            .map(str::to_ascii_lowercase)
            .collect();
        let allowed_query_parameters = DEFAULT_ALLOWED_QUERY_PARAMETERS
            .iter()
            .copied()
            .chain(additional_query_parameters.iter().map(String::as_str))
            .map(str::to_ascii_lowercase)
            .collect();
        Self {
            allowed_headers,
            allowed_query_parameters,
        }
    }

    pub fn is_header_allowed(&self, name: &str) -> bool {
        self.allowed_headers.contains(&name.to_ascii_lowercase())
    }

    pub fn sanitize_headers(&self, headers: &HeaderCollection) -> HeaderCollection {
        headers
            .iter()
            .map(|(name, value)| {
                let value = if self.is_header_allowed(name) {
                    value
                } else {
                    REDACTED
                };
                (name.to_string(), value.to_string())
            })
            .collect()
    }

    /// Render a URL with every non-allowed query value replaced.
    pub fn sanitize_url(&self, url: &Url) -> String {
        if url.query().is_none() {
            return url.to_string();
        }
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| {
                let value = if self
                    .allowed_query_parameters
                    .contains(&name.to_ascii_lowercase())
                {
                    value.into_owned()
                } else {
                    REDACTED.to_string()
                };
                (name.into_owned(), value)
            })
            .collect();
        let mut sanitized = url.clone();
        sanitized.query_pairs_mut().clear().extend_pairs(pairs);
        sanitized.to_string()
    }
}

//! Request URL construction from an endpoint, a route template and
//! query parameters.
//!
//! ```
//! use azure_rest_client::url_builder::{build_request_url, QueryValue, UrlOptions};
//!
//! let options = UrlOptions::default()
//!     .query("features", QueryValue::from(vec!["caption", "read"]))
//!     .query("model-version", QueryValue::Null);
//! let url = build_request_url(
//!     "https://example.cognitiveservices.azure.com/computervision",
//!     "/models/{model}:analyze",
//!     &["latest"],
//!     &options,
//! )?;
//! assert_eq!(
//!     url.as_str(),
//!     "https://example.cognitiveservices.azure.com/computervision/models/latest:analyze?features=caption%2Cread"
//! );
//! # Ok::<(), azure_rest_pipeline::RestError>(())
//! ```

use std::collections::BTreeMap;

use azure_rest_pipeline::error::{RestError, RestResult};
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left alone when encoding a single path or endpoint segment.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Omitted from the URL.
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Rendered as ISO-8601 with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
    DateTime(DateTime<Utc>),
    /// Comma-joined.
    List(Vec<QueryValue>),
    /// Arbitrary JSON. Objects have no string form and are rejected.
    Json(serde_json::Value),
}

impl QueryValue {
    /// The string form of this value, or `None` when it should be omitted.
    pub fn to_query_string(&self, key: &str) -> RestResult<Option<String>> {
        let value = match self {
            Self::Null | Self::Json(serde_json::Value::Null) => return Ok(None),
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::List(items) => join_list(items.iter().map(|item| item.to_query_string(key)))?,
            Self::Json(json) => match json {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Array(items) => join_list(
                    items
                        .iter()
                        .map(|item| Self::Json(item.clone()).to_query_string(key)),
                )?,
                _ => return Err(not_representable(key)),
            },
        };
        Ok(Some(value))
    }
}

fn join_list(items: impl Iterator<Item = RestResult<Option<String>>>) -> RestResult<String> {
    let parts = items
        .map(|item| item.map(Option::unwrap_or_default))
        .collect::<RestResult<Vec<_>>>()?;
    Ok(parts.join(","))
}

fn not_representable(key: &str) -> RestError {
    RestError::configuration(format!(
        "Query parameters must be able to be represented as string, {key} can't"
    ))
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

macro_rules! integer_query_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for QueryValue {
            fn from(value: $ty) -> Self {
                Self::Integer(i64::from(value))
            }
        })*
    };
}

integer_query_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<DateTime<Utc>> for QueryValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<serde_json::Value> for QueryValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

/// Inputs to [`build_request_url`] beyond the route and its positional arguments.
#[derive(Debug, Clone, Default)]
pub struct UrlOptions {
    /// Values for `{name}` placeholders inside the endpoint itself.
    pub path_parameters: BTreeMap<String, String>,
    /// Query parameters, appended in insertion order.
    pub query_parameters: Vec<(String, QueryValue)>,
    /// Disable percent-encoding of path segments and query values.
    pub skip_url_encoding: bool,
}

impl UrlOptions {
    pub fn path_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_parameters.push((name.into(), value.into()));
        self
    }

    pub fn skip_url_encoding(mut self, skip: bool) -> Self {
        self.skip_url_encoding = skip;
        self
    }
}

fn encode(value: &str, skip: bool) -> String {
    if skip {
        value.to_string()
    } else {
        utf8_percent_encode(value, COMPONENT).to_string()
    }
}

/// Replace every `{name}` in the endpoint with its named value.
pub fn build_base_url(endpoint: &str, options: &UrlOptions) -> String {
    options
        .path_parameters
        .iter()
        .fold(endpoint.to_string(), |acc, (name, value)| {
            acc.replace(
                &format!("{{{name}}}"),
                &encode(value, options.skip_url_encoding),
            )
        })
}

/// Position and length of the first `{word}` placeholder at or after `from`.
fn next_placeholder(route: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = route.as_bytes();
    let mut start = from;
    while let Some(open) = route[start..].find('{').map(|i| start + i) {
        let mut end = open + 1;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        if end > open + 1 && end < bytes.len() && bytes[end] == b'}' {
            return Some((open, end + 1 - open));
        }
        start = open + 1;
    }
    None
}

/// Fill route placeholders left to right with positional arguments.
///
/// Placeholder names are ignored. Substituted text is never rescanned, so a
/// value containing `{x}` stays as is. Missing arguments leave placeholders
/// in place and extra arguments are dropped.
pub fn build_route_path<S: AsRef<str>>(route: &str, args: &[S], skip_url_encoding: bool) -> String {
    let mut out = String::with_capacity(route.len());
    let mut cursor = 0;
    for arg in args {
        let Some((at, len)) = next_placeholder(route, cursor) else {
            break;
        };
        out.push_str(&route[cursor..at]);
        out.push_str(&encode(arg.as_ref(), skip_url_encoding));
        cursor = at + len;
    }
    out.push_str(&route[cursor..]);
    out
}

fn append_query_params(url: &mut Url, options: &UrlOptions) -> RestResult<()> {
    let mut pairs = Vec::with_capacity(options.query_parameters.len());
    for (key, value) in &options.query_parameters {
        if let Some(value) = value.to_query_string(key)? {
            pairs.push((key.as_str(), value));
        }
    }
    if pairs.is_empty() {
        return Ok(());
    }

    if options.skip_url_encoding {
        let existing = url.query().map(str::to_string);
        let appended = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let query = match existing {
            Some(existing) if !existing.is_empty() => format!("{existing}&{appended}"),
            _ => appended,
        };
        url.set_query(Some(&query));
    } else {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(())
}

/// Collapse runs of `/` except directly after a `:`.
fn collapse_double_slashes(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if c == '/' && out.ends_with('/') {
            let before = out[..out.len() - 1].chars().next_back();
            if matches!(before, Some(prev) if prev != ':') {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn parse(url: &str) -> RestResult<Url> {
    Url::parse(url).map_err(|e| RestError::configuration(format!("Invalid URL '{url}'")).with_source(e))
}

/// Build the full request URL.
///
/// An absolute `http(s)://` route is returned as is. Otherwise the endpoint
/// and the filled-in route are joined with `/`, query parameters appended and
/// doubled slashes removed.
pub fn build_request_url<S: AsRef<str>>(
    endpoint: &str,
    route: &str,
    path_args: &[S],
    options: &UrlOptions,
) -> RestResult<Url> {
    if route.starts_with("https://") || route.starts_with("http://") {
        return parse(route);
    }

    let endpoint = build_base_url(endpoint, options);
    let route = build_route_path(route, path_args, options.skip_url_encoding);
    let mut url = parse(&format!("{endpoint}/{route}"))?;
    append_query_params(&mut url, options)?;
    parse(&collapse_double_slashes(url.as_str()))
}

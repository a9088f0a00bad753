//! Case-insensitive HTTP header storage.
//!
//! [`HeaderCollection`] keeps the casing a header was first set with, looks
//! names up without regard to case, and iterates in insertion order.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{RestError, RestResult};

/// An ordered, case-insensitive collection of HTTP headers.
///
/// # Example
///
/// ```
/// use azure_rest_pipeline::headers::HeaderCollection;
///
/// let mut headers = HeaderCollection::new();
/// headers.set("Content-Type", "application/json");
///
/// assert_eq!(headers.get("content-type"), Some("application/json"));
/// assert!(headers.has("CONTENT-TYPE"));
/// ```
#[derive(Clone, Default)]
pub struct HeaderCollection {
    entries: Vec<(String, String)>,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Get the value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|idx| self.entries[idx].1.as_str())
    }

    /// Set a header. An existing header with the same name (in any casing)
    /// is overwritten in place and keeps its original casing and position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove a header, returning its value.
    pub fn delete(&mut self, name: &str) -> Option<String> {
        self.position(name)
            .map(|idx| self.entries.remove(idx).1)
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy the headers into a plain map. Names are lower-cased unless
    /// `preserve_case` is set.
    pub fn to_map(&self, preserve_case: bool) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(name, value)| {
                let key = if preserve_case {
                    name.clone()
                } else {
                    name.to_ascii_lowercase()
                };
                (key, value.clone())
            })
            .collect()
    }

    /// Convert to a `reqwest` header map for sending.
    pub fn to_header_map(&self) -> RestResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                RestError::configuration(format!("Invalid header name '{name}'")).with_source(e)
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                RestError::configuration(format!("Invalid value for header '{name}'"))
                    .with_source(e)
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

impl From<&HeaderMap> for HeaderCollection {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = HeaderCollection::new();
        for (name, value) in map {
            // Non-UTF-8 values are dropped rather than mangled.
            if let Ok(value) = value.to_str() {
                match headers.get(name.as_str()) {
                    Some(existing) => {
                        let joined = format!("{existing}, {value}");
                        headers.set(name.as_str(), joined);
                    }
                    None => headers.set(name.as_str(), value),
                }
            }
        }
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderCollection
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = HeaderCollection::new();
        headers.extend(iter);
        headers
    }
}

impl<K, V> Extend<(K, V)> for HeaderCollection
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.set(name, value);
        }
    }
}

impl PartialEq for HeaderCollection {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl Eq for HeaderCollection {}

impl fmt::Debug for HeaderCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for HeaderCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(&name.to_ascii_lowercase(), value)?;
        }
        map.end()
    }
}

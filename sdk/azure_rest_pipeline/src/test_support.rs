//! In-memory transport and credential doubles.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for crates built on top of it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{AccessToken, GetTokenOptions, TokenCredential};
use crate::error::{RestError, RestResult};
use crate::headers::HeaderCollection;
use crate::request::Request;
use crate::response::Response;
use crate::transport::HttpClient;

/// One canned transport outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Status(u16, Vec<(String, String)>, String),
    Error(RestError),
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Self::Status(status, Vec::new(), String::new())
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            Self::Status(status, mut headers, body) => {
                headers.push((name.to_string(), value.to_string()));
                Self::Status(status, headers, body)
            }
            other => other,
        }
    }

    pub fn with_body(self, body: &str) -> Self {
        match self {
            Self::Status(status, headers, _) => Self::Status(status, headers, body.to_string()),
            other => other,
        }
    }
}

/// Replays outcomes in order and records every request it sees.
///
/// When the script runs out the last outcome repeats.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedHttpClient {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send_request(&self, request: &Request) -> RestResult<Response> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let outcome = match next {
            Some(outcome) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(outcome.clone());
                }
                outcome
            }
            None => self
                .last
                .lock()
                .ok()
                .and_then(|last| last.clone())
                .unwrap_or_else(|| Scripted::status(200)),
        };
        match outcome {
            Scripted::Status(status, headers, body) => Ok(Response::new(
                request.info(),
                status,
                headers.into_iter().collect::<HeaderCollection>(),
                body,
            )),
            Scripted::Error(err) => Err(err.with_request(request.info())),
        }
    }
}

/// Hands out a fixed token and counts how often it was asked.
#[derive(Debug)]
pub struct StaticTokenCredential {
    token: String,
    expires_on: DateTime<Utc>,
    calls: AtomicUsize,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self::expiring(token, Utc::now() + chrono::Duration::hours(1))
    }

    pub fn expiring(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(
        &self,
        _scopes: &[String],
        _options: &GetTokenOptions,
    ) -> RestResult<Option<AccessToken>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(AccessToken::new(self.token.clone(), self.expires_on)))
    }
}

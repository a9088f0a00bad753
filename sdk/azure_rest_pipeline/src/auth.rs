//! Credential abstractions consumed by the authentication policies.

use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::error::RestResult;

/// A bearer token and its lifetime.
#[derive(Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_on: DateTime<Utc>,
    /// Earliest time at which a proactive refresh is recommended.
    pub refresh_after: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_on,
            refresh_after: None,
        }
    }

    pub fn with_refresh_after(mut self, refresh_after: DateTime<Utc>) -> Self {
        self.refresh_after = Some(refresh_after);
        self
    }

    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"****")
            .field("expires_on", &self.expires_on)
            .field("refresh_after", &self.refresh_after)
            .finish()
    }
}

/// Extra inputs for a token request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetTokenOptions {
    /// Claims requested by a service challenge.
    pub claims: Option<String>,
    pub tenant_id: Option<String>,
}

/// A source of bearer tokens.
///
/// `Ok(None)` means the credential could not produce a token this time but
/// did not fail outright; callers may try again later.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> RestResult<Option<AccessToken>>;
}

/// A rotatable API key.
pub struct KeyCredential {
    key: RwLock<SecretString>,
}

impl KeyCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(SecretString::from(key.into())),
        }
    }

    /// Replace the key. In-flight requests keep the old value.
    pub fn update(&self, key: impl Into<String>) {
        let mut guard = self.key.write().unwrap_or_else(|e| e.into_inner());
        *guard = SecretString::from(key.into());
    }

    pub fn key(&self) -> String {
        self.key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .expose_secret()
            .to_string()
    }
}

impl fmt::Debug for KeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyCredential(****)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_debug_redacts_secret() {
        let token = AccessToken::new("super-secret", Utc::now());
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("****"));
        assert_eq!(token.secret(), "super-secret");
    }

    #[test]
    fn key_credential_can_rotate() {
        let credential = KeyCredential::new("first");
        assert_eq!(credential.key(), "first");
        credential.update("second");
        assert_eq!(credential.key(), "second");
        assert_eq!(format!("{credential:?}"), "KeyCredential(****)");
    }
}

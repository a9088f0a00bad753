use std::sync::Arc;

use azure_rest_pipeline::auth::{KeyCredential, TokenCredential};
use azure_rest_pipeline::error::{RestError, RestResult};

/// Environment variable holding an API key.
pub const KEY_ENV_VAR: &str = "VISION_KEY";

/// Scope requested for token credentials unless overridden.
pub const DEFAULT_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// How a client authenticates.
#[derive(Clone)]
pub enum ClientCredential {
    /// API key sent in a header, `Ocp-Apim-Subscription-Key` by default.
    Key(Arc<KeyCredential>),
    /// Microsoft Entra ID bearer tokens.
    Token(Arc<dyn TokenCredential>),
}

impl ClientCredential {
    /// Read an API key from `VISION_KEY`.
    pub fn from_env() -> RestResult<Self> {
        match std::env::var(KEY_ENV_VAR) {
            Ok(key) if !key.is_empty() => Ok(Self::api_key(key)),
            _ => Err(RestError::configuration(format!(
                "no credential configured. Set one via builder or {KEY_ENV_VAR} env var."
            ))),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::Key(Arc::new(KeyCredential::new(key)))
    }

    pub fn token_credential(credential: impl TokenCredential + 'static) -> Self {
        Self::Token(Arc::new(credential))
    }
}

impl From<Arc<KeyCredential>> for ClientCredential {
    fn from(credential: Arc<KeyCredential>) -> Self {
        Self::Key(credential)
    }
}

impl From<Arc<dyn TokenCredential>> for ClientCredential {
    fn from(credential: Arc<dyn TokenCredential>) -> Self {
        Self::Token(credential)
    }
}

impl std::fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(_) => write!(f, "ClientCredential::Key(****)"),
            Self::Token(_) => write!(f, "ClientCredential::Token"),
        }
    }
}

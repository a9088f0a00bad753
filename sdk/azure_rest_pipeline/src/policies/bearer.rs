use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AccessToken, GetTokenOptions, TokenCredential};
use crate::error::{RestError, RestResult};
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;
use crate::token_cycler::TokenCycler;

pub const BEARER_TOKEN_AUTHENTICATION_POLICY_NAME: &str = "bearerTokenAuthenticationPolicy";

const WWW_AUTHENTICATE: &str = "WWW-Authenticate";

/// Reject anything but `https://` before a token is attached.
pub(crate) fn ensure_tls(request: &Request, message: &str) -> RestResult<()> {
    if request.url.scheme().eq_ignore_ascii_case("https") {
        Ok(())
    } else {
        Err(RestError::configuration(message).with_request(request.info()))
    }
}

/// Token access handed to [`ChallengeHandler`] callbacks.
pub struct AuthorizeRequestContext<'a> {
    pub scopes: &'a [String],
    cycler: &'a TokenCycler,
}

impl AuthorizeRequestContext<'_> {
    /// Fetch a token through the policy's shared cycler.
    pub async fn get_access_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
        request: &Request,
    ) -> RestResult<AccessToken> {
        self.cycler
            .get_token(scopes, options, request.abort_signal.as_ref())
            .await
            .map_err(|e| e.with_request(request.info()))
    }
}

/// Attach `Authorization: Bearer <token>` using the default token options.
pub async fn default_authorize_request(
    context: &AuthorizeRequestContext<'_>,
    request: &mut Request,
) -> RestResult<()> {
    let token = context
        .get_access_token(context.scopes, &GetTokenOptions::default(), request)
        .await?;
    request
        .headers
        .set("Authorization", format!("Bearer {}", token.secret()));
    Ok(())
}

/// Hooks for customizing how requests are authorized.
#[async_trait]
pub trait ChallengeHandler: Send + Sync {
    /// Authorize the request before it is first sent.
    async fn authorize_request(
        &self,
        context: &AuthorizeRequestContext<'_>,
        request: &mut Request,
    ) -> RestResult<()> {
        default_authorize_request(context, request).await
    }

    /// Called on a 401 carrying a `WWW-Authenticate` header. Return `true`
    /// after re-authorizing `request` to have it sent again once.
    async fn authorize_request_on_challenge(
        &self,
        _context: &AuthorizeRequestContext<'_>,
        _request: &mut Request,
        _response: &Response,
    ) -> RestResult<bool> {
        Ok(false)
    }
}

/// Handler with the default authorization and no challenge support.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultChallengeHandler;

impl ChallengeHandler for DefaultChallengeHandler {}

/// One parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: String,
    pub parameters: BTreeMap<String, String>,
}

impl AuthChallenge {
    /// Parse a header such as
    /// `Bearer authorization_uri="https://login", error="insufficient_claims"`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) => (scheme, rest),
            None => (header, ""),
        };
        if scheme.is_empty() {
            return None;
        }

        let mut parameters = BTreeMap::new();
        let mut remaining = rest.trim_start();
        while !remaining.is_empty() {
            let Some((key, after_key)) = remaining.split_once('=') else {
                break;
            };
            let key = key.trim().trim_start_matches(',').trim();
            let after_key = after_key.trim_start();
            let (value, tail) = if let Some(quoted) = after_key.strip_prefix('"') {
                match quoted.find('"') {
                    Some(end) => (&quoted[..end], &quoted[end + 1..]),
                    None => (quoted, ""),
                }
            } else {
                match after_key.find(',') {
                    Some(end) => (after_key[..end].trim(), &after_key[end..]),
                    None => (after_key.trim(), ""),
                }
            };
            if !key.is_empty() {
                parameters.insert(key.to_string(), value.to_string());
            }
            remaining = tail.trim_start().trim_start_matches(',').trim_start();
        }

        Some(Self {
            scheme: scheme.to_string(),
            parameters,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// Authorizes requests with bearer tokens from a [`TokenCredential`].
///
/// Tokens are cached per credential, so policies built from the same
/// credential `Arc` share one token. Only `https` URLs are accepted.
pub struct BearerTokenAuthenticationPolicy {
    scopes: Vec<String>,
    cycler: TokenCycler,
    handler: Arc<dyn ChallengeHandler>,
}

impl BearerTokenAuthenticationPolicy {
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        Self::with_cycler(TokenCycler::new(credential), scopes)
    }

    pub fn with_cycler(cycler: TokenCycler, scopes: Vec<String>) -> Self {
        Self {
            scopes,
            cycler,
            handler: Arc::new(DefaultChallengeHandler),
        }
    }

    pub fn with_challenge_handler(mut self, handler: Arc<dyn ChallengeHandler>) -> Self {
        self.handler = handler;
        self
    }
}

impl std::fmt::Debug for BearerTokenAuthenticationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthenticationPolicy")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Policy for BearerTokenAuthenticationPolicy {
    fn name(&self) -> &str {
        BEARER_TOKEN_AUTHENTICATION_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        ensure_tls(
            request,
            "Bearer token authentication is not permitted for non-TLS protected (non-https) URLs.",
        )?;

        let context = AuthorizeRequestContext {
            scopes: &self.scopes,
            cycler: &self.cycler,
        };
        self.handler.authorize_request(&context, request).await?;

        let response = next.run(request).await?;
        if response.status == 401 && response.headers.has(WWW_AUTHENTICATE) {
            tracing::debug!(
                request_id = %request.request_id,
                "received authentication challenge"
            );
            if self
                .handler
                .authorize_request_on_challenge(&context, request, &response)
                .await?
            {
                return next.run(request).await;
            }
        }
        Ok(response)
    }
}

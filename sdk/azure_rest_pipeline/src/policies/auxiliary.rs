use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::auth::{GetTokenOptions, TokenCredential};
use crate::error::RestResult;
use crate::pipeline::{Next, Policy};
use crate::policies::bearer::ensure_tls;
use crate::request::Request;
use crate::response::Response;
use crate::token_cycler::TokenCycler;

pub const AUXILIARY_AUTHENTICATION_HEADER_POLICY_NAME: &str =
    "auxiliaryAuthenticationHeaderPolicy";

/// Header carrying tokens for additional tenants.
pub const AUXILIARY_AUTHORIZATION_HEADER: &str = "x-ms-authorization-auxiliary";

/// Adds `x-ms-authorization-auxiliary` with one bearer token per credential.
///
/// Used for cross-tenant calls where the service needs tokens beyond the
/// primary `Authorization` header.
pub struct AuxiliaryAuthenticationHeaderPolicy {
    scopes: Vec<String>,
    cyclers: Vec<TokenCycler>,
}

impl AuxiliaryAuthenticationHeaderPolicy {
    pub fn new(credentials: Vec<Arc<dyn TokenCredential>>, scopes: Vec<String>) -> Self {
        Self {
            scopes,
            cyclers: credentials.into_iter().map(TokenCycler::new).collect(),
        }
    }
}

impl std::fmt::Debug for AuxiliaryAuthenticationHeaderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxiliaryAuthenticationHeaderPolicy")
            .field("scopes", &self.scopes)
            .field("credentials", &self.cyclers.len())
            .finish()
    }
}

#[async_trait]
impl Policy for AuxiliaryAuthenticationHeaderPolicy {
    fn name(&self) -> &str {
        AUXILIARY_AUTHENTICATION_HEADER_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        ensure_tls(
            request,
            "Bearer token authentication for auxiliary header is not permitted for non-TLS protected (non-https) URLs.",
        )?;

        if self.cyclers.is_empty() {
            tracing::info!("no auxiliary credentials configured, skipping auxiliary header");
            return next.run(request).await;
        }

        let options = GetTokenOptions::default();
        let abort = request.abort_signal.clone();
        let tokens = try_join_all(
            self.cyclers
                .iter()
                .map(|cycler| cycler.get_token(&self.scopes, &options, abort.as_ref())),
        )
        .await
        .map_err(|e| e.with_request(request.info()))?;

        let values: Vec<String> = tokens
            .iter()
            .map(|token| token.secret())
            .filter(|secret| !secret.is_empty())
            .map(|secret| format!("Bearer {secret}"))
            .collect();

        if values.is_empty() {
            tracing::warn!("auxiliary credentials produced no tokens, skipping auxiliary header");
        } else {
            request
                .headers
                .set(AUXILIARY_AUTHORIZATION_HEADER, values.join(", "));
        }
        next.run(request).await
    }
}

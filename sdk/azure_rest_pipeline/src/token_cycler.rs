//! Cached, single-flight access token acquisition.
//!
//! A [`TokenCycler`] wraps a [`TokenCredential`] and hands out the cached
//! token while it is fresh. Near expiry it refreshes: in the background when
//! the token is still usable, synchronously when it is not. Concurrent callers
//! always share a single in-flight refresh.
//!
//! Cache state is keyed by credential identity: every cycler built from the
//! same `Arc<dyn TokenCredential>` sees the same token and the same refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

use crate::auth::{AccessToken, GetTokenOptions, TokenCredential};
use crate::error::{RestError, RestResult};

/// Refresh timing for a [`TokenCycler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCyclerOptions {
    /// Tokens this close to expiry are treated as already expired.
    pub forced_refresh_window: Duration,
    /// Delay between attempts while a refresh keeps failing.
    pub retry_interval: Duration,
    /// Tokens this close to expiry are refreshed in the background.
    pub refresh_window: Duration,
}

impl Default for TokenCyclerOptions {
    fn default() -> Self {
        Self {
            forced_refresh_window: Duration::from_secs(1),
            retry_interval: Duration::from_secs(3),
            refresh_window: Duration::from_secs(120),
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, RestResult<AccessToken>>>;

#[derive(Default)]
struct CyclerState {
    token: Option<AccessToken>,
    scopes: Vec<String>,
    tenant_id: Option<String>,
    refresh: Option<RefreshFuture>,
}

fn lock(state: &Mutex<CyclerState>) -> MutexGuard<'_, CyclerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

type StateRegistry = Mutex<HashMap<usize, Weak<Mutex<CyclerState>>>>;

fn registry() -> &'static StateRegistry {
    static REGISTRY: OnceLock<StateRegistry> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

fn credential_key(credential: &Arc<dyn TokenCredential>) -> usize {
    Arc::as_ptr(credential).cast::<()>() as usize
}

/// The cache shared by all cyclers of `credential`.
///
/// Entries are weak. A live state always holds the credential alive through
/// its cyclers or its refresh future, so a key is never reused while its
/// state is reachable.
fn shared_state(credential: &Arc<dyn TokenCredential>) -> Arc<Mutex<CyclerState>> {
    let mut states = registry().lock().unwrap_or_else(|e| e.into_inner());
    states.retain(|_, state| state.strong_count() > 0);

    let key = credential_key(credential);
    if let Some(state) = states.get(&key).and_then(Weak::upgrade) {
        return state;
    }
    let state = Arc::new(Mutex::new(CyclerState::default()));
    states.insert(key, Arc::downgrade(&state));
    state
}

fn window(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Memoizes tokens from one credential.
///
/// Cyclers created from the same credential `Arc` share their cache, so two
/// clients built with one credential acquire a token once.
#[derive(Clone)]
pub struct TokenCycler {
    credential: Arc<dyn TokenCredential>,
    options: TokenCyclerOptions,
    state: Arc<Mutex<CyclerState>>,
}

impl TokenCycler {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self::with_options(credential, TokenCyclerOptions::default())
    }

    pub fn with_options(credential: Arc<dyn TokenCredential>, options: TokenCyclerOptions) -> Self {
        let state = shared_state(&credential);
        Self {
            credential,
            options,
            state,
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.state).refresh.is_some()
    }

    fn must_refresh(&self, state: &CyclerState, now: DateTime<Utc>) -> bool {
        match &state.token {
            None => true,
            Some(token) => token.expires_on - now < window(self.options.forced_refresh_window),
        }
    }

    fn should_refresh(&self, state: &CyclerState, now: DateTime<Utc>) -> bool {
        if state.refresh.is_some() {
            return false;
        }
        let Some(token) = &state.token else {
            return true;
        };
        if token.refresh_after.is_some_and(|at| at < now) {
            return true;
        }
        token.expires_on - now < window(self.options.refresh_window)
    }

    /// Start a refresh, or join the one already running.
    fn refresh(
        &self,
        state: &mut CyclerState,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> RefreshFuture {
        if let Some(existing) = &state.refresh {
            return existing.clone();
        }

        let deadline = state
            .token
            .as_ref()
            .map_or_else(Utc::now, |token| token.expires_on);
        let credential = Arc::clone(&self.credential);
        let cache = Arc::clone(&self.state);
        let retry_interval = self.options.retry_interval;
        let scopes = scopes.to_vec();
        let options = options.clone();

        tracing::debug!(scopes = ?scopes, "refreshing access token");
        let future = async move {
            let result =
                begin_refresh(credential.as_ref(), &scopes, &options, retry_interval, deadline)
                    .await;
            let mut state = lock(&cache);
            state.refresh = None;
            match &result {
                Ok(token) => {
                    state.token = Some(token.clone());
                    state.scopes = scopes;
                    state.tenant_id = options.tenant_id.clone();
                }
                Err(error) => {
                    tracing::warn!(%error, "access token refresh failed");
                    state.token = None;
                    state.scopes.clear();
                    state.tenant_id = None;
                }
            }
            result
        }
        .boxed()
        .shared();

        state.refresh = Some(future.clone());
        future
    }

    /// Get a token for `scopes`, refreshing as needed.
    ///
    /// Claims, a change of tenant or a change of scopes always force a fresh
    /// token.
    pub async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
        abort_signal: Option<&CancellationToken>,
    ) -> RestResult<AccessToken> {
        let pending = {
            let mut state = lock(&self.state);
            let now = Utc::now();
            let has_claims = options.claims.is_some();
            let tenant_changed = state.tenant_id != options.tenant_id;
            let scopes_changed = state.token.is_some() && state.scopes != scopes;
            if has_claims {
                state.token = None;
            }

            if tenant_changed || scopes_changed || has_claims || self.must_refresh(&state, now) {
                self.refresh(&mut state, scopes, options)
            } else {
                if self.should_refresh(&state, now) {
                    let background = self.refresh(&mut state, scopes, options);
                    tokio::spawn(async move {
                        let _ = background.await;
                    });
                }
                match &state.token {
                    Some(token) => return Ok(token.clone()),
                    None => self.refresh(&mut state, scopes, options),
                }
            }
        };

        match abort_signal {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(RestError::cancelled("The operation was aborted.")),
                    result = pending => result,
                }
            }
            None => pending.await,
        }
    }
}

impl std::fmt::Debug for TokenCycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCycler")
            .field("options", &self.options)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

/// Keep asking the credential until it produces a token.
///
/// Failures before `deadline` (the old token's expiry) are swallowed and
/// retried every `retry_interval`; the first attempt at or after the deadline
/// is final.
async fn begin_refresh(
    credential: &dyn TokenCredential,
    scopes: &[String],
    options: &GetTokenOptions,
    retry_interval: Duration,
    deadline: DateTime<Utc>,
) -> RestResult<AccessToken> {
    loop {
        if Utc::now() < deadline {
            match credential.get_token(scopes, options).await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => tracing::debug!("credential returned no token, will retry"),
                Err(error) => tracing::debug!(%error, "token request failed, will retry"),
            }
        } else {
            return credential
                .get_token(scopes, options)
                .await?
                .ok_or_else(|| RestError::authentication("Failed to refresh access token."));
        }
        tokio::time::sleep(retry_interval).await;
    }
}

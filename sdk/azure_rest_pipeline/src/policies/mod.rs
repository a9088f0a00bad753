//! Built-in pipeline policies.

pub mod auxiliary;
pub mod bearer;
pub mod client_request_id;
pub mod key_credential;
pub mod logging;
pub mod redirect;
pub mod retry;
pub mod tracing_policy;
pub mod user_agent;

pub use auxiliary::AuxiliaryAuthenticationHeaderPolicy;
pub use bearer::{
    AuthChallenge, AuthorizeRequestContext, BearerTokenAuthenticationPolicy, ChallengeHandler,
    DefaultChallengeHandler,
};
pub use client_request_id::SetClientRequestIdPolicy;
pub use key_credential::{KeyCredentialAuthenticationPolicy, DEFAULT_API_KEY_HEADER};
pub use logging::LogPolicy;
pub use redirect::RedirectPolicy;
pub use retry::{RetryOptions, RetryPolicy};
pub use tracing_policy::TracingPolicy;
pub use user_agent::UserAgentPolicy;

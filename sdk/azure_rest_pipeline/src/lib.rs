#![doc = include_str!("../README.md")]

pub mod auth;
pub mod delay;
pub mod error;
pub mod headers;
pub mod pipeline;
pub mod policies;
pub mod request;
pub mod response;
pub mod retry_strategies;
pub mod sanitizer;
pub mod token_cycler;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ErrorKind, RestError, RestResult};
pub use headers::HeaderCollection;
pub use pipeline::{AddPolicyOptions, Next, Phase, Pipeline, Policy, RemovePolicyOptions};
pub use request::Request;
pub use response::Response;
pub use transport::{HttpClient, ReqwestHttpClient};

#![doc = include_str!("../README.md")]

pub mod api_version;
pub mod auth;
pub mod client;
pub mod error;
pub mod request_parameters;
pub mod response;
pub mod url_builder;

pub use auth::ClientCredential;
pub use client::{Client, ClientBuilder, Operation, PathClient, PolicyPosition};
pub use error::{create_rest_error, ErrorModel, ErrorResponse};
pub use request_parameters::{RequestBody, RequestParameters};
pub use response::{HttpResponse, StreamingResponse};

pub use azure_rest_pipeline::{ErrorKind, RestError, RestResult};

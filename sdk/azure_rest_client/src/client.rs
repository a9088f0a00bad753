//! REST client for Azure services.
//!
//! [`Client`] turns a route template plus [`RequestParameters`] into a
//! request, runs it through the default pipeline (user agent, request id,
//! retries, tracing, redirects, authentication, logging) and hands back an
//! [`HttpResponse`] or a [`StreamingResponse`].
//!
//! # Examples
//!
//! ## Using an API key
//! ```rust,no_run
//! use azure_rest_client::{Client, ClientCredential, RequestParameters};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder()
//!     .endpoint("https://my-vision.cognitiveservices.azure.com/computervision")
//!     .credential(ClientCredential::api_key("your-key"))
//!     .api_version("2023-10-01")
//!     .build()?;
//!
//! let response = client
//!     .path("/imageanalysis:analyze", &[] as &[&str])
//!     .post(
//!         RequestParameters::new()
//!             .query("features", vec!["caption"])
//!             .json_body(json!({"url": "https://example.com/cat.jpg"})),
//!     )
//!     .await?
//!     .error_for_status()?;
//! println!("{}", response.body());
//! # Ok(())
//! # }
//! ```
//!
//! ## From the environment
//! ```rust,no_run
//! use azure_rest_client::Client;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads VISION_ENDPOINT and VISION_KEY.
//! let client = Client::builder().build()?;
//! # Ok(())
//! # }
//! ```

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use azure_rest_pipeline::error::{RestError, RestResult};
use azure_rest_pipeline::pipeline::{AddPolicyOptions, Phase, Pipeline, Policy};
use azure_rest_pipeline::policies::{
    BearerTokenAuthenticationPolicy, KeyCredentialAuthenticationPolicy, LogPolicy,
    RedirectPolicy, RetryOptions, RetryPolicy, SetClientRequestIdPolicy, TracingPolicy,
    UserAgentPolicy,
};
use azure_rest_pipeline::policies::client_request_id::DEFAULT_CLIENT_REQUEST_ID_HEADER;
use azure_rest_pipeline::policies::key_credential::DEFAULT_API_KEY_HEADER;
use azure_rest_pipeline::policies::redirect::DEFAULT_MAX_REDIRECTS;
use azure_rest_pipeline::request::Request;
use azure_rest_pipeline::response::Response;
use azure_rest_pipeline::sanitizer::Sanitizer;
use azure_rest_pipeline::transport::{
    HttpClient, ReqwestHttpClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_STREAMING_TIMEOUT,
};
use reqwest::Method;
use url::Url;

use crate::api_version::ApiVersionPolicy;
use crate::auth::{ClientCredential, DEFAULT_SCOPE};
use crate::request_parameters::RequestParameters;
use crate::response::{HttpResponse, StreamingResponse};
use crate::url_builder::build_request_url;

/// Environment variable holding the service endpoint.
pub const ENDPOINT_ENV_VAR: &str = "VISION_ENDPOINT";

/// Where an additional policy runs relative to retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPosition {
    /// Once per call, before the retry policy.
    PerCall,
    /// Once per attempt, after authentication.
    PerRetry,
}

/// Client for an Azure REST endpoint.
///
/// Cheap to clone; clones share the pipeline, transport and token cache.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: String,
    pipeline: Pipeline,
    http_client: Arc<dyn HttpClient>,
    allow_insecure_connection: bool,
    api_version: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint)
            .field("api_version", &self.inner.api_version)
            .field("pipeline", &self.inner.pipeline)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new builder for configuring a `Client`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The endpoint as configured, `{name}` placeholders included.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn api_version(&self) -> Option<&str> {
        self.inner.api_version.as_deref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Bind a route template and its positional path arguments.
    ///
    /// `{name}` placeholders in `route` are filled left to right from `args`.
    pub fn path<S: AsRef<str>>(&self, route: &str, args: &[S]) -> PathClient {
        PathClient {
            client: self.clone(),
            route: route.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    fn build_request(
        &self,
        method: Method,
        route: &str,
        args: &[String],
        params: &RequestParameters,
    ) -> RestResult<Request> {
        let url = build_request_url(&self.inner.endpoint, route, args, &params.url_options())?;
        let allow_insecure = params
            .allow_insecure_connection
            .unwrap_or(self.inner.allow_insecure_connection);

        let mut request = Request::new(method, url).allow_insecure_connection(allow_insecure);
        request.headers = params.headers.clone();
        request.headers.set("Accept", params.resolved_accept());
        if let Some(content_type) = params.resolved_content_type() {
            request.headers.set("Content-Type", content_type);
        }
        if let Some(body) = params.body.clone() {
            request.body = Some(body.into_bytes()?);
        }
        request.timeout = params.timeout;
        request.abort_signal = params.abort_signal.clone();
        Ok(request)
    }

    async fn execute(&self, mut request: Request) -> RestResult<Response> {
        self.inner
            .pipeline
            .send_request(self.inner.http_client.as_ref(), &mut request)
            .await
    }
}

/// A route bound to a client, exposing one method per HTTP verb.
#[derive(Debug, Clone)]
pub struct PathClient {
    client: Client,
    route: String,
    args: Vec<String>,
}

macro_rules! verbs {
    ($($(#[$doc:meta])* $name:ident => $method:expr;)*) => {
        impl PathClient {
            $(
                $(#[$doc])*
                pub fn $name(&self, params: RequestParameters) -> Operation {
                    self.operation($method, params)
                }
            )*
        }
    };
}

verbs! {
    get => Method::GET;
    post => Method::POST;
    put => Method::PUT;
    patch => Method::PATCH;
    delete => Method::DELETE;
    head => Method::HEAD;
    options => Method::OPTIONS;
    trace => Method::TRACE;
}

impl PathClient {
    pub fn route(&self) -> &str {
        &self.route
    }

    /// An operation with an arbitrary method.
    pub fn operation(&self, method: Method, params: RequestParameters) -> Operation {
        Operation {
            client: self.client.clone(),
            method,
            route: self.route.clone(),
            args: self.args.clone(),
            params,
        }
    }
}

/// A pending call. Await it for a buffered [`HttpResponse`], or call
/// [`Operation::into_stream`] for the raw body.
#[derive(Debug)]
#[must_use = "operations do nothing unless awaited"]
pub struct Operation {
    client: Client,
    method: Method,
    route: String,
    args: Vec<String>,
    params: RequestParameters,
}

impl Operation {
    /// Send the request and decode the body.
    ///
    /// Non-success statuses are returned, not raised.
    ///
    /// # Tracing
    ///
    /// Emits a span named `azure_rest::request` with fields `method` and `route`.
    #[tracing::instrument(
        name = "azure_rest::request",
        skip(self),
        fields(method = %self.method, route = %self.route)
    )]
    pub async fn send(self) -> RestResult<HttpResponse> {
        let request = self
            .client
            .build_request(self.method, &self.route, &self.args, &self.params)?;
        tracing::debug!(url = %request.url, request_id = %request.request_id, "sending request");

        let response = self.client.execute(request).await?;
        let response = HttpResponse::from_response(response).await?;
        tracing::debug!(status = response.status(), "received response");
        Ok(response)
    }

    /// Send the request and return the body as a stream of chunks.
    ///
    /// Uses the transport's streaming timeout instead of the read timeout.
    #[tracing::instrument(
        name = "azure_rest::request_stream",
        skip(self),
        fields(method = %self.method, route = %self.route)
    )]
    pub async fn into_stream(self) -> RestResult<StreamingResponse> {
        let mut request = self
            .client
            .build_request(self.method, &self.route, &self.args, &self.params)?;
        request.stream_response = true;

        let response = self.client.execute(request).await?;
        tracing::debug!(status = response.status, "stream opened");
        Ok(StreamingResponse::from_response(response))
    }
}

impl IntoFuture for Operation {
    type Output = RestResult<HttpResponse>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

/// Builder for constructing a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default)]
pub struct ClientBuilder {
    endpoint: Option<String>,
    credential: Option<ClientCredential>,
    api_version: Option<String>,
    api_key_header_name: Option<String>,
    scopes: Option<Vec<String>>,
    http_client: Option<Arc<dyn HttpClient>>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    streaming_timeout: Option<Duration>,
    retry_options: Option<RetryOptions>,
    max_redirects: Option<u32>,
    user_agent_prefix: Option<String>,
    client_request_id_header: Option<String>,
    allowed_headers: Vec<String>,
    allowed_query_parameters: Vec<String>,
    additional_policies: Vec<(Arc<dyn Policy>, PolicyPosition)>,
    allow_insecure_connection: bool,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .field("api_version", &self.api_version)
            .field("additional_policies", &self.additional_policies.len())
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Set the service endpoint.
    ///
    /// May contain `{name}` placeholders filled per call from
    /// [`RequestParameters::path_parameter`]. If not set, the builder reads
    /// the `VISION_ENDPOINT` environment variable.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential.
    ///
    /// If not set, [`ClientCredential::from_env`] is tried and the client is
    /// anonymous when that fails.
    pub fn credential(mut self, credential: ClientCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Append `api-version` to every request that lacks one.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Header carrying the API key. Defaults to `Ocp-Apim-Subscription-Key`.
    pub fn api_key_header_name(mut self, name: impl Into<String>) -> Self {
        self.api_key_header_name = Some(name.into());
        self
    }

    /// Token scopes. Defaults to [`DEFAULT_SCOPE`].
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Set a custom transport.
    ///
    /// **Note:** timeouts configured on this builder are ignored when a
    /// custom transport is provided.
    pub fn http_client(mut self, client: impl HttpClient + 'static) -> Self {
        self.http_client = Some(Arc::new(client));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Maximum time for a whole buffered request/response cycle.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Maximum time for streamed responses. Defaults to 5 minutes.
    pub fn streaming_timeout(mut self, timeout: Duration) -> Self {
        self.streaming_timeout = Some(timeout);
        self
    }

    pub fn retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = Some(options);
        self
    }

    /// Maximum redirects followed per call. `0` disables the redirect policy.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Header carrying the client request id. Defaults to `x-ms-client-request-id`.
    pub fn client_request_id_header(mut self, name: impl Into<String>) -> Self {
        self.client_request_id_header = Some(name.into());
        self
    }

    /// Header whose value may appear in logs unredacted.
    pub fn allow_logged_header(mut self, name: impl Into<String>) -> Self {
        self.allowed_headers.push(name.into());
        self
    }

    /// Query parameter whose value may appear in logs unredacted.
    pub fn allow_logged_query_parameter(mut self, name: impl Into<String>) -> Self {
        self.allowed_query_parameters.push(name.into());
        self
    }

    /// Add a policy to the default pipeline.
    pub fn additional_policy(mut self, policy: Arc<dyn Policy>, position: PolicyPosition) -> Self {
        self.additional_policies.push((policy, position));
        self
    }

    /// Permit plain `http://` endpoints. Authentication policies still
    /// refuse them.
    pub fn allow_insecure_connection(mut self, allow: bool) -> Self {
        self.allow_insecure_connection = allow;
        self
    }

    fn build_pipeline(&self, credential: Option<&ClientCredential>) -> RestResult<Pipeline> {
        let sanitizer = Sanitizer::new(&self.allowed_headers, &self.allowed_query_parameters);
        let mut pipeline = Pipeline::new();

        pipeline.add_policy(
            Arc::new(UserAgentPolicy::new(self.user_agent_prefix.as_deref())),
            AddPolicyOptions::default(),
        )?;
        pipeline.add_policy(
            Arc::new(SetClientRequestIdPolicy::new(
                self.client_request_id_header
                    .as_deref()
                    .unwrap_or(DEFAULT_CLIENT_REQUEST_ID_HEADER),
            )),
            AddPolicyOptions::default(),
        )?;
        if let Some(version) = &self.api_version {
            pipeline.add_policy(
                Arc::new(ApiVersionPolicy::new(version.as_str())),
                AddPolicyOptions::default(),
            )?;
        }

        pipeline.add_policy(
            Arc::new(RetryPolicy::default_policy(
                self.retry_options.unwrap_or_default(),
            )),
            AddPolicyOptions::in_phase(Phase::Retry),
        )?;
        pipeline.add_policy(
            Arc::new(TracingPolicy::new(sanitizer.clone())),
            AddPolicyOptions::after_phase(Phase::Retry),
        )?;
        let max_redirects = self.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS);
        if max_redirects > 0 {
            pipeline.add_policy(
                Arc::new(RedirectPolicy::new(max_redirects)),
                AddPolicyOptions::after_phase(Phase::Retry),
            )?;
        }

        match credential {
            Some(ClientCredential::Key(key)) => pipeline.add_policy(
                Arc::new(KeyCredentialAuthenticationPolicy::new(
                    Arc::clone(key),
                    self.api_key_header_name
                        .as_deref()
                        .unwrap_or(DEFAULT_API_KEY_HEADER),
                )),
                AddPolicyOptions::in_phase(Phase::Sign),
            )?,
            Some(ClientCredential::Token(token)) => pipeline.add_policy(
                Arc::new(BearerTokenAuthenticationPolicy::new(
                    Arc::clone(token),
                    self.scopes
                        .clone()
                        .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
                )),
                AddPolicyOptions::in_phase(Phase::Sign),
            )?,
            None => tracing::debug!("no credential configured, requests are sent anonymously"),
        }

        for (policy, position) in &self.additional_policies {
            let options = match position {
                PolicyPosition::PerCall => AddPolicyOptions::default(),
                PolicyPosition::PerRetry => AddPolicyOptions::after_phase(Phase::Sign),
            };
            pipeline.add_policy(Arc::clone(policy), options)?;
        }

        pipeline.add_policy(
            Arc::new(LogPolicy::new(sanitizer)),
            AddPolicyOptions::after_phase(Phase::Sign),
        )?;

        // Surface ordering problems from additional policies at build time.
        pipeline.ordered_policies()?;
        Ok(pipeline)
    }

    /// Build the `Client`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// - No endpoint is provided and `VISION_ENDPOINT` is not set
    /// - The endpoint URL is invalid
    /// - The HTTP transport cannot be created
    /// - An additional policy clashes with a default policy name or ordering
    pub fn build(self) -> RestResult<Client> {
        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| std::env::var(ENDPOINT_ENV_VAR).ok())
            .ok_or_else(|| {
                RestError::configuration(format!(
                    "endpoint is required. Set it via builder or {ENDPOINT_ENV_VAR} env var."
                ))
            })?;
        if !endpoint.contains('{') {
            Url::parse(&endpoint).map_err(|e| {
                RestError::configuration(format!("invalid endpoint URL '{endpoint}'")).with_source(e)
            })?;
        }

        let credential = self
            .credential
            .clone()
            .or_else(|| ClientCredential::from_env().ok());
        let pipeline = self.build_pipeline(credential.as_ref())?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::with_timeouts(
                self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
                self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT),
                self.streaming_timeout.unwrap_or(DEFAULT_STREAMING_TIMEOUT),
            )?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                endpoint,
                pipeline,
                http_client,
                allow_insecure_connection: self.allow_insecure_connection,
                api_version: self.api_version,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_rest_pipeline::error::ErrorKind;
    use azure_rest_pipeline::policies::key_credential::KEY_CREDENTIAL_AUTHENTICATION_POLICY_NAME;
    use azure_rest_pipeline::policies::logging::LOG_POLICY_NAME;
    use azure_rest_pipeline::policies::redirect::REDIRECT_POLICY_NAME;
    use azure_rest_pipeline::policies::retry::DEFAULT_RETRY_POLICY_NAME;
    use azure_rest_pipeline::policies::tracing_policy::TRACING_POLICY_NAME;
    use azure_rest_pipeline::test_support::{Scripted, ScriptedHttpClient, StaticTokenCredential};
    use azure_rest_pipeline::Next;
    use serde_json::json;
    use serial_test::serial;

    const ENDPOINT: &str = "https://test.cognitiveservices.azure.com";

    fn names(client: &Client) -> Vec<String> {
        client
            .pipeline()
            .ordered_policies()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    #[test]
    #[serial]
    fn builder_requires_endpoint() {
        let original = std::env::var(ENDPOINT_ENV_VAR).ok();
        std::env::remove_var(ENDPOINT_ENV_VAR);

        let err = Client::builder()
            .credential(ClientCredential::api_key("test"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        if let Some(val) = original {
            std::env::set_var(ENDPOINT_ENV_VAR, val);
        }
    }

    #[test]
    #[serial]
    fn builder_uses_endpoint_from_env() {
        let original = std::env::var(ENDPOINT_ENV_VAR).ok();
        std::env::set_var(ENDPOINT_ENV_VAR, "https://env.cognitiveservices.azure.com");

        let client = Client::builder()
            .credential(ClientCredential::api_key("test"))
            .build()
            .expect("should build");
        assert_eq!(client.endpoint(), "https://env.cognitiveservices.azure.com");

        let explicit = Client::builder()
            .endpoint(ENDPOINT)
            .credential(ClientCredential::api_key("test"))
            .build()
            .expect("should build");
        assert_eq!(explicit.endpoint(), ENDPOINT);

        match original {
            Some(val) => std::env::set_var(ENDPOINT_ENV_VAR, val),
            None => std::env::remove_var(ENDPOINT_ENV_VAR),
        }
    }

    #[test]
    fn builder_invalid_endpoint_url() {
        let err = Client::builder()
            .endpoint("not a valid url")
            .credential(ClientCredential::api_key("test"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn templated_endpoint_is_accepted() {
        let client = Client::builder()
            .endpoint("https://{account}.cognitiveservices.azure.com")
            .credential(ClientCredential::api_key("test"))
            .build()
            .expect("should build");
        assert_eq!(client.endpoint(), "https://{account}.cognitiveservices.azure.com");
    }

    #[test]
    fn default_pipeline_order() {
        let client = Client::builder()
            .endpoint(ENDPOINT)
            .credential(ClientCredential::api_key("test"))
            .api_version("2023-10-01")
            .build()
            .unwrap();
        assert_eq!(
            names(&client),
            vec![
                "userAgentPolicy",
                "setClientRequestIdPolicy",
                "ApiVersionPolicy",
                DEFAULT_RETRY_POLICY_NAME,
                TRACING_POLICY_NAME,
                REDIRECT_POLICY_NAME,
                KEY_CREDENTIAL_AUTHENTICATION_POLICY_NAME,
                LOG_POLICY_NAME,
            ]
        );
    }

    #[test]
    fn zero_redirects_drops_redirect_policy() {
        let client = Client::builder()
            .endpoint(ENDPOINT)
            .credential(ClientCredential::api_key("test"))
            .max_redirects(0)
            .build()
            .unwrap();
        assert!(!names(&client).contains(&REDIRECT_POLICY_NAME.to_string()));
    }

    struct Marker(&'static str);

    #[async_trait::async_trait]
    impl Policy for Marker {
        fn name(&self) -> &str {
            self.0
        }

        async fn send_request(
            &self,
            request: &mut Request,
            next: Next<'_>,
        ) -> RestResult<Response> {
            request.headers.set(format!("x-{}", self.0), "1");
            next.run(request).await
        }
    }

    #[test]
    fn additional_policies_are_positioned() {
        let client = Client::builder()
            .endpoint(ENDPOINT)
            .credential(ClientCredential::api_key("test"))
            .additional_policy(Arc::new(Marker("per-call")), PolicyPosition::PerCall)
            .additional_policy(Arc::new(Marker("per-retry")), PolicyPosition::PerRetry)
            .build()
            .unwrap();
        let names = names(&client);
        let index = |name: &str| names.iter().position(|n| n == name).unwrap();

        assert!(index("per-call") < index(DEFAULT_RETRY_POLICY_NAME));
        assert!(index("per-retry") > index(KEY_CREDENTIAL_AUTHENTICATION_POLICY_NAME));
    }

    #[test]
    fn duplicate_additional_policy_is_rejected() {
        let err = Client::builder()
            .endpoint(ENDPOINT)
            .additional_policy(Arc::new(Marker("logPolicy")), PolicyPosition::PerCall)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn client_is_cloneable_and_debug_hides_key() {
        let client = Client::builder()
            .endpoint(ENDPOINT)
            .credential(ClientCredential::api_key("super-secret"))
            .build()
            .unwrap();
        let cloned = client.clone();
        assert_eq!(client.endpoint(), cloned.endpoint());
        assert!(!format!("{client:?}").contains("super-secret"));
    }

    // -----------------------------------------------------------------------
    // Request construction against a scripted transport
    // -----------------------------------------------------------------------

    fn scripted_client(
        script: Vec<Scripted>,
        credential: ClientCredential,
    ) -> (Client, Arc<ScriptedHttpClient>) {
        let transport = Arc::new(ScriptedHttpClient::new(script));
        let client = Client::builder()
            .endpoint(ENDPOINT)
            .credential(credential)
            .api_version("2023-10-01")
            .http_client(SharedTransport(Arc::clone(&transport)))
            .build()
            .unwrap();
        (client, transport)
    }

    struct SharedTransport(Arc<ScriptedHttpClient>);

    #[async_trait::async_trait]
    impl HttpClient for SharedTransport {
        async fn send_request(&self, request: &Request) -> RestResult<Response> {
            self.0.send_request(request).await
        }
    }

    #[tokio::test]
    async fn post_sets_defaults_and_encodes_path() {
        let (client, transport) = scripted_client(
            vec![Scripted::status(200).with_header("Content-Type", "application/json").with_body("{}")],
            ClientCredential::api_key("key"),
        );

        let response = client
            .path("/models/{name}:analyze", &["my model"])
            .post(RequestParameters::new().json_body(json!({"url": "https://x/y.jpg"})))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(
            sent.url.as_str(),
            "https://test.cognitiveservices.azure.com/models/my%20model:analyze?api-version=2023-10-01"
        );
        assert_eq!(sent.headers.get("accept"), Some("application/json"));
        assert_eq!(
            sent.headers.get("content-type"),
            Some("application/json; charset=UTF-8")
        );
        assert_eq!(sent.headers.get("Ocp-Apim-Subscription-Key"), Some("key"));
        assert!(sent.headers.has("x-ms-client-request-id"));
        assert_eq!(
            sent.body.as_deref(),
            Some(br#"{"url":"https://x/y.jpg"}"#.as_slice())
        );
    }

    #[tokio::test]
    async fn get_without_body_has_no_content_type() {
        let (client, transport) =
            scripted_client(vec![Scripted::status(204)], ClientCredential::api_key("key"));

        let response = client
            .path("/items", &[] as &[&str])
            .get(RequestParameters::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
        assert_eq!(response.body(), &serde_json::Value::Null);
        assert!(!transport.requests()[0].headers.has("content-type"));
    }

    #[tokio::test]
    async fn every_verb_maps_to_its_method() {
        let (client, transport) =
            scripted_client(vec![Scripted::status(200)], ClientCredential::api_key("key"));
        let path = client.path("/x", &[] as &[&str]);

        for op in [
            path.get(RequestParameters::new()),
            path.post(RequestParameters::new()),
            path.put(RequestParameters::new()),
            path.patch(RequestParameters::new()),
            path.delete(RequestParameters::new()),
            path.head(RequestParameters::new()),
            path.options(RequestParameters::new()),
            path.trace(RequestParameters::new()),
        ] {
            op.send().await.unwrap();
        }

        let methods: Vec<Method> = transport.requests().into_iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS,
                Method::TRACE,
            ]
        );
    }

    #[tokio::test]
    async fn non_success_is_returned_not_raised() {
        let (client, _) = scripted_client(
            vec![Scripted::status(404)
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"error":{"code":"NotFound","message":"gone"}}"#)],
            ClientCredential::api_key("key"),
        );

        let response = client
            .path("/missing", &[] as &[&str])
            .get(RequestParameters::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let err = response.error_for_status().unwrap_err();
        assert_eq!(err.code(), Some("NotFound"));
        assert_eq!(err.message(), "gone");
    }

    #[tokio::test]
    async fn token_credential_sends_bearer_header() {
        let credential = Arc::new(StaticTokenCredential::new("tok"));
        let (client, transport) = scripted_client(
            vec![Scripted::status(200)],
            ClientCredential::Token(credential.clone()),
        );

        client
            .path("/x", &[] as &[&str])
            .get(RequestParameters::new())
            .await
            .unwrap();
        client
            .path("/x", &[] as &[&str])
            .get(RequestParameters::new())
            .await
            .unwrap();

        assert_eq!(
            transport.requests()[0].headers.get("authorization"),
            Some("Bearer tok")
        );
        assert_eq!(credential.calls(), 1);
    }

    #[tokio::test]
    async fn clients_sharing_a_credential_acquire_one_token() {
        let credential = Arc::new(StaticTokenCredential::new("shared"));
        let (first, first_transport) = scripted_client(
            vec![Scripted::status(200)],
            ClientCredential::Token(credential.clone()),
        );
        let (second, second_transport) = scripted_client(
            vec![Scripted::status(200)],
            ClientCredential::Token(credential.clone()),
        );

        let (a, b) = tokio::join!(
            first.path("/a", &[] as &[&str]).get(RequestParameters::new()).send(),
            second.path("/b", &[] as &[&str]).get(RequestParameters::new()).send(),
        );
        assert_eq!(a.unwrap().status(), 200);
        assert_eq!(b.unwrap().status(), 200);

        assert_eq!(credential.calls(), 1);
        for transport in [first_transport, second_transport] {
            assert_eq!(
                transport.requests()[0].headers.get("authorization"),
                Some("Bearer shared")
            );
        }
    }

    #[tokio::test]
    async fn base_path_parameters_fill_endpoint() {
        let transport = Arc::new(ScriptedHttpClient::new([Scripted::status(200)]));
        let client = Client::builder()
            .endpoint("https://{account}.cognitiveservices.azure.com")
            .http_client(SharedTransport(Arc::clone(&transport)))
            .build()
            .unwrap();

        client
            .path("/items/{id}", &["7"])
            .get(RequestParameters::new().path_parameter("account", "contoso"))
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].url.as_str(),
            "https://contoso.cognitiveservices.azure.com/items/7"
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn send_emits_request_span() {
        let (client, _) =
            scripted_client(vec![Scripted::status(200)], ClientCredential::api_key("key"));
        client
            .path("/items", &[] as &[&str])
            .get(RequestParameters::new())
            .await
            .unwrap();
        assert!(logs_contain("azure_rest::request"));
        assert!(logs_contain("route=/items"));
    }
}

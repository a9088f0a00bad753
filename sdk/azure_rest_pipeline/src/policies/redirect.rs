use async_trait::async_trait;
use reqwest::Method;

use crate::error::{RestError, RestResult};
use crate::pipeline::{Next, Policy};
use crate::request::Request;
use crate::response::Response;

pub const REDIRECT_POLICY_NAME: &str = "redirectPolicy";

/// Default maximum number of redirects followed per request.
pub const DEFAULT_MAX_REDIRECTS: u32 = 20;

/// Follows `Location` headers on redirect responses.
///
/// - 300 and 307 are always followed.
/// - 301 and 302 are followed for GET and HEAD.
/// - 303 is followed for POST, which turns into a body-less GET.
///
/// Each hop sends a copy of the request with `Authorization` removed. The
/// caller's request is left untouched.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    max_retries: u32,
}

impl RedirectPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

fn should_follow(status: u16, method: &Method) -> bool {
    match status {
        300 | 307 => true,
        301 | 302 => *method == Method::GET || *method == Method::HEAD,
        303 => *method == Method::POST,
        _ => false,
    }
}

#[async_trait]
impl Policy for RedirectPolicy {
    fn name(&self) -> &str {
        REDIRECT_POLICY_NAME
    }

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response> {
        let mut response = next.run(request).await?;
        let mut hop: Option<Request> = None;
        for _ in 0..self.max_retries {
            let current = hop.as_ref().unwrap_or(request);
            if !should_follow(response.status, &current.method) {
                break;
            }
            let Some(location) = response.headers.get("location") else {
                break;
            };
            let target = current.url.join(location).map_err(|e| {
                RestError::configuration(format!("Invalid redirect location '{location}'"))
                    .with_source(e)
                    .with_request(current.info())
            })?;
            tracing::debug!(
                request_id = %current.request_id,
                status = response.status,
                location = %target,
                "following redirect"
            );

            let mut redirected = current.clone();
            redirected.url = target;
            if response.status == 303 {
                redirected.method = Method::GET;
                redirected.headers.delete("Content-Length");
                redirected.body = None;
            }
            redirected.headers.delete("Authorization");

            response = next.run(&mut redirected).await?;
            hop = Some(redirected);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderCollection;
    use crate::pipeline::{AddPolicyOptions, Pipeline};
    use crate::transport::HttpClient;
    use std::sync::Mutex;
    use url::Url;

    /// Redirects every path except `/final`.
    struct Redirecting {
        status: u16,
        seen: Mutex<Vec<(Method, String, Option<String>, bool)>>,
    }

    impl Redirecting {
        fn new(status: u16) -> Self {
            Self {
                status,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for Redirecting {
        async fn send_request(&self, request: &Request) -> RestResult<Response> {
            self.seen.lock().unwrap().push((
                request.method.clone(),
                request.url.path().to_string(),
                request.headers.get("authorization").map(str::to_string),
                request.body.is_some(),
            ));
            if request.url.path() == "/final" {
                return Ok(Response::new(request.info(), 200, HeaderCollection::new(), ""));
            }
            let next = if request.url.path() == "/loop" {
                "/loop"
            } else {
                "/final"
            };
            let headers: HeaderCollection = [("Location", next)].into_iter().collect();
            Ok(Response::new(request.info(), self.status, headers, ""))
        }
    }

    async fn run(status: u16, method: Method, path: &str) -> (u16, Redirecting) {
        let client = Redirecting::new(status);
        let mut pipeline = Pipeline::new();
        pipeline
            .add_policy(
                std::sync::Arc::new(RedirectPolicy::default()),
                AddPolicyOptions::default(),
            )
            .unwrap();
        let url = Url::parse("https://example.com").unwrap().join(path).unwrap();
        let mut request = Request::new(method, url)
            .with_header("Authorization", "Bearer secret")
            .with_body("payload");
        let status = pipeline
            .send_request(&client, &mut request)
            .await
            .unwrap()
            .status;
        assert_eq!(request.url.path(), path);
        assert_eq!(request.headers.get("authorization"), Some("Bearer secret"));
        (status, client)
    }

    #[tokio::test]
    async fn follows_307_and_strips_authorization() {
        let (status, client) = run(307, Method::POST, "/start").await;
        assert_eq!(status, 200);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].2.as_deref(), Some("Bearer secret"));
        assert_eq!(seen[1].0, Method::POST);
        assert_eq!(seen[1].1, "/final");
        assert_eq!(seen[1].2, None);
        assert!(seen[1].3, "307 keeps the body");
    }

    #[tokio::test]
    async fn see_other_turns_post_into_get_without_body() {
        let (status, client) = run(303, Method::POST, "/start").await;
        assert_eq!(status, 200);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[1].0, Method::GET);
        assert!(!seen[1].3);
    }

    #[tokio::test]
    async fn moved_is_only_followed_for_get_and_head() {
        let (status, _) = run(301, Method::GET, "/start").await;
        assert_eq!(status, 200);

        let (status, client) = run(302, Method::POST, "/start").await;
        assert_eq!(status, 302);
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stops_after_max_redirects() {
        let (status, client) = run(307, Method::GET, "/loop").await;
        assert_eq!(status, 307);
        assert_eq!(
            client.seen.lock().unwrap().len(),
            DEFAULT_MAX_REDIRECTS as usize + 1
        );
    }

    #[test]
    fn follow_matrix() {
        assert!(should_follow(300, &Method::PUT));
        assert!(should_follow(307, &Method::DELETE));
        assert!(should_follow(302, &Method::HEAD));
        assert!(!should_follow(303, &Method::GET));
        assert!(!should_follow(308, &Method::GET));
        assert!(!should_follow(200, &Method::GET));
    }
}

//! Decision functions consulted by the retry policy.
//!
//! A strategy looks at the outcome of one attempt and either skips (leaving
//! the decision to the next strategy), asks for a retry after a delay, asks
//! for the request to be re-sent elsewhere, or fails the call outright.

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::delay::random_inclusive;
use crate::error::RestError;
use crate::response::Response;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default cap for exponential backoff.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(64_000);

/// Headers that carry a server-provided retry delay, in lookup order.
const RETRY_AFTER_MS_HEADER: &str = "retry-after-ms";
const X_MS_RETRY_AFTER_MS_HEADER: &str = "x-ms-retry-after-ms";
const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Outcome of one attempt, as seen by a strategy.
#[derive(Debug, Clone, Copy)]
pub struct RetryInformation<'a> {
    pub response: Option<&'a Response>,
    pub error: Option<&'a RestError>,
    /// Zero-based index of the attempt that produced this outcome.
    pub retry_count: u32,
}

impl RetryInformation<'_> {
    /// Status code from the response, or from the response attached to the
    /// error.
    pub fn status(&self) -> Option<u16> {
        self.response
            .map(|r| r.status)
            .or_else(|| self.error.and_then(RestError::status_code))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        match self.response {
            Some(response) => response.headers.get(name),
            None => self
                .error
                .and_then(RestError::response)
                .and_then(|snapshot| snapshot.headers.get(name)),
        }
    }

    fn has_response(&self) -> bool {
        self.response.is_some() || self.error.and_then(RestError::response).is_some()
    }
}

/// What a strategy wants the retry policy to do.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// No opinion; ask the next strategy.
    Skip,
    /// Retry after waiting this long.
    RetryAfter(Duration),
    /// Retry against a different URL.
    Redirect(Url),
    /// Stop and surface this error.
    Fail(RestError),
}

impl RetryDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn retry(&self, info: &RetryInformation<'_>) -> RetryDecision;
}

// ---------------------------------------------------------------------------
// Throttling
// ---------------------------------------------------------------------------

/// Server-requested delay from a 429 or 503 response, if one is present.
///
/// `retry-after-ms` and `x-ms-retry-after-ms` are milliseconds; `Retry-After`
/// is seconds or an HTTP date.
pub fn retry_after(info: &RetryInformation<'_>) -> Option<Duration> {
    retry_after_at(info, Utc::now())
}

fn retry_after_at(info: &RetryInformation<'_>, now: DateTime<Utc>) -> Option<Duration> {
    if !matches!(info.status(), Some(429 | 503)) {
        return None;
    }
    for (header, factor_ms) in [
        (RETRY_AFTER_MS_HEADER, 1.0),
        (X_MS_RETRY_AFTER_MS_HEADER, 1.0),
        (RETRY_AFTER_HEADER, 1000.0),
    ] {
        if let Some(value) = info
            .header(header)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            return Some(Duration::from_millis((value * factor_ms) as u64));
        }
    }
    let date = info.header(RETRY_AFTER_HEADER)?;
    let at = DateTime::parse_from_rfc2822(date.trim()).ok()?;
    let diff = at.with_timezone(&Utc) - now;
    Some(diff.to_std().unwrap_or(Duration::ZERO))
}

/// Honors `Retry-After` style headers on throttled responses.
#[derive(Debug, Clone, Default)]
pub struct ThrottlingRetryStrategy;

impl RetryStrategy for ThrottlingRetryStrategy {
    fn name(&self) -> &str {
        "throttlingRetryStrategy"
    }

    fn retry(&self, info: &RetryInformation<'_>) -> RetryDecision {
        match retry_after(info) {
            Some(delay) => RetryDecision::RetryAfter(delay),
            None => RetryDecision::Skip,
        }
    }
}

// ---------------------------------------------------------------------------
// Exponential
// ---------------------------------------------------------------------------

/// Statuses retried with exponential backoff: 408, 429, and 5xx other than
/// 501 and 505.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (status >= 500 && status != 501 && status != 505)
}

/// Upper bound for the delay before retry number `retry_count`.
///
/// Doubles per attempt and saturates at `max_retry_delay`.
pub fn exponential_delay_ceiling(
    retry_count: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
) -> Duration {
    let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
    retry_delay
        .checked_mul(factor)
        .map_or(max_retry_delay, |d| d.min(max_retry_delay))
}

/// Jittered delay in `[ceiling / 2, ceiling]`.
pub fn calculate_retry_delay(
    retry_count: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
) -> Duration {
    let ceiling = exponential_delay_ceiling(retry_count, retry_delay, max_retry_delay);
    let half = u64::try_from(ceiling.as_millis() / 2).unwrap_or(u64::MAX);
    Duration::from_millis(half.saturating_add(random_inclusive(0, half)))
}

/// Backs off exponentially on transport errors and retryable statuses.
#[derive(Debug, Clone)]
pub struct ExponentialRetryStrategy {
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Leave transport errors to other strategies.
    pub ignore_system_errors: bool,
    /// Leave HTTP statuses to other strategies.
    pub ignore_http_status_codes: bool,
}

impl Default for ExponentialRetryStrategy {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            ignore_system_errors: false,
            ignore_http_status_codes: false,
        }
    }
}

impl RetryStrategy for ExponentialRetryStrategy {
    fn name(&self) -> &str {
        "exponentialRetryStrategy"
    }

    fn retry(&self, info: &RetryInformation<'_>) -> RetryDecision {
        let system_error = info.error.is_some_and(RestError::is_transport);
        let retryable = info.has_response() && info.status().is_some_and(is_retryable_status);
        let throttled = retry_after(info).is_some();
        let unknown_response = info.has_response() && (throttled || !retryable);

        if unknown_response
            || (retryable && self.ignore_http_status_codes)
            || (system_error && self.ignore_system_errors)
        {
            return RetryDecision::Skip;
        }
        if let Some(error) = info.error {
            if !system_error && !retryable {
                return RetryDecision::Fail(error.clone());
            }
        }
        RetryDecision::RetryAfter(calculate_retry_delay(
            info.retry_count,
            self.retry_delay,
            self.max_retry_delay,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderCollection;
    use crate::request::RequestInfo;

    fn info() -> RequestInfo {
        RequestInfo {
            method: reqwest::Method::GET,
            url: Url::parse("https://example.com/").unwrap(),
            request_id: "r".into(),
        }
    }

    fn response(status: u16, headers: &[(&str, &str)]) -> Response {
        let headers: HeaderCollection = headers.iter().copied().collect();
        Response::new(info(), status, headers, "")
    }

    fn with_response(response: &Response, retry_count: u32) -> RetryInformation<'_> {
        RetryInformation {
            response: Some(response),
            error: None,
            retry_count,
        }
    }

    // -----------------------------------------------------------------------
    // Delay arithmetic
    // -----------------------------------------------------------------------

    #[test]
    fn ceiling_doubles_and_saturates() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(64_000);
        let ceilings: Vec<_> = (0..10)
            .map(|n| exponential_delay_ceiling(n, base, max).as_millis())
            .collect();
        assert_eq!(
            ceilings,
            vec![1000, 2000, 4000, 8000, 16_000, 32_000, 64_000, 64_000, 64_000, 64_000]
        );
    }

    #[test]
    fn ceiling_is_monotonic_for_huge_counts() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(64_000);
        let mut previous = Duration::ZERO;
        for n in [0, 1, 5, 31, 32, 64, u32::MAX] {
            let ceiling = exponential_delay_ceiling(n, base, max);
            assert!(ceiling >= previous);
            assert!(ceiling <= max);
            previous = ceiling;
        }
    }

    #[test]
    fn jittered_delay_stays_within_half_and_full_ceiling() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(64_000);
        for n in 0..12 {
            let ceiling = exponential_delay_ceiling(n, base, max);
            let delay = calculate_retry_delay(n, base, max);
            assert!(delay >= ceiling / 2, "retry {n}: {delay:?} < half of {ceiling:?}");
            assert!(delay <= ceiling, "retry {n}: {delay:?} > {ceiling:?}");
            assert!(delay <= max);
        }
    }

    // -----------------------------------------------------------------------
    // Throttling
    // -----------------------------------------------------------------------

    #[test]
    fn throttling_uses_retry_after_seconds_regardless_of_count() {
        let r = response(429, &[("Retry-After", "5")]);
        for count in [0, 1, 7] {
            match ThrottlingRetryStrategy.retry(&with_response(&r, count)) {
                RetryDecision::RetryAfter(d) => assert_eq!(d, Duration::from_secs(5)),
                other => panic!("expected RetryAfter, got {other:?}"),
            }
        }
    }

    #[test]
    fn throttling_prefers_millisecond_headers() {
        let r = response(
            503,
            &[("Retry-After", "10"), ("x-ms-retry-after-ms", "250")],
        );
        assert!(matches!(
            ThrottlingRetryStrategy.retry(&with_response(&r, 0)),
            RetryDecision::RetryAfter(d) if d == Duration::from_millis(250)
        ));

        let r = response(429, &[("retry-after-ms", "100"), ("x-ms-retry-after-ms", "250")]);
        assert!(matches!(
            ThrottlingRetryStrategy.retry(&with_response(&r, 0)),
            RetryDecision::RetryAfter(d) if d == Duration::from_millis(100)
        ));
    }

    #[test]
    fn throttling_parses_http_dates() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let r = response(429, &[("Retry-After", "Wed, 21 Oct 2015 07:28:30 GMT")]);
        assert_eq!(
            retry_after_at(&with_response(&r, 0), now),
            Some(Duration::from_secs(30))
        );

        let past = response(429, &[("Retry-After", "Wed, 21 Oct 2015 07:27:00 GMT")]);
        assert_eq!(
            retry_after_at(&with_response(&past, 0), now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn throttling_skips_without_header_or_on_other_statuses() {
        let r = response(429, &[]);
        assert!(ThrottlingRetryStrategy.retry(&with_response(&r, 0)).is_skip());

        let r = response(500, &[("Retry-After", "5")]);
        assert!(ThrottlingRetryStrategy.retry(&with_response(&r, 0)).is_skip());

        let r = response(429, &[("Retry-After", "soon")]);
        assert!(ThrottlingRetryStrategy.retry(&with_response(&r, 0)).is_skip());
    }

    // -----------------------------------------------------------------------
    // Exponential
    // -----------------------------------------------------------------------

    #[test]
    fn retryable_status_classification() {
        for status in [408, 429, 500, 502, 503, 504, 599] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [200, 301, 400, 401, 404, 409, 501, 505] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn exponential_retries_server_errors() {
        let strategy = ExponentialRetryStrategy::default();
        let r = response(500, &[]);
        assert!(matches!(
            strategy.retry(&with_response(&r, 0)),
            RetryDecision::RetryAfter(_)
        ));
    }

    #[test]
    fn exponential_retries_429_without_hint() {
        let strategy = ExponentialRetryStrategy::default();
        let r = response(429, &[]);
        assert!(matches!(
            strategy.retry(&with_response(&r, 2)),
            RetryDecision::RetryAfter(_)
        ));
    }

    #[test]
    fn exponential_leaves_throttled_responses_alone() {
        let strategy = ExponentialRetryStrategy::default();
        let r = response(503, &[("Retry-After", "1")]);
        assert!(strategy.retry(&with_response(&r, 0)).is_skip());
    }

    #[test]
    fn exponential_skips_client_errors_and_success() {
        let strategy = ExponentialRetryStrategy::default();
        for status in [200, 400, 404, 501] {
            let r = response(status, &[]);
            assert!(strategy.retry(&with_response(&r, 0)).is_skip());
        }
    }

    #[test]
    fn exponential_retries_transport_errors() {
        let strategy = ExponentialRetryStrategy::default();
        let error = RestError::timeout("slow");
        let info = RetryInformation {
            response: None,
            error: Some(&error),
            retry_count: 0,
        };
        assert!(matches!(strategy.retry(&info), RetryDecision::RetryAfter(_)));
    }

    #[test]
    fn exponential_fails_on_non_transport_errors() {
        let strategy = ExponentialRetryStrategy::default();
        let error = RestError::parse(
            "bad body",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "x"),
        );
        let info = RetryInformation {
            response: None,
            error: Some(&error),
            retry_count: 0,
        };
        assert!(matches!(strategy.retry(&info), RetryDecision::Fail(e) if e.message() == "bad body"));
    }

    #[test]
    fn ignore_flags_skip_their_category() {
        let statuses_only = ExponentialRetryStrategy {
            ignore_system_errors: true,
            ..ExponentialRetryStrategy::default()
        };
        let error = RestError::timeout("slow");
        let info = RetryInformation {
            response: None,
            error: Some(&error),
            retry_count: 0,
        };
        assert!(statuses_only.retry(&info).is_skip());

        let errors_only = ExponentialRetryStrategy {
            ignore_http_status_codes: true,
            ..ExponentialRetryStrategy::default()
        };
        let r = response(503, &[]);
        assert!(errors_only.retry(&with_response(&r, 0)).is_skip());
        assert!(matches!(errors_only.retry(&info), RetryDecision::RetryAfter(_)));
    }
}

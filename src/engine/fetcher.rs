//! One-shot request mode.
//!
//! A [`Fetcher`] executes one request and hands back its envelope. Retry is
//! either caller-driven ([`Fetcher::retry`] re-runs a finished exchange with
//! the attempt count bumped and elapsed time accumulating) or policy-driven
//! ([`Fetcher::fetch_with_retry`] loops classification, backoff, and
//! `Retry-After` automatically).

use tracing::{debug, instrument};

use crate::request::Request;
use crate::response::Exchange;
use crate::retry::{RetryDecision, RetryPolicy, classify, retry_after};
use crate::transport::Transport;

use super::{Launch, perform};

/// One-shot request mode over a shared [`Transport`].
///
/// # Example
///
/// ```no_run
/// use courier::{Fetcher, Request, Transport};
///
/// # async fn example() -> Result<(), courier::FetchError> {
/// let fetcher = Fetcher::new(Transport::new()?);
/// let exchange = fetcher.fetch(Request::get("https://example.com")).await;
/// println!("status: {:?}", exchange.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fetcher {
    transport: Transport,
}

impl Fetcher {
    /// Creates a fetcher over the given transport.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Executes one request and returns its envelope.
    ///
    /// Never panics and never returns early; every failure mode lands as an
    /// `Err` inside the envelope, with the request and its metadata intact.
    #[instrument(level = "debug", skip(self, request), fields(url = request.url()))]
    pub async fn fetch(&self, request: Request) -> Exchange {
        perform(&self.transport, Launch::fresh(request)).await
    }

    /// Re-executes a finished exchange's request as the next attempt.
    ///
    /// The attempt number increments and the original start time is kept, so
    /// the new envelope's elapsed time covers every attempt so far.
    #[instrument(level = "debug", skip(self, exchange), fields(url = exchange.request.url(), attempt = exchange.attempt + 1))]
    pub async fn retry(&self, exchange: &Exchange) -> Exchange {
        perform(&self.transport, Launch::followup(exchange)).await
    }

    /// Executes a request, retrying per the policy until it succeeds, the
    /// failure is permanent, or attempts are exhausted.
    ///
    /// Backoff comes from the policy; a server `Retry-After` hint takes
    /// precedence when present.
    #[instrument(level = "debug", skip(self, request, policy), fields(url = request.url()))]
    pub async fn fetch_with_retry(&self, request: Request, policy: &RetryPolicy) -> Exchange {
        let mut exchange = self.fetch(request).await;

        loop {
            let Some(failure) = classify(&exchange) else {
                return exchange;
            };

            match policy.should_retry(failure, exchange.attempt) {
                RetryDecision::DoNotRetry { reason } => {
                    debug!(
                        url = exchange.request.url(),
                        attempt = exchange.attempt,
                        reason,
                        "not retrying"
                    );
                    return exchange;
                }
                RetryDecision::Retry { delay, attempt } => {
                    let delay = retry_after(&exchange).unwrap_or(delay);
                    debug!(
                        url = exchange.request.url(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    exchange = self.retry(&exchange).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::FetchError;

    fn test_transport() -> Transport {
        Transport::new().unwrap()
    }

    /// A policy with sub-millisecond backoff so retry tests stay fast.
    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(1),
            1.0,
        )
    }

    #[tokio::test]
    async fn test_fetch_success_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher.fetch(Request::get(format!("{}/ok", server.uri()))).await;

        assert!(exchange.is_success());
        assert_eq!(exchange.text(), Some("hello"));
        assert_eq!(exchange.attempt, 1);
    }

    #[tokio::test]
    async fn test_fetch_completed_404_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch(Request::get(format!("{}/missing", server.uri())))
            .await;

        assert!(!exchange.is_success());
        assert_eq!(exchange.status().map(|s| s.as_u16()), Some(404));
        assert_eq!(exchange.text(), Some("gone"));
        assert!(exchange.error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_sends_headers_and_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("X-Token", "secret"))
            .and(body_json(serde_json::json!({ "name": "demo" })))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let request = Request::post(format!("{}/items", server.uri()))
            .header("X-Token", "secret")
            .json(&serde_json::json!({ "name": "demo" }))
            .unwrap();

        let exchange = fetcher.fetch(request).await;
        assert_eq!(exchange.status().map(|s| s.as_u16()), Some(201));
    }

    #[tokio::test]
    async fn test_fetch_sends_text_payload_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raw"))
            .and(body_string("raw payload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch(Request::post(format!("{}/raw", server.uri())).text("raw payload"))
            .await;
        assert!(exchange.is_success());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_lands_in_envelope() {
        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher.fetch(Request::get("not-a-valid-url").meta("id", 9)).await;

        assert!(matches!(
            exchange.error(),
            Some(FetchError::InvalidUrl { .. })
        ));
        // Metadata survives the failure path.
        assert_eq!(exchange.meta().get("id").unwrap(), 9);
    }

    #[tokio::test]
    async fn test_fetch_invalid_header_lands_in_envelope() {
        let server = MockServer::start().await;
        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch(Request::get(server.uri()).header("Bad\nName", "v"))
            .await;
        assert!(matches!(
            exchange.error(),
            Some(FetchError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_timeout_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch(
                Request::get(format!("{}/slow", server.uri()))
                    .timeout(Duration::from_millis(100)),
            )
            .await;

        assert!(matches!(exchange.error(), Some(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_retry_accumulates_attempts_and_elapsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let first = fetcher.fetch(Request::get(format!("{}/x", server.uri()))).await;
        let second = fetcher.retry(&first).await;

        assert_eq!(second.attempt, 2);
        assert_eq!(second.timing.started_at, first.timing.started_at);
        assert!(second.timing.elapsed >= first.timing.elapsed);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_succeeds_after_transient_failures() {
        let server = MockServer::start().await;
        // Two failures, then success.
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch_with_retry(
                Request::get(format!("{}/flaky", server.uri())),
                &fast_policy(5),
            )
            .await;

        assert!(exchange.is_success());
        assert_eq!(exchange.text(), Some("recovered"));
        assert_eq!(exchange.attempt, 3);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_stops_on_permanent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch_with_retry(
                Request::get(format!("{}/missing", server.uri())),
                &fast_policy(5),
            )
            .await;

        assert_eq!(exchange.status().map(|s| s.as_u16()), Some(404));
        assert_eq!(exchange.attempt, 1);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        let exchange = fetcher
            .fetch_with_retry(
                Request::get(format!("{}/down", server.uri())),
                &fast_policy(3),
            )
            .await;

        assert_eq!(exchange.status().map(|s| s.as_u16()), Some(500));
        assert_eq!(exchange.attempt, 3);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_honors_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(test_transport());
        // A policy with a long base delay: the test only stays fast because
        // the server's Retry-After of 0 takes precedence.
        let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30), 1.0);
        let start = std::time::Instant::now();
        let exchange = fetcher
            .fetch_with_retry(Request::get(format!("{}/limited", server.uri())), &policy)
            .await;

        assert!(exchange.is_success());
        assert_eq!(exchange.attempt, 2);
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "Retry-After: 0 should preempt the 30s policy backoff"
        );
    }
}

//! Batch fan-out/fan-in request mode.

use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::request::Request;
use crate::response::Exchange;
use crate::transport::Transport;

use super::{Launch, perform};

/// Fans out a set of requests in parallel and joins on all of them.
///
/// Every request is spawned immediately (there is no concurrency cap in this
/// mode; use [`Dispatcher`](crate::Dispatcher) for bounded work) and the
/// envelopes are funneled through one channel. The call returns once all N
/// have arrived, in completion order.
///
/// # Example
///
/// ```no_run
/// use courier::{Batch, Request, Transport};
///
/// # async fn example() -> Result<(), courier::FetchError> {
/// let batch = Batch::new(Transport::new()?);
/// let exchanges = batch
///     .dispatch(vec![
///         Request::get("https://example.com/a"),
///         Request::get("https://example.com/b"),
///     ])
///     .await;
/// assert_eq!(exchanges.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Batch {
    transport: Transport,
}

impl Batch {
    /// Creates a batch runner over the given transport.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Executes every request in parallel and returns all envelopes, in
    /// completion order. Failures are envelopes too; the output length
    /// always equals the input length.
    #[instrument(level = "debug", skip(self, requests), fields(count = requests.len()))]
    pub async fn dispatch(&self, requests: Vec<Request>) -> Vec<Exchange> {
        if requests.is_empty() {
            return Vec::new();
        }

        let count = requests.len();
        let (tx, mut rx) = mpsc::channel::<Exchange>(count);

        for request in requests {
            let transport = self.transport.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let exchange = perform(&transport, Launch::fresh(request)).await;
                // Receiver lives until all envelopes are collected.
                let _ = tx.send(exchange).await;
            });
        }
        drop(tx);

        let mut exchanges = Vec::with_capacity(count);
        while let Some(exchange) = rx.recv().await {
            exchanges.push(exchange);
        }

        debug!(
            count,
            ok = exchanges.iter().filter(|e| e.is_success()).count(),
            "batch complete"
        );
        exchanges
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_transport() -> Transport {
        Transport::new().unwrap()
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty() {
        let batch = Batch::new(test_transport());
        let exchanges = batch.dispatch(Vec::new()).await;
        assert!(exchanges.is_empty());
    }

    #[tokio::test]
    async fn test_batch_returns_one_envelope_per_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let batch = Batch::new(test_transport());
        let exchanges = batch
            .dispatch(vec![
                Request::get(format!("{}/a", server.uri())).meta("name", "a"),
                Request::get(format!("{}/b", server.uri())).meta("name", "b"),
                Request::get("not-a-valid-url").meta("name", "c"),
            ])
            .await;

        assert_eq!(exchanges.len(), 3);
        let by_name = |name: &str| {
            exchanges
                .iter()
                .find(|e| e.meta().get("name").unwrap() == name)
                .unwrap()
        };
        assert!(by_name("a").is_success());
        assert_eq!(by_name("b").status().map(|s| s.as_u16()), Some(404));
        assert!(by_name("c").error().is_some());
    }

    #[tokio::test]
    async fn test_batch_runs_concurrently() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let batch = Batch::new(test_transport());
        let requests = (0..8)
            .map(|_| Request::get(format!("{}/slow", server.uri())))
            .collect();

        let start = std::time::Instant::now();
        let exchanges = batch.dispatch(requests).await;
        let elapsed = start.elapsed();

        assert_eq!(exchanges.len(), 8);
        assert!(exchanges.iter().all(Exchange::is_success));
        // Sequential execution would need 8 * 150ms; parallel fan-out should
        // finish well under half of that.
        assert!(
            elapsed < Duration::from_millis(600),
            "batch took {elapsed:?}, expected parallel execution"
        );
    }

    #[tokio::test]
    async fn test_batch_completion_order_not_submission_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let batch = Batch::new(test_transport());
        let exchanges = batch
            .dispatch(vec![
                Request::get(format!("{}/slow", server.uri())).meta("name", "slow"),
                Request::get(format!("{}/fast", server.uri())).meta("name", "fast"),
            ])
            .await;

        assert_eq!(exchanges.len(), 2);
        assert_eq!(exchanges[0].meta().get("name").unwrap(), "fast");
    }
}

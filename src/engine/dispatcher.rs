//! Concurrency-limited dispatch with a retry queue.
//!
//! The [`Dispatcher`] owns two bounded request queues and a dispatch task.
//! Fresh submissions land on one queue, scheduled retries on the other; the
//! dispatch task drains them with strict priority (retry first), bounded by
//! a semaphore of `limit` permits, and every request resolves to exactly one
//! [`Exchange`] on a single bounded response channel.
//!
//! # Shape
//!
//! ```text
//! submit() ──> fresh  ─┐
//!                      ├─> dispatch loop ──> worker tasks ──> responses
//! retry()  ──> retry  ─┘    (retry first,    (≤ limit
//!     ^ after backoff        then fresh)      in flight)
//! ```
//!
//! Queue and response-channel capacities equal the concurrency limit, so a
//! caller that stops draining responses stalls workers rather than buffering
//! envelopes without bound, and a caller that submits faster than the pool
//! drains waits in `submit`.
//!
//! # Example
//!
//! Submission and draining run concurrently; with bounded queues, a loop
//! that submits everything before reading any response would block against
//! its own backpressure.
//!
//! ```no_run
//! use courier::{Dispatcher, Request, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (dispatcher, mut responses) = Dispatcher::new(Transport::new()?, 8)?;
//!
//! let producer = tokio::spawn(async move {
//!     for i in 0..100 {
//!         let request = Request::get(format!("https://example.com/item/{i}"));
//!         if dispatcher.submit(request).await.is_err() {
//!             break;
//!         }
//!     }
//!     // Dropping the dispatcher closes the queues; the response channel
//!     // ends once everything in flight has resolved.
//! });
//!
//! while let Some(exchange) = responses.recv().await {
//!     println!("{} -> {:?}", exchange.request.url(), exchange.status());
//! }
//! # producer.await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::request::Request;
use crate::response::Exchange;
use crate::retry::{RetryDecision, RetryPolicy, classify, retry_after};
use crate::transport::Transport;

use super::{Launch, perform};

/// Maximum allowed concurrency limit.
pub const MAX_LIMIT: usize = 100;

/// Error type for dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Invalid concurrency limit provided.
    #[error("invalid concurrency limit {value}: must be between 1 and {MAX_LIMIT}")]
    InvalidLimit {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The dispatch loop is gone and the request could not be queued.
    #[error("dispatch queue closed")]
    QueueClosed,
}

/// Concurrency-limited request dispatch over a shared [`Transport`].
///
/// Dropping the dispatcher closes both queues. The dispatch loop finishes
/// whatever is already queued (retries scheduled before the drop included,
/// since their backoff tasks hold queue handles), workers drain, and the
/// response channel then yields `None`.
#[derive(Debug)]
pub struct Dispatcher {
    fresh_tx: Sender<Launch>,
    retry_tx: Sender<Launch>,
    retry_policy: RetryPolicy,
    limit: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with the given concurrency limit and the default
    /// retry policy, returning it with the response channel receiver.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidLimit`] if `limit` is zero or above
    /// [`MAX_LIMIT`].
    pub fn new(
        transport: Transport,
        limit: usize,
    ) -> Result<(Self, Receiver<Exchange>), DispatchError> {
        Self::builder(transport).limit(limit).build()
    }

    /// Returns a builder for customizing the limit and retry policy.
    #[must_use]
    pub fn builder(transport: Transport) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            limit: 1,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Queues a request on the fresh queue.
    ///
    /// Awaits when the queue is full; that backpressure is the point of the
    /// bounded buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] if the dispatch loop is gone.
    #[instrument(level = "debug", skip(self, request), fields(url = request.url()))]
    pub async fn submit(&self, request: Request) -> Result<(), DispatchError> {
        self.fresh_tx
            .send(Launch::fresh(request))
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Consults the retry policy for a finished exchange and, when it says
    /// retry, schedules the request onto the retry queue after the backoff
    /// delay (the server's `Retry-After` hint takes precedence).
    ///
    /// The scheduled attempt keeps the exchange's first start time and
    /// produces its own envelope on the response channel. A successful
    /// exchange is never re-queued.
    #[instrument(level = "debug", skip(self, exchange), fields(url = exchange.request.url(), attempt = exchange.attempt))]
    pub fn retry(&self, exchange: &Exchange) -> RetryDecision {
        let Some(failure) = classify(exchange) else {
            return RetryDecision::DoNotRetry {
                reason: "request succeeded".to_string(),
            };
        };

        match self.retry_policy.should_retry(failure, exchange.attempt) {
            RetryDecision::Retry { delay, attempt } => {
                let delay = retry_after(exchange).unwrap_or(delay);
                let launch = Launch::followup(exchange);
                let retry_tx = self.retry_tx.clone();
                debug!(
                    url = launch.request.url(),
                    attempt,
                    delay_ms = delay.as_millis(),
                    "scheduling retry"
                );
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if retry_tx.send(launch).await.is_err() {
                        warn!("retry queue closed before scheduled retry could be queued");
                    }
                });
                RetryDecision::Retry { delay, attempt }
            }
            decision @ RetryDecision::DoNotRetry { .. } => decision,
        }
    }
}

/// Builder for [`Dispatcher`].
#[derive(Debug)]
pub struct DispatcherBuilder {
    transport: Transport,
    limit: usize,
    retry_policy: RetryPolicy,
}

impl DispatcherBuilder {
    /// Sets the concurrency limit (1 to [`MAX_LIMIT`]).
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the retry policy used by [`Dispatcher::retry`].
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Builds the dispatcher and spawns its dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidLimit`] if the limit is zero or above
    /// [`MAX_LIMIT`].
    pub fn build(self) -> Result<(Dispatcher, Receiver<Exchange>), DispatchError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(DispatchError::InvalidLimit { value: self.limit });
        }

        let (fresh_tx, fresh_rx) = mpsc::channel(self.limit);
        let (retry_tx, retry_rx) = mpsc::channel(self.limit);
        let (results_tx, results_rx) = mpsc::channel(self.limit);

        debug!(
            limit = self.limit,
            max_retries = self.retry_policy.max_attempts(),
            "starting dispatch loop"
        );

        tokio::spawn(run(
            self.transport,
            fresh_rx,
            retry_rx,
            results_tx,
            self.limit,
        ));

        Ok((
            Dispatcher {
                fresh_tx,
                retry_tx,
                retry_policy: self.retry_policy,
                limit: self.limit,
            },
            results_rx,
        ))
    }
}

/// The dispatch loop: acquire a permit, then pull the next launch (retry
/// queue first) and hand it to a worker task. Exits when both queues are
/// closed and drained.
///
/// The permit is acquired BEFORE choosing a queue so the retry preference is
/// evaluated at dispatch time, against whatever has accumulated while the
/// pool was saturated.
async fn run(
    transport: Transport,
    mut fresh_rx: Receiver<Launch>,
    mut retry_rx: Receiver<Launch>,
    results_tx: Sender<Exchange>,
    limit: usize,
) {
    let semaphore = Arc::new(Semaphore::new(limit));

    loop {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            // The semaphore is never closed; keep the guard anyway.
            break;
        };
        let Some(launch) = next_launch(&mut fresh_rx, &mut retry_rx).await else {
            break;
        };

        let transport = transport.clone();
        let results_tx = results_tx.clone();
        tokio::spawn(async move {
            // Permit is dropped when this block exits (RAII).
            let _permit = permit;
            let exchange = perform(&transport, launch).await;
            if results_tx.send(exchange).await.is_err() {
                debug!("response receiver dropped; discarding envelope");
            }
        });
    }

    debug!("dispatch loop finished");
}

/// Returns the next launch, always preferring the retry queue.
///
/// When both queues are empty it waits on both, still preferring retry if
/// the two become ready together. When one queue closes it keeps serving the
/// other; only when both are closed does it return `None`.
async fn next_launch(
    fresh_rx: &mut Receiver<Launch>,
    retry_rx: &mut Receiver<Launch>,
) -> Option<Launch> {
    // A queued retry wins even when fresh requests are also waiting.
    match retry_rx.try_recv() {
        Ok(launch) => return Some(launch),
        Err(TryRecvError::Disconnected) => return fresh_rx.recv().await,
        Err(TryRecvError::Empty) => {}
    }

    tokio::select! {
        biased;

        maybe = retry_rx.recv() => match maybe {
            Some(launch) => Some(launch),
            // Retry queue closed; fall back to fresh only.
            None => fresh_rx.recv().await,
        },
        maybe = fresh_rx.recv() => match maybe {
            Some(launch) => Some(launch),
            // Fresh queue closed; retries may still be scheduled.
            None => retry_rx.recv().await,
        },
    }
}

//! Courier HTTP request helpers.
//!
//! This library wraps a pooled HTTP transport with four request modes and an
//! optional throttled alerting layer for operational notifications.
//!
//! # Architecture
//!
//! - [`transport`] - Shared connection-pooling transport over reqwest
//! - [`request`] / [`response`] - The request description and result envelope
//!   shared by every mode
//! - [`engine`] - The four request modes:
//!   - [`Fetcher`] - one request in, one envelope out
//!   - [`Dispatcher`] - concurrency-limited dispatch with a retry queue
//!     preferred over the fresh queue and a single response channel
//!   - [`Batch`] - fan out N requests, join on all N envelopes
//!   - [`Downloader`] - stream a response body to disk
//! - [`retry`] - Failure classification and backoff policy
//! - [`alert`] - Rate-limited email and signed-webhook notifications
//!
//! # Example
//!
//! ```no_run
//! use courier::{Fetcher, Request, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new()?;
//! let fetcher = Fetcher::new(transport);
//!
//! let exchange = fetcher.fetch(Request::get("https://example.com/health")).await;
//! if exchange.is_success() {
//!     println!("{}", exchange.text().unwrap_or(""));
//! }
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod engine;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

// Re-export commonly used types
pub use alert::{AlertError, BodyKind, EmailAlert, Throttle, WebhookAlert};
pub use engine::{
    Batch, DispatchError, Dispatcher, DispatcherBuilder, DownloadReceipt, Downloader, Fetcher,
    MAX_LIMIT,
};
pub use error::FetchError;
pub use request::{Payload, Request};
pub use response::{Exchange, Response, Timing};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify, retry_after,
};
pub use transport::{Transport, TransportBuilder};

// Re-export the HTTP method and status types used in the public API.
pub use reqwest::{Method, StatusCode};

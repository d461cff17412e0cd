//! The four request modes.
//!
//! Every mode shares one execution path: resolve the (possibly proxied)
//! pooled client, validate the URL and headers, encode the payload, send,
//! and wrap the outcome in an [`Exchange`]. The modes differ only in how
//! requests are scheduled:
//!
//! - [`Fetcher`] - one request in, one envelope out
//! - [`Dispatcher`] - bounded concurrency, retry queue preferred over fresh
//! - [`Batch`] - fan out N requests, join on all N
//! - [`Downloader`] - stream the body to disk instead of reading text

mod batch;
mod dispatcher;
mod download;
mod fetcher;

pub use batch::Batch;
pub use dispatcher::{DispatchError, Dispatcher, DispatcherBuilder, MAX_LIMIT};
pub use download::{DownloadReceipt, Downloader, ProgressObserver};
pub use fetcher::Fetcher;

use std::time::{Instant, SystemTime};

use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::request::{Payload, Request};
use crate::response::{Exchange, Response, Timing};
use crate::transport::Transport;

/// A request annotated with attempt bookkeeping, ready to execute.
///
/// Retries keep the first attempt's start times so elapsed time accumulates
/// across attempts.
#[derive(Debug)]
pub(crate) struct Launch {
    pub(crate) request: Request,
    pub(crate) attempt: u32,
    pub(crate) started_at: SystemTime,
    pub(crate) origin: Instant,
}

impl Launch {
    /// Wraps a fresh request as its first attempt.
    pub(crate) fn fresh(request: Request) -> Self {
        Self {
            request,
            attempt: 1,
            started_at: SystemTime::now(),
            origin: Instant::now(),
        }
    }

    /// Builds the next attempt of a finished exchange, preserving the
    /// original start times.
    pub(crate) fn followup(exchange: &Exchange) -> Self {
        Self {
            request: exchange.request.clone(),
            attempt: exchange.attempt + 1,
            started_at: exchange.timing.started_at,
            origin: exchange.origin,
        }
    }
}

/// Executes a launch and wraps the outcome in an envelope. Never fails;
/// errors land inside the envelope.
pub(crate) async fn perform(transport: &Transport, launch: Launch) -> Exchange {
    let Launch {
        request,
        attempt,
        started_at,
        origin,
    } = launch;

    let result = execute(transport, &request).await;
    if let Err(error) = &result {
        debug!(url = request.url(), attempt, %error, "request failed");
    }

    Exchange {
        request,
        attempt,
        timing: Timing {
            started_at,
            finished_at: SystemTime::now(),
            elapsed: origin.elapsed(),
        },
        result,
        origin,
    }
}

/// Sends a request and returns the raw response, without consuming the body.
///
/// Shared by the text modes (which read the body to a string) and the
/// download mode (which streams it to disk).
pub(crate) async fn send(
    transport: &Transport,
    request: &Request,
) -> Result<reqwest::Response, FetchError> {
    Url::parse(request.url()).map_err(|_| FetchError::invalid_url(request.url()))?;

    let client = transport.client_for(request.proxy_value())?;
    let mut builder = client.request(request.method().clone(), request.url());

    if let Some(timeout) = request.timeout_value() {
        builder = builder.timeout(timeout);
    }

    for (name, value) in request.headers() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::invalid_header(name))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| FetchError::invalid_header(name))?;
        builder = builder.header(header_name, header_value);
    }

    builder = match request.payload() {
        Payload::Empty => builder,
        Payload::Text(text) => builder.body(text.clone()),
        Payload::Json(value) => builder.json(value),
    };

    builder.send().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::timeout(request.url())
        } else {
            FetchError::network(request.url(), e)
        }
    })
}

/// Sends a request and reads the body as text.
async fn execute(transport: &Transport, request: &Request) -> Result<Response, FetchError> {
    let response = send(transport, request).await?;

    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::timeout(request.url())
        } else {
            FetchError::network(request.url(), e)
        }
    })?;

    Ok(Response {
        status,
        headers,
        text,
    })
}

//! The result envelope shared by every request mode.
//!
//! Every mode resolves to an [`Exchange`]: the originating request, the
//! attempt number, wall-clock timing, and either a completed [`Response`] or
//! a [`FetchError`]. A completed round-trip is `Ok` regardless of status
//! code; whether a 404 is a failure is the caller's call.

use std::time::{Duration, Instant, SystemTime};

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use crate::error::FetchError;
use crate::request::Request;

/// A completed HTTP response: status, headers, and body text.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body decoded as text.
    pub text: String,
}

impl Response {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Wall-clock timing for an exchange.
///
/// `started_at` is the start of the FIRST attempt; retries of the same
/// request keep it, so `elapsed` accumulates across attempts.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// When the first attempt started.
    pub started_at: SystemTime,
    /// When this attempt finished.
    pub finished_at: SystemTime,
    /// Elapsed time since the first attempt started.
    pub elapsed: Duration,
}

/// One request paired with its outcome.
///
/// This is the envelope funneled through the response channel of the
/// concurrent modes and returned directly by the one-shot mode. The request
/// (with its metadata) rides along so out-of-order envelopes can be
/// correlated with what was submitted.
#[derive(Debug)]
pub struct Exchange {
    /// The request that produced this envelope.
    pub request: Request,
    /// Attempt number, 1-indexed. Retries increment it.
    pub attempt: u32,
    /// Wall-clock timing, accumulated across retries.
    pub timing: Timing,
    /// The completed response, or the error that prevented one.
    pub result: Result<Response, FetchError>,
    /// Monotonic start of the first attempt, used to accumulate elapsed
    /// time across retries.
    pub(crate) origin: Instant,
}

impl Exchange {
    /// Returns true if a response arrived with a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(response) if response.is_success())
    }

    /// Returns the status code of the completed response, if one arrived.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.result.as_ref().ok().map(|response| response.status)
    }

    /// Returns the response body text, if a response arrived.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.result
            .as_ref()
            .ok()
            .map(|response| response.text.as_str())
    }

    /// Returns the error, if the request failed without a response.
    #[must_use]
    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }

    /// Returns the metadata attached to the originating request.
    #[must_use]
    pub fn meta(&self) -> &Map<String, Value> {
        self.request.metadata()
    }
}

//! Error types for alert delivery.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while configuring or delivering alerts.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The configured minimum interval is below the floor.
    #[error(
        "alert interval {requested:?} is below the minimum of {minimum:?}; \
         a tighter interval would let a crash loop flood the channel"
    )]
    IntervalTooShort {
        /// The interval that was requested.
        requested: Duration,
        /// The enforced minimum.
        minimum: Duration,
    },

    /// The same message body was sent too recently.
    #[error("identical alert sent too recently; retry allowed in {wait:?}")]
    Throttled {
        /// How long until this body may be sent again.
        wait: Duration,
    },

    /// Malformed configuration (SMTP endpoint, webhook URL, etc.)
    #[error("invalid alert configuration: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// An email address could not be parsed.
    #[error("invalid email address {address}: {source}")]
    InvalidAddress {
        /// The offending address.
        address: String,
        /// The underlying parse error.
        #[source]
        source: lettre::address::AddressError,
    },

    /// The email message could not be assembled.
    #[error("failed to build email message: {source}")]
    Message {
        /// The underlying builder error.
        #[source]
        source: lettre::error::Error,
    },

    /// SMTP-level failure (connection, auth, delivery).
    #[error("SMTP delivery failed: {source}")]
    Smtp {
        /// The underlying SMTP error.
        #[source]
        source: lettre::transport::smtp::Error,
    },

    /// The webhook endpoint could not be reached.
    #[error("webhook request to {url} failed: {source}")]
    WebhookNetwork {
        /// The webhook URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The webhook endpoint answered with an error status.
    #[error("webhook {url} answered HTTP {status}")]
    WebhookStatus {
        /// The webhook URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

impl AlertError {
    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

//! Email alert delivery over SMTP.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, instrument};

use super::error::AlertError;
use super::throttle::Throttle;

/// How an email body should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `text/plain; charset=utf-8`
    Plain,
    /// `text/html; charset=utf-8`
    Html,
}

/// Throttled email alert sender.
///
/// The sender address doubles as the SMTP username, which matches the common
/// "app account" setup for operational mail.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use courier::{BodyKind, EmailAlert};
///
/// # async fn example() -> Result<(), courier::AlertError> {
/// let alert = EmailAlert::new(
///     "smtp.example.com:465",
///     "ops@example.com",
///     "app-password",
///     Duration::from_secs(60),
/// )?;
///
/// alert
///     .send(
///         "oncall@example.com;backup@example.com",
///         "worker crashed",
///         "the ingest worker exited with code 1",
///         BodyKind::Plain,
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct EmailAlert {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    throttle: Throttle,
}

impl std::fmt::Debug for EmailAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailAlert")
            .field("from", &self.from)
            .field("min_interval", &self.throttle.min_interval())
            .finish()
    }
}

impl EmailAlert {
    /// Creates an email alert sender.
    ///
    /// `smtp` is `host` or `host:port`; the connection is TLS-wrapped.
    /// `user` is both the SMTP username and the From address.
    ///
    /// # Errors
    ///
    /// - [`AlertError::IntervalTooShort`] if `min_interval` is under the
    ///   10-second floor
    /// - [`AlertError::Config`] if the host string cannot be parsed
    /// - [`AlertError::InvalidAddress`] if `user` is not a valid address
    /// - [`AlertError::Smtp`] if the transport cannot be configured
    pub fn new(
        smtp: &str,
        user: &str,
        password: &str,
        min_interval: Duration,
    ) -> Result<Self, AlertError> {
        let throttle = Throttle::new(min_interval)?;
        let (host, port) = split_host_port(smtp)?;

        let from: Mailbox = user.parse().map_err(|source| AlertError::InvalidAddress {
            address: user.to_string(),
            source,
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|source| AlertError::Smtp { source })?
            .credentials(Credentials::new(user.to_string(), password.to_string()));
        if let Some(port) = port {
            builder = builder.port(port);
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            throttle,
        })
    }

    /// Sends an alert email unless an identical body went out too recently.
    ///
    /// `to` is one or more recipient addresses separated by `;`.
    ///
    /// # Errors
    ///
    /// - [`AlertError::Throttled`] when the same body was sent inside the
    ///   minimum interval (the interval is NOT consumed)
    /// - [`AlertError::InvalidAddress`] / [`AlertError::Config`] for bad
    ///   recipients
    /// - [`AlertError::Message`] / [`AlertError::Smtp`] for build and
    ///   delivery failures (delivery failures do not consume the interval)
    #[instrument(level = "debug", skip(self, body), fields(subject))]
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        kind: BodyKind,
    ) -> Result<(), AlertError> {
        let fingerprint = self.throttle.check(body)?;

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);

        let mut recipients = 0usize;
        for recipient in to.split(';').map(str::trim).filter(|r| !r.is_empty()) {
            let mailbox: Mailbox =
                recipient
                    .parse()
                    .map_err(|source| AlertError::InvalidAddress {
                        address: recipient.to_string(),
                        source,
                    })?;
            builder = builder.to(mailbox);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(AlertError::config("no recipients given"));
        }

        let content_type = match kind {
            BodyKind::Plain => ContentType::TEXT_PLAIN,
            BodyKind::Html => ContentType::TEXT_HTML,
        };
        let message = builder
            .header(content_type)
            .body(body.to_string())
            .map_err(|source| AlertError::Message { source })?;

        debug!(recipients, "delivering alert email");
        self.mailer
            .send(message)
            .await
            .map_err(|source| AlertError::Smtp { source })?;

        self.throttle.record(fingerprint);
        info!(recipients, subject, "alert email sent");
        Ok(())
    }
}

/// Splits `host` or `host:port` into its parts.
fn split_host_port(smtp: &str) -> Result<(&str, Option<u16>), AlertError> {
    match smtp.rsplit_once(':') {
        None => {
            if smtp.is_empty() {
                return Err(AlertError::config("empty SMTP host"));
            }
            Ok((smtp, None))
        }
        Some((host, port)) => {
            if host.is_empty() {
                return Err(AlertError::config(format!("empty SMTP host in {smtp:?}")));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| AlertError::config(format!("invalid SMTP port in {smtp:?}")))?;
            Ok((host, Some(port)))
        }
    }
}

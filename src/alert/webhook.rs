//! Signed webhook alert delivery.
//!
//! Posts a timestamped, HMAC-signed JSON payload to a webhook endpoint. The
//! payload shape and signature scheme are those of Feishu/Lark custom bots
//! (`sign = base64(HMAC-SHA256(key = "{timestamp}\n{secret}", message = ""))`),
//! which also serve as a reasonable generic signed-webhook format.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, instrument};
use url::Url;

use crate::transport::Transport;

use super::error::AlertError;
use super::throttle::Throttle;

type HmacSha256 = Hmac<Sha256>;

/// Throttled, signed webhook alert sender.
///
/// Delivery goes through the shared [`Transport`], so webhook traffic reuses
/// the same pooled connections as everything else.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use courier::{Transport, WebhookAlert};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let alert = WebhookAlert::new(
///     Transport::new()?,
///     "https://open.example.com/hooks/abc123",
///     "signing-secret",
///     Duration::from_secs(60),
/// )?;
///
/// let reply = alert.send("the ingest worker exited with code 1").await?;
/// println!("endpoint answered: {reply}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WebhookAlert {
    transport: Transport,
    api: String,
    secret: String,
    throttle: Throttle,
}

impl WebhookAlert {
    /// Creates a webhook alert sender.
    ///
    /// # Errors
    ///
    /// - [`AlertError::IntervalTooShort`] if `min_interval` is under the
    ///   10-second floor
    /// - [`AlertError::Config`] if `api` is not a valid URL
    pub fn new(
        transport: Transport,
        api: impl Into<String>,
        secret: impl Into<String>,
        min_interval: Duration,
    ) -> Result<Self, AlertError> {
        let throttle = Throttle::new(min_interval)?;
        let api = api.into();
        Url::parse(&api).map_err(|_| AlertError::config(format!("invalid webhook URL {api:?}")))?;

        Ok(Self {
            transport,
            api,
            secret: secret.into(),
            throttle,
        })
    }

    /// Sends an alert message unless an identical one went out too recently.
    ///
    /// Returns the endpoint's response body on success.
    ///
    /// # Errors
    ///
    /// - [`AlertError::Throttled`] when the same message was sent inside the
    ///   minimum interval
    /// - [`AlertError::WebhookNetwork`] / [`AlertError::WebhookStatus`] for
    ///   delivery failures (neither consumes the interval)
    #[instrument(level = "debug", skip(self, msg))]
    pub async fn send(&self, msg: &str) -> Result<String, AlertError> {
        let fingerprint = self.throttle.check(msg)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let sign = sign(timestamp, &self.secret);

        let payload = serde_json::json!({
            "timestamp": timestamp,
            "sign": sign,
            "msg_type": "text",
            "content": { "text": msg },
        });

        debug!(url = %self.api, "delivering webhook alert");
        let response = self
            .transport
            .client()
            .post(&self.api)
            .json(&payload)
            .send()
            .await
            .map_err(|source| AlertError::WebhookNetwork {
                url: self.api.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::WebhookStatus {
                url: self.api.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| AlertError::WebhookNetwork {
                url: self.api.clone(),
                source,
            })?;

        self.throttle.record(fingerprint);
        info!(url = %self.api, "webhook alert sent");
        Ok(body)
    }
}

/// Computes the timestamped signature.
///
/// The HMAC KEY is `"{timestamp}\n{secret}"` and the signed message is
/// empty. That inversion looks odd but is what the receiving side verifies.
fn sign(timestamp: u64, secret: &str) -> String {
    let key = format!("{timestamp}\n{secret}");
    // HMAC-SHA256 accepts keys of any length, so this cannot fail.
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map(|mut mac| {
            mac.update(b"");
            mac.finalize().into_bytes()
        });
    match mac {
        Ok(bytes) => STANDARD.encode(bytes),
        Err(_) => String::new(),
    }
}

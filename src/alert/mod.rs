//! Rate-limited operational notifications.
//!
//! Two delivery channels for "something needs a human" messages: SMTP email
//! and a signed webhook. Both sit behind a [`Throttle`] keyed on a SHA-256
//! fingerprint of the message body, so a crash loop re-sending the same
//! alert every few seconds becomes one notification per interval while
//! distinct messages pass through unimpeded.

mod email;
mod error;
mod throttle;
mod webhook;

pub use email::{BodyKind, EmailAlert};
pub use error::AlertError;
pub use throttle::{MIN_INTERVAL, Throttle};
pub use webhook::WebhookAlert;

//! Shared connection-pooling transport.
//!
//! Every request mode executes through a [`Transport`]: a pooled
//! `reqwest::Client` built once and cloned cheaply into however many engines
//! and tasks need it. Requests that name a proxy get a client routed through
//! that proxy, built on first use and cached so pooling is preserved per
//! proxy URL.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use courier::Transport;
//!
//! # fn example() -> Result<(), courier::FetchError> {
//! let transport = Transport::builder()
//!     .connect_timeout(Duration::from_secs(10))
//!     .max_idle_per_host(50)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument};

use crate::error::FetchError;

/// Default maximum idle connections kept per host.
const DEFAULT_MAX_IDLE_PER_HOST: usize = 100;

/// Default idle connection timeout (60 seconds).
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connect timeout (30 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent identifying the library.
fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("courier/{version}")
}

/// Pool and protocol settings applied to every client this transport builds.
#[derive(Debug, Clone)]
struct Settings {
    max_idle_per_host: usize,
    idle_timeout: Duration,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    user_agent: String,
    http2_prior_knowledge: bool,
    gzip: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            user_agent: default_user_agent(),
            http2_prior_knowledge: false,
            gzip: true,
        }
    }
}

impl Settings {
    /// Applies these settings to a fresh client builder.
    fn apply(&self) -> ClientBuilder {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .connect_timeout(self.connect_timeout)
            .gzip(self.gzip)
            .user_agent(self.user_agent.clone());
        if let Some(read_timeout) = self.read_timeout {
            builder = builder.timeout(read_timeout);
        }
        if self.http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }
        builder
    }
}

struct Inner {
    base: Client,
    settings: Settings,
    /// Proxied clients, built once per proxy URL. Keyed by the exact proxy
    /// string, so two spellings of the same proxy yield two clients.
    proxied: DashMap<String, Client>,
}

/// Shared connection-pooling transport.
///
/// Designed to be created once and cloned into every engine that needs it;
/// clones share the same pooled connections and proxied-client cache.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("settings", &self.inner.settings)
            .field("proxied_clients", &self.inner.proxied.len())
            .finish()
    }
}

impl Transport {
    /// Creates a transport with default pool settings.
    ///
    /// Defaults: keep-alive enabled, 100 idle connections per host, 60 s idle
    /// timeout, 30 s connect timeout, gzip decompression, identifying
    /// User-Agent, no overall read timeout (set one per request or via
    /// [`TransportBuilder::read_timeout`]).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Build`] if the underlying client cannot be
    /// constructed (for example when TLS backends are unavailable).
    pub fn new() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    /// Returns a builder for customizing pool and protocol settings.
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder {
            settings: Settings::default(),
        }
    }

    /// Returns the shared pooled client.
    #[must_use]
    pub fn client(&self) -> Client {
        self.inner.base.clone()
    }

    /// Returns a client for the given proxy, or the shared pooled client
    /// when no proxy is requested.
    ///
    /// Proxied clients carry the same pool settings as the base client and
    /// are cached by proxy URL, so repeated requests through the same proxy
    /// reuse its connections.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Proxy`] if the proxy URL is rejected or the
    /// proxied client cannot be built.
    #[instrument(level = "debug", skip(self))]
    pub fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.inner.base.clone());
        };

        if let Some(entry) = self.inner.proxied.get(proxy) {
            return Ok(entry.value().clone());
        }

        let resolved = Proxy::all(proxy).map_err(|e| FetchError::proxy(proxy, e))?;
        let client = self
            .inner
            .settings
            .apply()
            .proxy(resolved)
            .build()
            .map_err(|e| FetchError::proxy(proxy, e))?;

        debug!(proxy, "built proxied client");
        self.inner.proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

/// Builder for [`Transport`].
#[derive(Debug)]
pub struct TransportBuilder {
    settings: Settings,
}

impl TransportBuilder {
    /// Sets the maximum idle connections kept per host.
    #[must_use]
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.settings.max_idle_per_host = max;
        self
    }

    /// Sets how long idle connections are kept alive.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Sets an overall per-request timeout applied to every request that
    /// does not set its own.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = Some(timeout);
        self
    }

    /// Overrides the User-Agent header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    /// Speaks HTTP/2 without the upgrade dance. Only useful against servers
    /// known to accept prior-knowledge HTTP/2.
    #[must_use]
    pub fn http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.settings.http2_prior_knowledge = enabled;
        self
    }

    /// Enables or disables automatic gzip decompression.
    #[must_use]
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.settings.gzip = enabled;
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Build`] if the underlying client cannot be
    /// constructed.
    #[instrument(level = "debug", skip(self))]
    pub fn build(self) -> Result<Transport, FetchError> {
        let base = self.settings.apply().build().map_err(FetchError::build)?;
        debug!(
            max_idle_per_host = self.settings.max_idle_per_host,
            idle_timeout_ms = self.settings.idle_timeout.as_millis(),
            connect_timeout_ms = self.settings.connect_timeout.as_millis(),
            http2 = self.settings.http2_prior_knowledge,
            "built transport"
        );
        Ok(Transport {
            inner: Arc::new(Inner {
                base,
                settings: self.settings,
                proxied: DashMap::new(),
            }),
        })
    }
}

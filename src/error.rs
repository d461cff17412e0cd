//! Error types for request execution.
//!
//! Structured errors for everything that can go wrong between building a
//! request and reading its response, with enough context to debug a failure
//! from the error message alone.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while executing a request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A header name or value could not be encoded.
    #[error("invalid header: {name}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The request payload could not be serialized to JSON.
    #[error("failed to encode JSON payload: {source}")]
    BodyEncode {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Build {
        /// The underlying client build error.
        #[source]
        source: reqwest::Error,
    },

    /// The proxy URL was rejected or the proxied client could not be built.
    #[error("invalid proxy {proxy}: {source}")]
    Proxy {
        /// The proxy URL that was rejected.
        proxy: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors,
    /// a connection dropped mid-body, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response while downloading to a file.
    ///
    /// Only the download mode produces this variant: the text modes hand any
    /// completed response back to the caller regardless of status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during a download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Downloaded file size does not match the server's Content-Length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates a payload encoding error.
    pub fn body_encode(source: serde_json::Error) -> Self {
        Self::BodyEncode { source }
    }

    /// Creates a client build error.
    pub fn build(source: reqwest::Error) -> Self {
        Self::Build { source }
    }

    /// Creates a proxy error.
    pub fn proxy(proxy: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Proxy {
            proxy: proxy.into(),
            source,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or
// `From<std::io::Error>` because the variants require context (url, path)
// that the source errors don't provide. The helper constructors are the
// pattern here; callers supply the missing context.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_url() {
        let error = FetchError::timeout("https://example.com/health");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/health"));
    }

    #[test]
    fn test_http_status_display() {
        let error = FetchError::http_status("https://example.com/file.bin", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.bin"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_invalid_url_display() {
        let error = FetchError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(
            msg.contains("invalid URL"),
            "Expected 'invalid URL' in: {msg}"
        );
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_invalid_header_display() {
        let error = FetchError::invalid_header("X Bad Name");
        assert!(error.to_string().contains("X Bad Name"));
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FetchError::io(PathBuf::from("/tmp/out.bin"), io_error);
        assert!(error.to_string().contains("/tmp/out.bin"));
    }

    #[test]
    fn test_integrity_display_includes_sizes() {
        let error = FetchError::integrity("/tmp/out.bin", 100, 42);
        let msg = error.to_string();
        assert!(msg.contains("100"), "Expected expected size in: {msg}");
        assert!(msg.contains("42"), "Expected actual size in: {msg}");
    }

    #[test]
    fn test_body_encode_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = FetchError::body_encode(source);
        assert!(error.to_string().contains("JSON payload"));
    }
}

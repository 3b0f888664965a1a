//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Configuration carried through every component of a connection.
///
/// Headers are applied verbatim to the negotiate POST requests and to the
/// WebSocket upgrade request. Header lookup is case-insensitive on the wire
/// per HTTP; the map preserves the names as given.
///
/// The config is only mutable while the connection is disconnected. The
/// negotiation engine clones it per redirect iteration, so a server-supplied
/// bearer token never leaks back into the caller's copy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Headers applied to outgoing HTTP requests and the upgrade request.
    pub http_headers: HashMap<String, String>,
    /// How long to wait for the handshake acknowledgement after the
    /// transport connects.
    pub handshake_timeout: Duration,
    /// Per-request timeout for negotiate HTTP calls.
    pub http_request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_headers: HashMap::new(),
            handshake_timeout: Duration::from_secs(15),
            http_request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Creates a config with default timeouts and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an HTTP header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the per-request HTTP timeout.
    pub fn with_http_request_timeout(mut self, timeout: Duration) -> Self {
        self.http_request_timeout = timeout;
        self
    }
}

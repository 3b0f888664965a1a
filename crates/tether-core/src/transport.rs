//! Transport and HTTP client contracts.
//!
//! The connection core only ever talks to these traits; concrete
//! implementations live in `tether-transport` and are injected through the
//! connection builder, so tests can substitute scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::error::{ClientResult, TransportResult};

// =============================================================================
// Transport
// =============================================================================

/// A duplex, message-framed channel.
///
/// Sends and receives may proceed in parallel; implementations serialize
/// sends internally. Only the connection's receive loop calls
/// [`receive`](Transport::receive).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the channel to `url`, carrying `config.http_headers` into the
    /// handshake request.
    async fn connect(&self, url: &str, config: &ClientConfig) -> TransportResult<()>;

    /// Enqueues a text message. Completion indicates the local write was
    /// accepted, not that the peer received it.
    async fn send(&self, message: &str) -> TransportResult<()>;

    /// Resolves with the next inbound text payload. Fails once the channel
    /// is closed; every call after [`close`](Transport::close) fails.
    async fn receive(&self) -> TransportResult<String>;

    /// Initiates shutdown. Pending and subsequent receives resolve with a
    /// terminal failure.
    async fn close(&self) -> TransportResult<()>;
}

/// Produces a fresh [`Transport`] per start attempt.
pub trait TransportFactory: Send + Sync {
    /// Creates a new, unconnected transport.
    fn create(&self) -> Arc<dyn Transport>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Issues the negotiate POST requests.
///
/// Implementations apply `config.http_headers` verbatim and must not follow
/// HTTP-level redirects; redirects in this protocol are application-level,
/// carried inside the negotiate payload.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POSTs to `url` with no body. Returns the response body on a 2xx
    /// status and [`ClientError::Web`](crate::ClientError::Web) otherwise.
    async fn post(&self, url: &str, config: &ClientConfig) -> ClientResult<String>;
}

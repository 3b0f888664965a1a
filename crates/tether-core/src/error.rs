//! Unified error types for the tether client.
//!
//! Transport-level failures are modeled separately from client-level ones so
//! the transport crate does not need to know about negotiation or lifecycle
//! concerns. `TransportError` converts into `ClientError` transparently.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by the duplex message transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Opening the channel failed (handshake error, refused, timeout).
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The channel is closed; no further traffic is possible.
    #[error("connection closed: {reason}")]
    Closed {
        /// Reason for closure.
        reason: String,
    },

    /// A local write could not be enqueued.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Reading the next inbound message failed.
    #[error("failed to receive message: {0}")]
    ReceiveFailed(String),
}

// =============================================================================
// Client Errors
// =============================================================================

/// Errors surfaced by the connection lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Operation attempted while the connection was in the wrong state.
    #[error("{0}")]
    InvalidState(String),

    /// An HTTP call completed with a non-success status.
    #[error("web exception - {status} {reason}")]
    Web {
        /// HTTP status code.
        status: u16,
        /// Reason phrase or response body excerpt.
        reason: String,
    },

    /// The server violated the negotiation or handshake protocol.
    #[error("{0}")]
    Protocol(String),

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation was aborted by a concurrent stop.
    #[error("{0}")]
    Canceled(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

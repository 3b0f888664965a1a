//! Connection lifecycle states.

use std::fmt;

/// The lifecycle state of a connection.
///
/// Transitions are owned by the connection itself and always follow
/// `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
/// except that a failed or canceled start falls back from `Connecting`
/// directly to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, no receive loop. The only state in which callbacks and
    /// configuration may be changed.
    Disconnected,
    /// A start attempt is in flight: negotiating, connecting the transport,
    /// or waiting for the handshake acknowledgement.
    Connecting,
    /// The transport is open and the receive loop is running.
    Connected,
    /// A stop is in progress; the transport is closing and the receive loop
    /// is draining.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

//! # Tether Transport
//!
//! Concrete network implementations of the contracts in `tether-core`:
//!
//! | Implementation | Contract | Backed by |
//! |----------------|----------|-----------|
//! | [`ReqwestHttpClient`] | `HttpClient` | `reqwest` (redirects disabled) |
//! | [`WebSocketTransport`] | `Transport` | `tokio-tungstenite` |
//!
//! The connection core in `tether-client` wires these in by default;
//! alternative implementations can be injected through the connection
//! builder.

mod http;
mod websocket;

pub use http::ReqwestHttpClient;
pub use websocket::{WebSocketTransport, WebSocketTransportFactory};

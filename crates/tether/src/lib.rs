//! # Tether
//!
//! An async Rust client for ASP.NET Core SignalR connections.
//!
//! Tether turns a base URL into a live, bidirectional, message-framed pipe:
//! it drives the HTTP negotiate sub-protocol (following application-level
//! redirects and forwarding redirect-scoped bearer tokens), connects a
//! WebSocket transport, and runs a receive loop delivering `0x1E`-delimited
//! frames to a user callback, all behind a four-state lifecycle that stays
//! coherent under concurrent start/stop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  tether-client   │  Connection state machine, negotiation, receive loop
//! ├──────────────────┤
//! │ tether-transport │  reqwest HTTP sender, tokio-tungstenite WebSocket
//! ├──────────────────┤
//! │   tether-core    │  Config, errors, state, logging seam, contracts
//! └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::builder("https://example.com/chat")
//!         .trace_level(TraceLevel::StateChanges)
//!         .build()?;
//!     connection.set_on_message(|message| println!("received: {message}"))?;
//!
//!     connection.start().await?;
//!     connection.send("hello").await?;
//!     connection.stop().await?;
//!     Ok(())
//! }
//! ```

pub use tether_client::*;
pub use tether_core::*;
pub use tether_transport::{ReqwestHttpClient, WebSocketTransport, WebSocketTransportFactory};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tether_client::{Connection, ConnectionBuilder};
    pub use tether_core::{
        ClientConfig, ClientError, ClientResult, ConnectionState, TraceLevel,
    };
}

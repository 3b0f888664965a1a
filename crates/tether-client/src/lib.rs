//! # Tether Client
//!
//! The connection core of the tether SignalR client: the negotiate
//! sub-protocol, the URL builder, the `0x1E`-framed receive loop, and the
//! [`Connection`] state machine tying them together.
//!
//! ## Lifecycle
//!
//! ```text
//! disconnected --start()--> connecting --handshake ok--> connected
//! connecting   --stop() or error-----------------------> disconnected
//! connected    --stop() or loop termination--> disconnecting --> disconnected
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new("http://localhost:5000/chat")?;
//!     connection.set_on_message(|message| println!("received: {message}"))?;
//!     connection.start().await?;
//!     connection.send("hello").await?;
//!     connection.stop().await?;
//!     Ok(())
//! }
//! ```

mod connection;
mod negotiate;
mod url_builder;

#[cfg(test)]
mod testing;

pub use connection::{
    Connection, ConnectionBuilder, DisconnectedCallback, MessageCallback, RECORD_SEPARATOR,
};
pub use negotiate::{AvailableTransport, NegotiationResult};

//! # Tether Core
//!
//! Foundation types for the tether SignalR client: the connection state
//! enum, client configuration, the error taxonomy, the trace-level logging
//! seam, and the transport/HTTP contracts the connection core is built on.
//!
//! Concrete network implementations live in `tether-transport`; the
//! connection state machine lives in `tether-client`.

pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError, TransportResult};
pub use logging::{LogWriter, Logger, MemoryLogWriter, TraceLevel, TracingLogWriter};
pub use state::ConnectionState;
pub use transport::{HttpClient, Transport, TransportFactory};

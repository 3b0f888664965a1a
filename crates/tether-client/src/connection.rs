//! The connection state machine and receive loop.
//!
//! A connection moves through
//! `disconnected -> connecting -> connected -> disconnecting -> disconnected`.
//! A failed or canceled start falls back from `connecting` directly to
//! `disconnected`. One `parking_lot::Mutex` guards the state, callbacks, and
//! config; it is never held across an await and user callbacks are never
//! invoked under it.
//!
//! Stop cancels an in-flight start through a [`CancellationToken`]; the
//! canceled start continuation owns the cleanup (close the transport, join
//! the receive loop, fall back to `disconnected`), so a stop caller racing a
//! start never blocks on the start's teardown.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use tether_core::{
    ClientConfig, ClientError, ClientResult, ConnectionState, HttpClient, LogWriter, Logger,
    TraceLevel, Transport, TransportError, TransportFactory,
};
use tether_transport::{ReqwestHttpClient, WebSocketTransportFactory};

use crate::negotiate;
use crate::url_builder;

/// Frame delimiter on the transport: the ASCII Record Separator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

const START_CANCELED: &str = "starting the connection has been canceled.";

/// Callback invoked for every inbound message.
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked once per completed start/stop pair.
pub type DisconnectedCallback = Arc<dyn Fn() + Send + Sync>;

// =============================================================================
// Guarded State
// =============================================================================

/// Everything behind the connection's single state mutex.
struct Guarded {
    state: ConnectionState,
    /// Empty until a negotiate body yields an id; cleared when a new start
    /// attempt begins, preserved after stop.
    connection_id: String,
    config: ClientConfig,
    on_message: Option<MessageCallback>,
    on_disconnected: Option<DisconnectedCallback>,
    /// Present only while connecting, connected, or disconnecting.
    transport: Option<Arc<dyn Transport>>,
    /// Fresh per start attempt; canceling it aborts the start in flight.
    start_cancellation: CancellationToken,
    /// Joined during shutdown.
    receive_handle: Option<JoinHandle<()>>,
}

impl Guarded {
    fn change_state(&mut self, logger: &Logger, to: ConnectionState) {
        logger.log(
            TraceLevel::StateChanges,
            &format!("[state change] {} -> {}", self.state, to),
        );
        self.state = to;
    }
}

struct Inner {
    base_url: Url,
    logger: Logger,
    http: Arc<dyn HttpClient>,
    transport_factory: Arc<dyn TransportFactory>,
    guarded: Mutex<Guarded>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Forced shutdown: the receive loop only holds a weak back-reference,
        // so closing the transport is enough to unwind it.
        let guarded = self.guarded.get_mut();
        guarded.start_cancellation.cancel();
        if let Some(transport) = guarded.transport.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = transport.close().await;
                });
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and builds a [`Connection`].
pub struct ConnectionBuilder {
    url: String,
    trace_level: TraceLevel,
    log_writer: Option<Arc<dyn LogWriter>>,
    http_client: Option<Arc<dyn HttpClient>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl ConnectionBuilder {
    /// Creates a builder for the given base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            trace_level: TraceLevel::All,
            log_writer: None,
            http_client: None,
            transport_factory: None,
        }
    }

    /// Sets which diagnostic categories the connection emits.
    pub fn trace_level(mut self, level: TraceLevel) -> Self {
        self.trace_level = level;
        self
    }

    /// Sets the diagnostic sink. Defaults to forwarding into `tracing`.
    pub fn log_writer(mut self, writer: Arc<dyn LogWriter>) -> Self {
        self.log_writer = Some(writer);
        self
    }

    /// Overrides the HTTP client used for negotiation.
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http);
        self
    }

    /// Overrides the transport factory.
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Builds the connection in the disconnected state.
    pub fn build(self) -> ClientResult<Connection> {
        let base_url = url_builder::parse_base(&self.url)?;
        let logger = Logger::new(
            self.trace_level,
            self.log_writer
                .unwrap_or_else(|| Arc::new(tether_core::TracingLogWriter)),
        );
        let http: Arc<dyn HttpClient> = match self.http_client {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::new()?),
        };
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Arc::new(WebSocketTransportFactory::new()));

        Ok(Connection {
            inner: Arc::new(Inner {
                base_url,
                logger,
                http,
                transport_factory,
                guarded: Mutex::new(Guarded {
                    state: ConnectionState::Disconnected,
                    connection_id: String::new(),
                    config: ClientConfig::default(),
                    on_message: None,
                    on_disconnected: None,
                    transport: None,
                    start_cancellation: CancellationToken::new(),
                    receive_handle: None,
                }),
            }),
        })
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A connection to an ASP.NET Core SignalR endpoint.
///
/// Cloning is cheap and shares the underlying connection; when the last
/// handle drops, the transport is closed and the receive loop unwinds.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a builder for the given base URL.
    pub fn builder(url: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(url)
    }

    /// Creates a connection with default transports and logging.
    pub fn new(url: impl Into<String>) -> ClientResult<Self> {
        Self::builder(url).build()
    }

    /// The current lifecycle state. Does not suspend.
    pub fn state(&self) -> ConnectionState {
        self.inner.guarded.lock().state
    }

    /// The last negotiated connection id, or an empty string if no negotiate
    /// body has yielded one yet. Does not suspend.
    pub fn connection_id(&self) -> String {
        self.inner.guarded.lock().connection_id.clone()
    }

    /// Sets the callback invoked for every inbound message.
    pub fn set_on_message(&self, callback: impl Fn(&str) + Send + Sync + 'static) -> ClientResult<()> {
        let mut guarded = self.inner.guarded.lock();
        if guarded.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState(format!(
                "cannot set the message_received callback when the connection is not in the \
                 disconnected state. current connection state: {}",
                guarded.state
            )));
        }
        guarded.on_message = Some(Arc::new(callback));
        Ok(())
    }

    /// Sets the callback invoked once per completed start/stop pair.
    pub fn set_on_disconnected(&self, callback: impl Fn() + Send + Sync + 'static) -> ClientResult<()> {
        let mut guarded = self.inner.guarded.lock();
        if guarded.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState(format!(
                "cannot set the disconnected callback when the connection is not in the \
                 disconnected state. current connection state: {}",
                guarded.state
            )));
        }
        guarded.on_disconnected = Some(Arc::new(callback));
        Ok(())
    }

    /// Replaces the client configuration.
    pub fn set_client_config(&self, config: ClientConfig) -> ClientResult<()> {
        let mut guarded = self.inner.guarded.lock();
        if guarded.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState(format!(
                "cannot set client config when the connection is not in the disconnected state. \
                 current connection state: {}",
                guarded.state
            )));
        }
        guarded.config = config;
        Ok(())
    }

    /// Starts the connection: negotiate, connect the transport, launch the
    /// receive loop, and wait for the handshake acknowledgement.
    ///
    /// Fails with [`ClientError::InvalidState`] outside the disconnected
    /// state and with [`ClientError::Canceled`] when a concurrent
    /// [`stop`](Connection::stop) aborts the attempt.
    pub async fn start(&self) -> ClientResult<()> {
        let inner = &self.inner;
        let (config, cancellation) = {
            let mut guarded = inner.guarded.lock();
            if guarded.state != ConnectionState::Disconnected {
                return Err(ClientError::InvalidState(
                    "cannot start a connection that is not in the disconnected state".to_string(),
                ));
            }
            guarded.change_state(&inner.logger, ConnectionState::Connecting);
            guarded.connection_id.clear();
            guarded.start_cancellation = CancellationToken::new();
            (guarded.config.clone(), guarded.start_cancellation.clone())
        };

        match self.start_core(&config, &cancellation).await {
            Ok(()) => {
                let completed = {
                    let mut guarded = inner.guarded.lock();
                    if cancellation.is_cancelled() {
                        false
                    } else {
                        guarded.change_state(&inner.logger, ConnectionState::Connected);
                        true
                    }
                };
                if completed {
                    Ok(())
                } else {
                    // A stop raced the final await; honor it.
                    self.cleanup_failed_start(true).await;
                    Err(ClientError::Canceled(START_CANCELED.to_string()))
                }
            }
            Err(e) => {
                let canceled = matches!(e, ClientError::Canceled(_));
                self.cleanup_failed_start(canceled).await;
                Err(e)
            }
        }
    }

    /// The start sequence between the `connecting` transition and the
    /// `connected` one. Every await is raced against the cancellation token
    /// so a concurrent stop aborts promptly.
    async fn start_core(
        &self,
        config: &ClientConfig,
        cancellation: &CancellationToken,
    ) -> ClientResult<()> {
        let inner = &self.inner;

        let negotiation = tokio::select! {
            _ = cancellation.cancelled() => {
                return Err(ClientError::Canceled(START_CANCELED.to_string()));
            }
            result = negotiate::negotiate(inner.http.as_ref(), &inner.base_url, config) => result?,
        };

        // Recorded even if a later step fails.
        {
            let mut guarded = inner.guarded.lock();
            guarded.connection_id = negotiation.connection_id.clone();
        }

        let connect_url = url_builder::connect_url(&negotiation.url, &negotiation.connection_id)?;
        let transport = inner.transport_factory.create();

        tokio::select! {
            _ = cancellation.cancelled() => {
                return Err(ClientError::Canceled(START_CANCELED.to_string()));
            }
            result = transport.connect(connect_url.as_str(), &negotiation.config) => {
                result.map_err(ClientError::from)?;
            }
        }

        let (handshake_tx, handshake_rx) = oneshot::channel();
        let on_message = {
            let mut guarded = inner.guarded.lock();
            guarded.transport = Some(transport.clone());
            guarded.on_message.clone()
        };
        let handle = tokio::spawn(run_receive_loop(
            Arc::downgrade(inner),
            transport,
            on_message,
            handshake_tx,
            inner.logger.clone(),
        ));
        {
            inner.guarded.lock().receive_handle = Some(handle);
        }

        tokio::select! {
            _ = cancellation.cancelled() => {
                Err(ClientError::Canceled(START_CANCELED.to_string()))
            }
            result = timeout(config.handshake_timeout, handshake_rx) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ClientError::Transport(TransportError::Closed {
                    reason: "connection closed before the handshake completed".to_string(),
                })),
                Err(_) => Err(ClientError::Protocol(
                    "transport timed out when trying to connect".to_string(),
                )),
            },
        }
    }

    /// Tears down whatever a failed or canceled start left behind and falls
    /// back from `connecting` to `disconnected`.
    async fn cleanup_failed_start(&self, canceled: bool) {
        let inner = &self.inner;
        let (transport, handle) = {
            let mut guarded = inner.guarded.lock();
            (guarded.transport.take(), guarded.receive_handle.take())
        };
        if let Some(transport) = &transport {
            let _ = transport.close().await;
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let mut guarded = inner.guarded.lock();
        if canceled {
            inner.logger.log(TraceLevel::StateChanges, START_CANCELED);
        }
        if guarded.state == ConnectionState::Connecting {
            guarded.change_state(&inner.logger, ConnectionState::Disconnected);
        }
    }

    /// Stops the connection.
    ///
    /// Stopping an already-disconnected connection is a no-op. While another
    /// stop is draining, additional callers observe [`ClientError::Canceled`].
    /// A stop during an in-flight start cancels that start; the start caller
    /// observes [`ClientError::Canceled`] and its continuation performs the
    /// fallback to `disconnected`.
    pub async fn stop(&self) -> ClientResult<()> {
        let inner = &self.inner;
        inner.logger.log(TraceLevel::StateChanges, "stopping connection");

        let (transport, handle) = {
            let mut guarded = inner.guarded.lock();
            inner
                .logger
                .log(TraceLevel::StateChanges, "acquired lock in shutdown()");
            match guarded.state {
                ConnectionState::Disconnected => return Ok(()),
                ConnectionState::Disconnecting => {
                    return Err(ClientError::Canceled(
                        "the connection is already being stopped.".to_string(),
                    ));
                }
                ConnectionState::Connecting => {
                    // The canceled start continuation owns the teardown and
                    // the transition back to disconnected.
                    guarded.start_cancellation.cancel();
                    return Ok(());
                }
                ConnectionState::Connected => {
                    guarded.change_state(&inner.logger, ConnectionState::Disconnecting);
                    (guarded.transport.take(), guarded.receive_handle.take())
                }
            }
        };

        if let Some(transport) = &transport {
            let _ = transport.close().await;
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let on_disconnected = {
            let mut guarded = inner.guarded.lock();
            guarded.change_state(&inner.logger, ConnectionState::Disconnected);
            guarded.on_disconnected.clone()
        };
        if let Some(callback) = on_disconnected {
            invoke_disconnected(&inner.logger, &callback);
        }
        Ok(())
    }

    /// Sends a text message over the transport.
    pub async fn send(&self, message: &str) -> ClientResult<()> {
        let transport = {
            let guarded = self.inner.guarded.lock();
            if guarded.state != ConnectionState::Connected {
                return Err(ClientError::InvalidState(format!(
                    "cannot send data when the connection is not in the connected state. \
                     current connection state: {}",
                    guarded.state
                )));
            }
            guarded.transport.clone()
        };
        let transport = transport.ok_or_else(|| {
            ClientError::Transport(TransportError::Closed {
                reason: "transport is not available".to_string(),
            })
        })?;

        if let Err(e) = transport.send(message).await {
            self.inner
                .logger
                .log(TraceLevel::Errors, &format!("error sending data: {e}"));
            return Err(e.into());
        }
        Ok(())
    }
}

// =============================================================================
// Receive Loop
// =============================================================================

/// Reads from the transport until a terminal failure, splitting buffers into
/// `0x1E`-delimited frames and delivering each to the message callback.
///
/// The loop holds only a weak back-reference to the connection: dropping the
/// last connection handle closes the transport, which unblocks the pending
/// receive and lets the loop unwind without keeping the connection alive.
async fn run_receive_loop(
    inner: Weak<Inner>,
    transport: Arc<dyn Transport>,
    on_message: Option<MessageCallback>,
    handshake_tx: oneshot::Sender<()>,
    logger: Logger,
) {
    let mut handshake_tx = Some(handshake_tx);
    let mut buffer = String::new();

    loop {
        let chunk = match transport.receive().await {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Receive loop terminating");
                break;
            }
        };

        buffer.push_str(&chunk);
        while let Some(pos) = buffer.find(RECORD_SEPARATOR) {
            let frame = buffer[..pos].to_string();
            buffer.replace_range(..=pos, "");
            handle_frame(&logger, &mut handshake_tx, &on_message, &frame);
        }
    }

    if let Some(inner) = inner.upgrade() {
        handle_loop_termination(&inner).await;
    }
}

/// Delivers one complete frame: the first frame equal to `{}` (modulo
/// whitespace) resolves the start handshake and is then delivered to the
/// callback like any other frame.
fn handle_frame(
    logger: &Logger,
    handshake_tx: &mut Option<oneshot::Sender<()>>,
    on_message: &Option<MessageCallback>,
    frame: &str,
) {
    if handshake_tx.is_some() && is_handshake_frame(frame) {
        if let Some(tx) = handshake_tx.take() {
            let _ = tx.send(());
        }
    }

    logger.log(TraceLevel::Messages, &format!("processing message: {frame}"));

    if let Some(callback) = on_message {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(frame))) {
            match panic_message(payload.as_ref()) {
                Some(message) => logger.log(
                    TraceLevel::Errors,
                    &format!("message_received callback threw an exception: {message}"),
                ),
                None => logger.log(
                    TraceLevel::Errors,
                    "message_received callback threw an unknown exception",
                ),
            }
        }
    }
}

fn is_handshake_frame(frame: &str) -> bool {
    let stripped: String = frame.chars().filter(|c| !c.is_whitespace()).collect();
    stripped == "{}"
}

/// Disconnect path driven by the loop itself: a terminal receive failure
/// while connected closes the transport and completes the transition to
/// `disconnected`. During a stop or a failed start the owning caller does
/// the teardown and the loop just unwinds.
async fn handle_loop_termination(inner: &Arc<Inner>) {
    let transport = {
        let mut guarded = inner.guarded.lock();
        if guarded.state != ConnectionState::Connected {
            return;
        }
        guarded.change_state(&inner.logger, ConnectionState::Disconnecting);
        guarded.receive_handle = None;
        guarded.transport.take()
    };
    if let Some(transport) = transport {
        let _ = transport.close().await;
    }

    let on_disconnected = {
        let mut guarded = inner.guarded.lock();
        guarded.change_state(&inner.logger, ConnectionState::Disconnected);
        guarded.on_disconnected.clone()
    };
    if let Some(callback) = on_disconnected {
        invoke_disconnected(&inner.logger, &callback);
    }
}

fn invoke_disconnected(logger: &Logger, callback: &DisconnectedCallback) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        match panic_message(payload.as_ref()) {
            Some(message) => logger.log(
                TraceLevel::Errors,
                &format!("disconnected callback threw an exception: {message}"),
            ),
            None => logger.log(
                TraceLevel::Errors,
                "disconnected callback threw an unknown exception",
            ),
        }
    }
}

/// Extracts the message from a panic payload, when it carries one.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

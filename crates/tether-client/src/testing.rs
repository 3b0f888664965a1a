//! Scripted test doubles for the HTTP and transport seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use tether_core::{
    ClientConfig, ClientError, ClientResult, HttpClient, Transport, TransportError,
    TransportFactory, TransportResult,
};

/// A canonical negotiate body advertising WebSockets.
pub(crate) fn negotiate_body(connection_id: &str) -> String {
    format!(
        r#"{{"connectionId":"{connection_id}","availableTransports":[{{"transport":"WebSockets","transferFormats":["Text","Binary"]}}]}}"#
    )
}

// =============================================================================
// Mock HTTP Client
// =============================================================================

/// One recorded negotiate request.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// [`HttpClient`] returning scripted responses in order.
pub(crate) struct MockHttpClient {
    responses: Mutex<VecDeque<ClientResult<String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn enqueue(&self, body: impl Into<String>) {
        self.responses.lock().push_back(Ok(body.into()));
    }

    pub fn enqueue_error(&self, error: ClientError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post(&self, url: &str, config: &ClientConfig) -> ClientResult<String> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            headers: config.http_headers.clone(),
        });
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(ClientError::Web {
                status: 500,
                reason: "no scripted response".to_string(),
            })
        })
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

/// How a scripted transport behaves when asked to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectBehavior {
    /// Connect succeeds immediately.
    Succeed,
    /// Connect succeeds and the handshake acknowledgement `{}\x1E` is
    /// queued as the first inbound buffer.
    SucceedWithHandshake,
    /// Connect fails with a connection error.
    Fail,
    /// Connect never resolves (until the future is dropped by a cancel).
    Pending,
}

/// [`Transport`] driven entirely by the test.
pub(crate) struct MockTransport {
    behavior: ConnectBehavior,
    connect_urls: Mutex<Vec<String>>,
    connect_headers: Mutex<Vec<HashMap<String, String>>>,
    sent: Mutex<Vec<String>>,
    close_count: Mutex<u32>,
    close_delay: Mutex<Option<std::time::Duration>>,
    fail_sends: Mutex<bool>,
    incoming_tx: Mutex<Option<mpsc::UnboundedSender<TransportResult<String>>>>,
    incoming_rx: AsyncMutex<mpsc::UnboundedReceiver<TransportResult<String>>>,
}

impl MockTransport {
    pub fn new(behavior: ConnectBehavior) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            behavior,
            connect_urls: Mutex::new(Vec::new()),
            connect_headers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            close_count: Mutex::new(0),
            close_delay: Mutex::new(None),
            fail_sends: Mutex::new(false),
            incoming_tx: Mutex::new(Some(tx)),
            incoming_rx: AsyncMutex::new(rx),
        })
    }

    /// Queues an inbound buffer, as if the peer had produced it.
    pub fn push_incoming(&self, buffer: impl Into<String>) {
        if let Some(tx) = self.incoming_tx.lock().as_ref() {
            let _ = tx.send(Ok(buffer.into()));
        }
    }

    /// Queues a terminal receive failure.
    pub fn fail_receive(&self, error: TransportError) {
        if let Some(tx) = self.incoming_tx.lock().as_ref() {
            let _ = tx.send(Err(error));
        }
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.connect_urls.lock().clone()
    }

    pub fn connect_headers(&self) -> Vec<HashMap<String, String>> {
        self.connect_headers.lock().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn close_count(&self) -> u32 {
        *self.close_count.lock()
    }

    /// Makes [`close`](Transport::close) linger, keeping a stop observably
    /// in the disconnecting state.
    pub fn set_close_delay(&self, delay: std::time::Duration) {
        *self.close_delay.lock() = Some(delay);
    }

    /// Makes subsequent sends fail while receives keep working.
    pub fn set_fail_sends(&self) {
        *self.fail_sends.lock() = true;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str, config: &ClientConfig) -> TransportResult<()> {
        self.connect_urls.lock().push(url.to_string());
        self.connect_headers.lock().push(config.http_headers.clone());
        match self.behavior {
            ConnectBehavior::Succeed => Ok(()),
            ConnectBehavior::SucceedWithHandshake => {
                self.push_incoming("{}\u{1e}");
                Ok(())
            }
            ConnectBehavior::Fail => Err(TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }),
            ConnectBehavior::Pending => std::future::pending().await,
        }
    }

    async fn send(&self, message: &str) -> TransportResult<()> {
        if *self.fail_sends.lock() || self.incoming_tx.lock().is_none() {
            return Err(TransportError::SendFailed("transport closed".to_string()));
        }
        self.sent.lock().push(message.to_string());
        Ok(())
    }

    async fn receive(&self) -> TransportResult<String> {
        match self.incoming_rx.lock().await.recv().await {
            Some(result) => result,
            None => Err(TransportError::Closed {
                reason: "transport closed".to_string(),
            }),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        let delay = *self.close_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.close_count.lock() += 1;
        // Dropping the sender unblocks any pending receive with a terminal
        // failure, mirroring the real transport's close handshake.
        self.incoming_tx.lock().take();
        Ok(())
    }
}

/// [`TransportFactory`] creating a fresh [`MockTransport`] per start
/// attempt, each with the same scripted behavior. Every transport handed out
/// is retained for inspection.
pub(crate) struct MockTransportFactory {
    behavior: ConnectBehavior,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new(behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Arc<dyn Transport> {
        let transport = MockTransport::new(self.behavior);
        self.created.lock().push(transport.clone());
        transport
    }
}

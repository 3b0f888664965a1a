//! WebSocket transport implementation backed by tokio-tungstenite.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, trace};

use tether_core::{
    ClientConfig, Transport, TransportError, TransportFactory, TransportResult,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Builds the upgrade request for `url`, applying the configured headers.
fn build_upgrade_request(url: &str, config: &ClientConfig) -> TransportResult<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: format!("invalid WebSocket URL: {e}"),
        })?;

    for (name, value) in &config.http_headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: format!("invalid header name '{name}': {e}"),
            })?;
        let value = HeaderValue::from_str(value).map_err(|e| TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: format!("invalid header value: {e}"),
        })?;
        request.headers_mut().insert(name, value);
    }

    Ok(request)
}

/// [`Transport`] implementation over a tokio-tungstenite WebSocket.
///
/// The sink and stream halves live behind separate locks so sends and
/// receives proceed in parallel. Only the connection's receive loop calls
/// [`receive`](Transport::receive); pings are answered inline from there.
pub struct WebSocketTransport {
    sink: Mutex<Option<WsSink>>,
    stream: Mutex<Option<WsSource>>,
}

impl WebSocketTransport {
    /// Creates an unconnected transport.
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            stream: Mutex::new(None),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str, config: &ClientConfig) -> TransportResult<()> {
        let request = build_upgrade_request(url, config)?;

        info!(url = %url, "Connecting to WebSocket server");

        let (ws_stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.to_string(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        let (ws_tx, ws_rx) = ws_stream.split();

        *self.sink.lock().await = Some(ws_tx);
        *self.stream.lock().await = Some(ws_rx);
        Ok(())
    }

    async fn send(&self, message: &str) -> TransportResult<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or_else(|| TransportError::Closed {
            reason: "transport is not connected".to_string(),
        })?;
        sink.send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&self) -> TransportResult<String> {
        let mut stream = self.stream.lock().await;
        let stream = stream.as_mut().ok_or_else(|| TransportError::Closed {
            reason: "transport is not connected".to_string(),
        })?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Received text message");
                    return Ok(text.to_string());
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "Received binary message");
                    return Ok(String::from_utf8_lossy(&data).to_string());
                }
                Some(Ok(Message::Ping(payload))) => {
                    trace!("Received ping, sending pong");
                    let mut sink = self.sink.lock().await;
                    if let Some(sink) = sink.as_mut() {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    trace!("Received pong");
                }
                Some(Ok(Message::Close(_))) | Some(Ok(Message::Frame(_))) => {
                    info!("Server closed the connection");
                    return Err(TransportError::Closed {
                        reason: "server closed the connection".to_string(),
                    });
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    return Err(TransportError::Closed {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            info!("Closing WebSocket connection");
            // The peer answers the close frame, which terminates the stream
            // half and unblocks any pending receive.
            let _ = sink.close().await;
        }
        Ok(())
    }
}

/// Factory producing a fresh [`WebSocketTransport`] per start attempt.
#[derive(Debug, Default)]
pub struct WebSocketTransportFactory;

impl WebSocketTransportFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self) -> Arc<dyn Transport> {
        Arc::new(WebSocketTransport::new())
    }
}

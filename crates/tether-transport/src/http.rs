//! HTTP sender implementation backed by reqwest.

use async_trait::async_trait;
use reqwest::ClientBuilder;
use tracing::debug;

use tether_core::{ClientConfig, ClientError, ClientResult, HttpClient, TransportError};

/// [`HttpClient`] implementation over a shared [`reqwest::Client`].
///
/// HTTP-level redirects are disabled: the negotiate sub-protocol carries its
/// redirects inside the response payload, and a 3xx from the server must
/// surface as a [`ClientError::Web`] rather than being followed silently.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client with redirect following disabled.
    pub fn new() -> ClientResult<Self> {
        let client = ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                ClientError::Transport(TransportError::ConnectionFailed {
                    url: String::new(),
                    reason: format!("failed to build HTTP client: {e}"),
                })
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(&self, url: &str, config: &ClientConfig) -> ClientResult<String> {
        let mut request = self
            .client
            .post(url)
            .timeout(config.http_request_timeout);
        for (name, value) in &config.http_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(url = %url, "Issuing negotiate POST");

        let response = request.send().await.map_err(|e| {
            ClientError::Transport(TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: format!("HTTP request failed: {e}"),
            })
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Web {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        response.text().await.map_err(|e| {
            ClientError::Transport(TransportError::ReceiveFailed(format!(
                "failed to read response body: {e}"
            )))
        })
    }
}

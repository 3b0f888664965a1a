//! The negotiate sub-protocol.
//!
//! Negotiation assigns a connection id and advertises the transports the
//! server supports. A response may instead redirect the client to another
//! server, optionally with a bearer token scoped to that redirect; the chain
//! is bounded so two servers pointing at each other cannot loop forever.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use tether_core::{ClientConfig, ClientError, ClientResult, HttpClient};

use crate::url_builder;

/// Upper bound on application-level negotiate redirects.
const REDIRECT_LIMIT: u32 = 100;

/// The only transport this client can use.
const WEBSOCKETS_TRANSPORT: &str = "WebSockets";

const LEGACY_SERVER_ERROR: &str = "Detected a connection attempt to an ASP.NET SignalR Server. \
     This client only supports connecting to an ASP.NET Core SignalR Server.";

const NO_WEBSOCKETS_ERROR: &str = "The server does not support WebSockets which is currently \
     the only transport supported by this client.";

// =============================================================================
// Protocol Model
// =============================================================================

/// One entry of the server's `availableTransports` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name, e.g. `WebSockets`.
    pub transport: String,
    /// Transfer formats the transport supports, e.g. `Text`, `Binary`.
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// The negotiate response body. All fields are optional on the wire; which
/// combination is present decides how the response is interpreted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    connection_id: Option<String>,
    available_transports: Option<Vec<AvailableTransport>>,
    url: Option<String>,
    access_token: Option<String>,
    error: Option<String>,
    /// Legacy ASP.NET SignalR servers advertise this field; its presence
    /// alone (any value) means the server speaks the wrong protocol.
    #[serde(rename = "ProtocolVersion")]
    protocol_version: Option<Value>,
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationResult {
    /// The URL the transport connects to (the final redirect target).
    pub url: Url,
    /// Server-assigned connection id.
    pub connection_id: String,
    /// Transports advertised by the server.
    pub transports: Vec<AvailableTransport>,
    /// Effective config for the connect step. Carries the bearer header when
    /// the final redirect supplied an access token; otherwise equals the
    /// caller's config.
    pub config: ClientConfig,
}

// =============================================================================
// Negotiation Engine
// =============================================================================

/// Drives the negotiate sub-protocol from `base_url`, following redirects.
///
/// A redirect-supplied `accessToken` is injected as an `Authorization`
/// header into a per-iteration clone of `config`; the caller's config is
/// never mutated, and the token applies only to the immediately following
/// negotiate request and the subsequent connect.
pub(crate) async fn negotiate(
    http: &dyn HttpClient,
    base_url: &Url,
    config: &ClientConfig,
) -> ClientResult<NegotiationResult> {
    let mut current_url = base_url.clone();
    let mut current_config = config.clone();
    let mut remaining_redirects = REDIRECT_LIMIT;

    loop {
        let negotiate_url = url_builder::negotiate_url(&current_url);
        debug!(url = %negotiate_url, "Sending negotiate request");

        let body = http.post(negotiate_url.as_str(), &current_config).await?;
        let response: NegotiateResponse = serde_json::from_str(&body)
            .map_err(|_| ClientError::Protocol("Could not parse negotiate response.".to_string()))?;

        // Checked before anything else: a legacy server may also send a
        // connection id and transport list, and must still be refused.
        if response.protocol_version.is_some() {
            return Err(ClientError::Protocol(LEGACY_SERVER_ERROR.to_string()));
        }

        if let Some(error) = response.error {
            return Err(ClientError::Protocol(error));
        }

        if let Some(target) = response.url {
            if remaining_redirects == 0 {
                return Err(ClientError::Protocol(
                    "Negotiate redirection limit exceeded.".to_string(),
                ));
            }
            remaining_redirects -= 1;

            // Redirect quarantine: start from the caller's config each
            // iteration so a token never outlives its redirect scope.
            current_config = config.clone();
            if let Some(token) = response.access_token {
                current_config
                    .http_headers
                    .insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            current_url = url_builder::redirect_url(&current_url, &target)?;
            debug!(url = %current_url, "Negotiate redirected");
            continue;
        }

        let connection_id = response.connection_id.ok_or_else(|| {
            ClientError::Protocol("negotiate response is missing the connectionId field.".to_string())
        })?;
        let transports = response.available_transports.unwrap_or_default();
        if !transports
            .iter()
            .any(|t| t.transport == WEBSOCKETS_TRANSPORT)
        {
            return Err(ClientError::Protocol(NO_WEBSOCKETS_ERROR.to_string()));
        }

        debug!(connection_id = %connection_id, url = %current_url, "Negotiation complete");
        return Ok(NegotiationResult {
            url: current_url,
            connection_id,
            transports,
            config: current_config,
        });
    }
}

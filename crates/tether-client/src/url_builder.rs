//! Negotiate and connect URL construction.
//!
//! The negotiate endpoint lives at `<base>/negotiate` with the base query
//! preserved. The connect URL appends `id=<connection id>` to whatever query
//! the negotiated URL carries and maps the scheme onto the WebSocket one.
//! Redirect targets replace the base URL wholesale, query included; the
//! original user query is not carried into redirected requests.

use url::Url;

use tether_core::{ClientError, ClientResult};

/// Parses a user-supplied base URL.
pub(crate) fn parse_base(url: &str) -> ClientResult<Url> {
    Url::parse(url).map_err(|e| ClientError::Protocol(format!("invalid base URL '{url}': {e}")))
}

/// Appends `/negotiate` to the path, preserving the query string.
pub(crate) fn negotiate_url(base: &Url) -> Url {
    let mut url = base.clone();
    let path = format!("{}/negotiate", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

/// Builds the WebSocket connect URL: scheme mapped `http -> ws` /
/// `https -> wss`, with `id=<connection id>` appended to the query.
pub(crate) fn connect_url(negotiated: &Url, connection_id: &str) -> ClientResult<Url> {
    let mut url = negotiated.clone();
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|()| ClientError::Protocol(format!("cannot map scheme of '{negotiated}'")))?;

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&id={connection_id}"),
        _ => format!("id={connection_id}"),
    };
    url.set_query(Some(&query));
    Ok(url)
}

/// Resolves a negotiate redirect target against the current URL.
///
/// Absolute targets replace the current URL entirely, including the query.
pub(crate) fn redirect_url(current: &Url, target: &str) -> ClientResult<Url> {
    current
        .join(target)
        .map_err(|e| ClientError::Protocol(format!("invalid redirect URL '{target}': {e}")))
}

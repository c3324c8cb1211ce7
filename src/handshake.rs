//! RFC 6455 opening handshake, both directions (spec §4.D).
//!
//! Server: `accept_async` reads the HTTP upgrade request, validates the
//! mandatory headers, negotiates a protocol template from the registry,
//! and writes the `101 Switching Protocols` response.
//!
//! Client: `connect_async` writes the upgrade request and validates the
//! server's response, including the `Sec-WebSocket-Accept` value.

use crate::error::Error;
use crate::http::{self, HttpRequest};
use crate::protocol::registry::ProtocolRegistry;
use crate::protocol::Protocol;
use crate::utils;
use base64::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct Accepted<S> {
    pub stream: S,
    pub path: String,
    pub protocol: Protocol,
}

pub async fn accept_async<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    registry: &ProtocolRegistry,
) -> Result<Accepted<S>, Error> {
    let request = http::read_request(&mut stream).await?;

    if !request.method.eq_ignore_ascii_case("GET") {
        return Err(Error::InvalidHTTPHandshake);
    }

    let connection_hdr =
        http::header(&request.headers, "connection").ok_or(Error::NoConnectionHeaderPresent)?;
    if !connection_hdr.to_ascii_lowercase().contains("upgrade") {
        return Err(Error::NoConnectionHeaderPresent);
    }

    let upgrade_hdr = http::header(&request.headers, "upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
    if !upgrade_hdr.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }

    let version = http::header(&request.headers, "sec-websocket-version")
        .ok_or(Error::UnsupportedVersion)?;
    if version.trim().parse::<u32>().unwrap_or(0) < 13 {
        return Err(Error::UnsupportedVersion);
    }

    let key = http::header(&request.headers, "sec-websocket-key")
        .ok_or(Error::NoSecWebsocketKey)?
        .to_string();
    let decoded = BASE64_STANDARD
        .decode(&key)
        .map_err(|_| Error::InvalidSecWebsocketKey)?;
    if decoded.len() != 16 {
        return Err(Error::InvalidSecWebsocketKey);
    }

    let protocol = negotiate_protocol(registry, &request).await?;

    let accept = utils::accept_value(&key);
    let mut response = String::with_capacity(192);
    response.push_str("HTTP/1.1 101 Switching Protocols\r\n");
    response.push_str("Upgrade: websocket\r\n");
    response.push_str("Connection: Upgrade\r\n");
    response.push_str(&format!("Sec-WebSocket-Accept: {accept}\r\n"));
    response.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocol.name));
    response.push_str("\r\n");

    http::write_raw(&mut stream, response.as_bytes()).await?;

    Ok(Accepted {
        stream,
        path: request.path.clone(),
        protocol,
    })
}

/// A comma-separated `Sec-WebSocket-Protocol` request header is tried
/// name-by-name against the registry first; absent that header (or no
/// match), we fall back to whatever template is bound to the request path
/// (spec §4.D, §4.C).
async fn negotiate_protocol(
    registry: &ProtocolRegistry,
    request: &HttpRequest,
) -> Result<Protocol, Error> {
    if let Some(requested) = http::header(&request.headers, "sec-websocket-protocol") {
        for name in requested.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if let Some(protocol) = registry.clone_by_name(name, &request.path).await {
                return Ok(protocol);
            }
        }
    }

    registry
        .clone_by_uri(&request.path)
        .await
        .ok_or(Error::NoMatchingProtocol)
}

pub struct Handshake<S> {
    pub stream: S,
    pub negotiated_protocol: Option<String>,
}

pub async fn connect_async<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    url: &url::Url,
    protocols: &[&str],
) -> Result<Handshake<S>, Error> {
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(Error::InvalidSchemeURL);
    }
    let host = url.host_str().ok_or(Error::URLNoHost)?;
    let path = if url.path().is_empty() { "/" } else { url.path() };
    let key = utils::generate_websocket_key();

    let mut request = String::with_capacity(256);
    request.push_str(&format!("GET {path} HTTP/1.1\r\n"));
    request.push_str(&format!("Host: {host}\r\n"));
    request.push_str("Upgrade: websocket\r\n");
    request.push_str("Connection: Upgrade\r\n");
    request.push_str(&format!("Sec-WebSocket-Key: {key}\r\n"));
    request.push_str("Sec-WebSocket-Version: 13\r\n");
    if !protocols.is_empty() {
        request.push_str(&format!("Sec-WebSocket-Protocol: {}\r\n", protocols.join(", ")));
    }
    request.push_str("\r\n");

    http::write_raw(&mut stream, request.as_bytes()).await?;

    let response = http::read_response(&mut stream).await?;
    if response.status != 101 {
        return Err(Error::NoUpgrade);
    }
    let connection_hdr =
        http::header(&response.headers, "connection").ok_or(Error::NoConnectionHeaderPresent)?;
    if !connection_hdr.to_ascii_lowercase().contains("upgrade") {
        return Err(Error::NoConnectionHeaderPresent);
    }
    let upgrade_hdr =
        http::header(&response.headers, "upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
    if !upgrade_hdr.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgradeHeaderPresent);
    }
    let accept =
        http::header(&response.headers, "sec-websocket-accept").ok_or(Error::InvalidAcceptKey)?;
    if accept != utils::accept_value(&key) {
        return Err(Error::InvalidAcceptKey);
    }

    let negotiated_protocol = http::header(&response.headers, "sec-websocket-protocol")
        .map(|s| s.to_string());
    if let Some(name) = &negotiated_protocol {
        if !protocols.iter().any(|offered| offered == name) {
            return Err(Error::UnexpectedSubprotocol);
        }
    }

    Ok(Handshake {
        stream,
        negotiated_protocol,
    })
}

//! Minimal HTTP/1.1 request/response parsing, shared by the server-side
//! handshake acceptor and the client-side handshake reader (spec §4.D).
//! Parsing itself is delegated to `httparse`; this module only owns the
//! "keep reading until the header block is complete" loop and header
//! lookup helpers.

use crate::error::Error;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

fn headers_to_map(headers: &[httparse::Header]) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(headers.len());
    for header in headers {
        map.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).trim().to_string(),
        );
    }
    map
}

/// Case-insensitive header lookup against an already-lowercased map.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
}

/// Reads raw bytes off `reader` one chunk at a time until `httparse` can
/// parse a complete request, or `MAX_HEADER_BYTES` is exceeded.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<HttpRequest, Error> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut raw_headers);
        match parsed.parse(&buf)? {
            httparse::Status::Complete(_) => {
                let method = parsed.method.unwrap_or_default().to_string();
                let path = parsed.path.unwrap_or_default().to_string();
                let headers = headers_to_map(parsed.headers);
                return Ok(HttpRequest {
                    method,
                    path,
                    headers,
                });
            }
            httparse::Status::Partial => {
                if buf.len() >= MAX_HEADER_BYTES {
                    return Err(Error::IncompleteHTTPMessage);
                }
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::IncompleteHTTPMessage);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<HttpResponse, Error> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut raw_headers);
        match parsed.parse(&buf)? {
            httparse::Status::Complete(_) => {
                let status = parsed.code.unwrap_or(0);
                let headers = headers_to_map(parsed.headers);
                return Ok(HttpResponse { status, headers });
            }
            httparse::Status::Partial => {
                if buf.len() >= MAX_HEADER_BYTES {
                    return Err(Error::IncompleteHTTPMessage);
                }
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::IncompleteHTTPMessage);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

pub async fn write_raw<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), Error> {
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn reads_request_split_across_chunks() {
        let (mut client, mut server) = duplex(1024);
        let request = b"GET /chat HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\n\r\n";
        tokio::spawn(async move {
            for byte in request {
                client.write_all(&[*byte]).await.unwrap();
            }
        });

        let parsed = read_request(&mut server).await.unwrap();
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.path, "/chat");
        assert_eq!(header(&parsed.headers, "host"), Some("example.com"));
        assert_eq!(header(&parsed.headers, "UPGRADE"), Some("websocket"));
    }

    #[tokio::test]
    async fn reads_response() {
        let (mut client, mut server) = duplex(1024);
        let response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";
        tokio::spawn(async move {
            client.write_all(response).await.unwrap();
        });

        let parsed = read_response(&mut server).await.unwrap();
        assert_eq!(parsed.status, 101);
        assert_eq!(header(&parsed.headers, "upgrade"), Some("websocket"));
    }
}

//! The client driver (spec §4.G): performs the handshake, then exposes a
//! blocking `request()` call built on the same callback arbitrator the
//! server side uses, plus an `on_push` callback for unsolicited frames.

use crate::config::ConnectionConfig;
use crate::connection::{Connection, NotifyMode, PushHandler};
use crate::context::{RequestContext, ResponseContext};
use crate::error::Error;
use crate::handshake;
use crate::protocol::Protocol;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

type ClientConnection = Connection<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

pub struct Client {
    connection: Arc<ClientConnection>,
}

impl Client {
    /// Connects to `url` (a `ws://host:port/path` string), negotiates one
    /// of `protocols` against the server, and starts the background
    /// connection engine.
    pub async fn connect(
        url: &str,
        protocols: &[&str],
        local_protocol: Protocol,
        config: ConnectionConfig,
        push_handler: Option<Box<PushHandler>>,
    ) -> Result<Self, Error> {
        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
        let port = parsed.port_or_known_default().unwrap_or(80);

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let handshaken = handshake::connect_async(stream, &parsed, protocols).await?;
        let (reader, writer) = tokio::io::split(handshaken.stream);

        let mut connection = Connection::new(reader, writer, config, local_protocol);
        if let Some(handler) = push_handler {
            connection = connection.with_push_handler(handler);
        }
        let connection = Arc::new(connection);

        let background = Arc::clone(&connection);
        tokio::spawn(async move {
            if let Err(err) = background.run().await {
                log::warn!("client connection engine stopped: {err}");
            }
        });

        Ok(Client { connection })
    }

    /// Sends `request` and blocks until the server's answer arrives (spec
    /// §4.G `request`). A close observed mid-call is translated from the
    /// internal `WEBSOCKET_CLOSED` sentinel to a plain HTTP 404 here, at the
    /// caller boundary (spec §6/§9).
    pub async fn request(&self, request: RequestContext) -> Result<ResponseContext, Error> {
        let mut response = self
            .connection
            .notify_callback(request, NotifyMode::BlockWithAnswer)
            .await?
            .ok_or(Error::WebSocketClosed)?;
        response.status = response.status.as_http();
        Ok(response)
    }

    /// Sends `request` without waiting for (or caring about) an answer.
    pub async fn request_no_answer(&self, mut request: RequestContext) -> Result<(), Error> {
        request.no_answer = true;
        self.connection
            .notify_callback(request, NotifyMode::NonBlockWithoutAnswer)
            .await
            .map(|_| ())
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.connection.close().await
    }
}

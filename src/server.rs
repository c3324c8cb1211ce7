//! The server side of a synopse-ws deployment (spec §4.E/§4.F): accepts
//! TCP connections, performs the handshake, and drives one connection
//! engine per accepted socket.

use crate::config::ConnectionConfig;
use crate::connection::{Connection, NotifyMode, RequestHandler};
use crate::context::{RequestContext, ResponseContext};
use crate::error::Error;
use crate::handshake;
use crate::protocol::registry::ProtocolRegistry;
use crate::protocol::Protocol;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use uuid::Uuid;

type ServerConnection = Connection<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

/// A handle to one accepted connection, stable for the connection's
/// lifetime, handed to the application so it can target a later push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionRef(Uuid);

/// The application-supplied request handler type (spec §4.E: the engine
/// calls back into user code for each inbound REST request).
pub type Handler =
    dyn Fn(RequestContext) -> Pin<Box<dyn Future<Output = ResponseContext> + Send>> + Send + Sync;

pub struct Server {
    registry: Arc<ProtocolRegistry>,
    config: ConnectionConfig,
    connections: Mutex<HashMap<Uuid, Arc<ServerConnection>>>,
}

impl Server {
    pub fn new(config: ConnectionConfig) -> Self {
        Server {
            registry: Arc::new(ProtocolRegistry::new()),
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, protocol: Protocol) -> Result<(), Error> {
        self.registry.add(protocol).await
    }

    /// Binds `addr` and accepts connections forever, spawning one task per
    /// connection. `handler` answers inbound REST requests; it is cloned
    /// (via `Arc`) into every connection.
    pub async fn start(
        self: &Arc<Self>,
        addr: impl ToSocketAddrs,
        handler: Arc<Handler>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            log::debug!("accepted connection from {peer}");
            let server = Arc::clone(self);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(err) = server.handle_connection(stream, handler).await {
                    log::warn!("connection from {peer} ended: {err}");
                }
            });
        }
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        handler: Arc<Handler>,
    ) -> Result<(), Error> {
        let accepted = handshake::accept_async(stream, &self.registry).await?;
        let (reader, writer) = tokio::io::split(accepted.stream);

        let boxed_handler: Box<RequestHandler> = Box::new(move |req| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { (handler.as_ref())(req).await })
        });

        let connection = Arc::new(
            Connection::new(reader, writer, self.config.clone(), accepted.protocol)
                .with_request_handler(boxed_handler),
        );

        let id = Uuid::new_v4();
        self.connections.lock().await.insert(id, Arc::clone(&connection));
        let result = connection.run().await;
        self.connections.lock().await.remove(&id);
        result?;
        Ok(())
    }

    /// Snapshot of currently-live connections, for targeting `push`.
    pub async fn connection_refs(&self) -> Vec<ConnectionRef> {
        self.connections.lock().await.keys().copied().map(ConnectionRef).collect()
    }

    /// Sends a server-initiated REST call to a specific connection (spec
    /// §4.F/§4.G: either peer may initiate a call). Returns `NOT_FOUND`
    /// (as a `StatusCode`, via `Error::NotFound`) if the connection is gone
    /// or `L` couldn't be acquired in time. A close observed mid-call is
    /// translated from the internal `WEBSOCKET_CLOSED` sentinel to a plain
    /// HTTP 404 here, at the caller boundary (spec §6/§9).
    pub async fn push(
        &self,
        connection: ConnectionRef,
        request: RequestContext,
        mode: NotifyMode,
    ) -> Result<Option<ResponseContext>, Error> {
        let target = self
            .connections
            .lock()
            .await
            .get(&connection.0)
            .cloned()
            .ok_or(Error::NotFound)?;
        Ok(target
            .notify_callback(request, mode)
            .await?
            .map(|mut response| {
                response.status = response.status.as_http();
                response
            }))
    }
}

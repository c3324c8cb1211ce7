use log::*;
use std::net::SocketAddr;
use std::sync::Arc;
use synopse_ws::config::{ConnectionConfig, WebSocketConfig};
use synopse_ws::context::{ResponseContext, StatusCode};
use synopse_ws::{Protocol, ProtocolKind, Server};

#[tokio::main]
async fn main() {
    env_logger::init();

    let server = Arc::new(Server::new(ConnectionConfig::server(WebSocketConfig::default())));
    server
        .register(Protocol::new("echo", "/echo", ProtocolKind::RestJson))
        .await
        .expect("registering the echo protocol");

    let addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();
    info!("listening on {addr}");

    server
        .start(
            addr,
            Arc::new(|req| {
                Box::pin(async move {
                    ResponseContext::new(StatusCode::OK).with_body(req.content_type, req.body)
                })
            }),
        )
        .await
        .expect("server loop exited");
}

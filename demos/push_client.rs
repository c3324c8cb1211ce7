use log::*;
use synopse_ws::config::{ConnectionConfig, WebSocketConfig};
use synopse_ws::context::RequestContext;
use synopse_ws::{Client, Protocol, ProtocolKind};

#[tokio::main]
async fn main() {
    env_logger::init();

    let push_handler: Box<dyn Fn(RequestContext) + Send + Sync> = Box::new(|req| {
        info!("received a server push: {} {}", req.method, req.url);
    });

    let client = Client::connect(
        "ws://127.0.0.1:9002/echo",
        &["echo"],
        Protocol::new("echo", "/echo", ProtocolKind::RestJson),
        ConnectionConfig::client(WebSocketConfig::default()),
        Some(push_handler),
    )
    .await
    .expect("connecting to the echo server");

    let request = RequestContext::new("GET", "/echo").with_body("text/plain", b"hello".to_vec());
    let response = client.request(request).await.expect("request failed");
    info!(
        "got answer: status={} body={:?}",
        response.status.text(),
        String::from_utf8_lossy(&response.body)
    );

    client.close().await.expect("closing connection");
}

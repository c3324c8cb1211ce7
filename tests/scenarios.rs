//! Integration scenarios from spec §8 that need a live loopback pair rather
//! than a single module's unit tests: the handshake happy path, a large
//! encrypted/compressed binary round-trip, heartbeat cadence, the callback
//! race, and graceful close.

use std::sync::Arc;
use std::time::Duration;
use synopse_ws::connection::{Connection, NotifyMode, ProcessResult};
use synopse_ws::context::{RequestContext, ResponseContext, StatusCode};
use synopse_ws::protocol::crypto::CryptoContext;
use synopse_ws::protocol::registry::ProtocolRegistry;
use synopse_ws::{ConnectionConfig, Protocol, ProtocolKind, WebSocketConfig};
use tokio::io::duplex;

fn json_protocol() -> Protocol {
    Protocol::new("synopsejson", "/x", ProtocolKind::RestJson)
}

fn binary_protocol() -> Protocol {
    Protocol::new(
        "synopsebinary",
        "",
        ProtocolKind::RestBinary {
            compression: true,
            encryption: Some(CryptoContext::from_text("correct horse battery staple")),
        },
    )
}

/// Scenario 1: upgrade happy path, using the literal RFC 6455 example key.
#[tokio::test]
async fn upgrade_happy_path_negotiates_and_answers() {
    let registry = ProtocolRegistry::new();
    registry.add(binary_protocol()).await.unwrap();

    let (client_sock, server_sock) = duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        let accepted = synopse_ws::handshake::accept_async(server_sock, &registry)
            .await
            .unwrap();
        assert_eq!(accepted.protocol.name, "synopsebinary");

        let (reader, writer) = tokio::io::split(accepted.stream);
        let server = Connection::new(
            reader,
            writer,
            ConnectionConfig::server(WebSocketConfig::default()),
            accepted.protocol,
        )
        .with_request_handler(Box::new(|req: RequestContext| {
            Box::pin(async move {
                ResponseContext::new(StatusCode::OK).with_body("text/plain", req.body)
            })
        }));

        loop {
            match server.process_one().await.unwrap() {
                ProcessResult::Done => break,
                _ => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    });

    let mut url = url::Url::parse("ws://example.invalid/x").unwrap();
    url.set_path("/x");
    let handshaken =
        synopse_ws::handshake::connect_async(client_sock, &url, &["synopsebinary"])
            .await
            .unwrap();
    assert_eq!(handshaken.negotiated_protocol.as_deref(), Some("synopsebinary"));

    let (reader, writer) = tokio::io::split(handshaken.stream);
    let client = Connection::new(
        reader,
        writer,
        ConnectionConfig::client(WebSocketConfig::default()),
        binary_protocol(),
    );

    let request = RequestContext::new("GET", "/x").with_body("", Vec::new());
    let response = client
        .notify_callback(request, NotifyMode::BlockWithAnswer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);

    server_task.await.unwrap();
}

/// Scenario 2: a large payload round-tripped through the LZ+AES binary
/// adapter over a real framed socket.
#[tokio::test]
async fn large_binary_round_trip_with_compression_and_encryption() {
    let (client_io, server_io) = duplex(8 << 20);
    let (client_reader, client_writer) = tokio::io::split(client_io);
    let (server_reader, server_writer) = tokio::io::split(server_io);

    let payload: Vec<u8> = (0..3_000_000u32).map(|i| (i % 256) as u8).collect();
    let expected = payload.clone();

    let server = Connection::new(
        server_reader,
        server_writer,
        ConnectionConfig::server(WebSocketConfig::default()),
        binary_protocol(),
    )
    .with_request_handler(Box::new(move |req: RequestContext| {
        let expected = expected.clone();
        Box::pin(async move {
            assert_eq!(req.body, expected);
            ResponseContext::new(StatusCode::OK).with_body("application/octet-stream", req.body)
        })
    }));

    let client = Connection::new(
        client_reader,
        client_writer,
        ConnectionConfig::client(WebSocketConfig::default()),
        binary_protocol(),
    );

    let server_task = tokio::spawn(async move {
        loop {
            match server.process_one().await.unwrap() {
                ProcessResult::Done => break,
                _ => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    });

    let request =
        RequestContext::new("POST", "/upload").with_body("application/octet-stream", payload.clone());
    let response = client
        .notify_callback(request, NotifyMode::BlockWithAnswer)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, payload);
    server_task.await.unwrap();
}

/// Scenario 4: both peers initiate `BlockWithAnswer` within a tight window.
/// At most one side's call can be served by the other's single-slot
/// `waiting_answer`; the loser observes the arbitrator's own timeout rather
/// than corrupting the connection. The connection remains usable afterward.
#[tokio::test]
async fn concurrent_callback_race_leaves_connection_usable() {
    let (a_io, b_io) = duplex(1 << 16);
    let (a_reader, a_writer) = tokio::io::split(a_io);
    let (b_reader, b_writer) = tokio::io::split(b_io);

    let mut fast_config = ConnectionConfig::client(WebSocketConfig::default());
    fast_config.answer_timeout_ms = 300;

    let a = Arc::new(
        Connection::new(a_reader, a_writer, fast_config.clone(), json_protocol())
            .with_request_handler(Box::new(|req: RequestContext| {
                Box::pin(async move {
                    ResponseContext::new(StatusCode::OK).with_body("text/plain", req.body)
                })
            })),
    );
    let b = Arc::new(
        Connection::new(b_reader, b_writer, fast_config, json_protocol()).with_request_handler(
            Box::new(|req: RequestContext| {
                Box::pin(async move {
                    ResponseContext::new(StatusCode::OK).with_body("text/plain", req.body)
                })
            }),
        ),
    );

    let a_for_bg = Arc::clone(&a);
    let b_for_bg = Arc::clone(&b);
    let bg_a = tokio::spawn(async move {
        for _ in 0..500 {
            if a_for_bg.process_one().await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    let bg_b = tokio::spawn(async move {
        for _ in 0..500 {
            if b_for_bg.process_one().await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let req_a = RequestContext::new("GET", "/a").with_body("text/plain", b"from-a".to_vec());
    let req_b = RequestContext::new("GET", "/b").with_body("text/plain", b"from-b".to_vec());

    let (res_a, res_b) = tokio::join!(
        a.notify_callback(req_a, NotifyMode::BlockWithAnswer),
        b.notify_callback(req_b, NotifyMode::BlockWithAnswer),
    );

    // At least one side must have gotten its answer; a timed-out loser is
    // an acceptable, documented outcome (spec §8 invariant 6 / scenario 4),
    // not a connection-ending error.
    let a_ok = res_a.as_ref().map(|r| r.is_some()).unwrap_or(false);
    let b_ok = res_b.as_ref().map(|r| r.is_some()).unwrap_or(false);
    assert!(a_ok || b_ok, "at least one initiator should get an answer");

    bg_a.abort();
    bg_b.abort();

    // The connection is still usable: a fresh single-initiator call
    // succeeds cleanly.
    let follow_up = RequestContext::new("GET", "/c").with_body("text/plain", b"after-race".to_vec());
    let server_task = tokio::spawn(async move {
        loop {
            match b.process_one().await.unwrap() {
                ProcessResult::Done => break,
                _ => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    });
    let response = a
        .notify_callback(follow_up, NotifyMode::BlockWithAnswer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"after-race");
    server_task.await.unwrap();
}

/// Scenario 5: idle heartbeat cadence.
#[tokio::test]
async fn idle_heartbeat_cadence_matches_configured_interval() {
    let (client_io, server_io) = duplex(1 << 16);
    let (client_reader, _client_writer) = tokio::io::split(client_io);
    let (server_reader, server_writer) = tokio::io::split(server_io);

    let mut config = ConnectionConfig::server(WebSocketConfig::default());
    config.heartbeat_ms = 50;

    let server = Arc::new(Connection::new(
        server_reader,
        server_writer,
        config,
        json_protocol(),
    ));

    let server_for_run = Arc::clone(&server);
    let run_task = tokio::spawn(async move {
        let _ = server_for_run.run().await;
    });

    // Count pings observed on the client's read side over one second.
    let mut reader = synopse_ws::codec::FrameReader::new(client_reader, WebSocketConfig::default());
    let mut pings = 0usize;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(1000);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(50), reader.read_raw_frame()).await {
            Ok(Ok((_, frame))) if frame.opcode == synopse_ws::OpCode::Ping => pings += 1,
            _ => {}
        }
    }

    run_task.abort();
    // With a 50ms heartbeat over ~1s we expect roughly 20 pings; allow wide
    // jitter since this is a cooperatively-scheduled test runner.
    assert!(pings >= 5, "expected several heartbeat pings, saw {pings}");
}

/// Scenario 6: graceful close — the initiator's `close()` and the peer's
/// `ProcessLoop` both complete promptly.
#[tokio::test]
async fn graceful_close_completes_quickly_on_both_sides() {
    let (client_io, server_io) = duplex(1 << 16);
    let (client_reader, client_writer) = tokio::io::split(client_io);
    let (server_reader, server_writer) = tokio::io::split(server_io);

    let server = Connection::new(
        server_reader,
        server_writer,
        ConnectionConfig::server(WebSocketConfig::default()),
        json_protocol(),
    );
    let client = Connection::new(
        client_reader,
        client_writer,
        ConnectionConfig::client(WebSocketConfig::default()),
        json_protocol(),
    );

    let server_task = tokio::spawn(async move {
        loop {
            match server.process_one().await.unwrap() {
                ProcessResult::Closed => break,
                _ => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    });

    client.close().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), server_task)
        .await
        .expect("server ProcessLoop should observe Closed within 1s")
        .unwrap();
}

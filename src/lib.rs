//! A bidirectional REST-over-WebSocket messaging substrate, built directly
//! on RFC 6455 framing: a frame codec, two wire encodings (JSON and a
//! compact, optionally compressed/encrypted binary form), a protocol
//! registry, the opening handshake, a connection engine, and the callback
//! arbitrator that lets either peer drive a blocking request/answer call
//! over the one shared socket.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod http;
pub mod protocol;
pub mod server;
pub mod utils;

pub use client::Client;
pub use config::{ConnectionConfig, WebSocketConfig};
pub use connection::{Connection, NotifyMode, ProcessResult};
pub use context::{HeadToken, RequestContext, ResponseContext, RestPayload, StatusCode};
pub use error::Error;
pub use frame::{Frame, OpCode};
pub use protocol::registry::ProtocolRegistry;
pub use protocol::{Protocol, ProtocolKind};
pub use server::{ConnectionRef, Server};

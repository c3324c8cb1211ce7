use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum Error {
    // General errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error: {source}")]
    IOError {
        #[from]
        source: std::io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: std::string::FromUtf8Error,
    },

    // Framing errors
    #[error("RSV bits must be zero")]
    RSVNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame payload size can't be greater than 125 bytes")]
    ControlFramePayloadSize,

    #[error("high 32 bits of a 64-bit frame length must be zero")]
    InvalidExtendedLength,

    #[error("frame payload exceeds the 256 MiB hard limit")]
    FrameTooLarge,

    #[error("max frame size reached")]
    MaxFrameSize,

    #[error("max message size reached")]
    MaxMessageSize,

    #[error("continuation frame opcode does not match the first fragment's opcode")]
    MismatchedContinuationOpcode,

    // Handshake errors
    #[error("invalid HTTP handshake method or version")]
    InvalidHTTPHandshake,

    #[error("Connection: Upgrade header missing from the request")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing from the request")]
    NoUpgradeHeaderPresent,

    #[error("Sec-WebSocket-Version must be >= 13")]
    UnsupportedVersion,

    #[error("no Sec-WebSocket-Key header present in the request")]
    NoSecWebsocketKey,

    #[error("Sec-WebSocket-Key did not decode to exactly 16 bytes")]
    InvalidSecWebsocketKey,

    #[error("no protocol template matched the request")]
    NoMatchingProtocol,

    #[error("server didn't upgrade the connection")]
    NoUpgrade,

    #[error("server didn't send a valid Sec-WebSocket-Accept value")]
    InvalidAcceptKey,

    #[error("server negotiated a subprotocol we never offered")]
    UnexpectedSubprotocol,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete HTTP request/response")]
    IncompleteHTTPMessage,

    // URL errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: url::ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws:// or wss://")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    // Encoding / adapter errors
    #[error("{source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("head token mismatch: expected `{expected}`")]
    HeadTokenMismatch { expected: &'static str },

    #[error("malformed binary payload: missing `{0}` separator")]
    MalformedBinaryPayload(&'static str),

    #[error("compression error: {0}")]
    CompressionError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    // Arbitrator / callback errors
    #[error("could not acquire the connection lock in time (NOT_FOUND)")]
    NotFound,

    #[error("timed out waiting for the matching answer frame")]
    AnswerTimeout,

    #[error("connection was closed by the peer mid-call (WEBSOCKETCLOSED)")]
    WebSocketClosed,

    #[error("protocol registry already has an entry for this (name, uri) pair")]
    DuplicateProtocol,
}

use std::collections::HashMap;

/// `"request"` / `"answer"` — the first field of a REST payload, used to
/// validate framing-level intent (spec §4.B/GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadToken {
    Request,
    Answer,
}

impl HeadToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadToken::Request => "request",
            HeadToken::Answer => "answer",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("request") {
            Some(HeadToken::Request)
        } else if token.eq_ignore_ascii_case("answer") {
            Some(HeadToken::Answer)
        } else {
            None
        }
    }
}

/// A single outbound or inbound REST call, carried over the shared socket
/// (spec §1/§3: "a full request/response triple").
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: String,
    /// Serialized on the wire as the ASCII byte `'0'` or `'1'` (spec §4.B).
    pub no_answer: bool,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        RequestContext {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        self.content_type = content_type.into();
        self.body = body;
        self
    }
}

/// HTTP status codes plus the two sentinels spec §6 defines. `NotFound`
/// covers both the literal HTTP 404 and "no WebSocket bound / lock not
/// acquired"; `WebSocketClosed` is the internal value 0, translated to 404
/// at the server boundary and marking the connection non-keepalive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// Internal sentinel, numerically 0 (spec §6/§9).
    pub const WEBSOCKET_CLOSED: StatusCode = StatusCode(0);

    pub fn as_http(&self) -> StatusCode {
        if self.0 == 0 {
            StatusCode::NOT_FOUND
        } else {
            *self
        }
    }

    pub fn text(&self) -> String {
        self.0.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: String,
}

impl ResponseContext {
    pub fn new(status: StatusCode) -> Self {
        ResponseContext {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            content_type: String::new(),
        }
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        self.content_type = content_type.into();
        self.body = body;
        self
    }
}

/// The decoded result of `RestCodec::decode`: either side of the
/// request/answer pair, tagged so the caller can tell which head token it
/// actually read.
#[derive(Debug, Clone)]
pub enum RestPayload {
    Request(RequestContext),
    Answer(ResponseContext),
}

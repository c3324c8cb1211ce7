pub mod binary;
pub mod compress;
pub mod crypto;
pub mod json;
pub mod registry;

use crate::context::{HeadToken, RestPayload};
use crate::error::Error;
use crate::frame::Frame;
use crate::protocol::binary::BinaryCodec;
use crate::protocol::crypto::CryptoContext;
use crate::protocol::json::JsonCodec;

/// What a registered protocol template does with inbound/outbound frames
/// (spec §3 "Protocol (template)").
#[derive(Debug, Clone)]
pub enum ProtocolKind {
    /// Server-to-client push only; bypasses the REST request/answer
    /// machinery entirely (spec §3).
    Chat,
    RestJson,
    RestBinary {
        compression: bool,
        encryption: Option<CryptoContext>,
    },
}

/// An immutable protocol template, keyed by `(name, uri)` in the registry.
/// Cloned once per accepted connection (spec §3).
#[derive(Debug, Clone)]
pub struct Protocol {
    pub name: String,
    /// Empty string means "match any path".
    pub uri: String,
    pub kind: ProtocolKind,
}

impl Protocol {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, kind: ProtocolKind) -> Self {
        Protocol {
            name: name.into(),
            uri: uri.into(),
            kind,
        }
    }

    pub fn matches_uri(&self, uri: &str) -> bool {
        self.uri.is_empty() || self.uri == uri
    }

    /// Builds the stateless codec this template's frames are encoded and
    /// decoded with. `Chat` has no REST codec — callers must special-case
    /// it (spec §9: "`Chat` is a separate variant that bypasses the REST
    /// machinery").
    pub fn codec(&self) -> Option<Box<dyn RestCodec + Send + Sync>> {
        match &self.kind {
            ProtocolKind::Chat => None,
            ProtocolKind::RestJson => Some(Box::new(JsonCodec)),
            ProtocolKind::RestBinary {
                compression,
                encryption,
            } => Some(Box::new(BinaryCodec {
                compression: *compression,
                encryption: encryption.clone(),
            })),
        }
    }
}

/// Shared interface for the two REST wire encodings (spec §4.B, §9: "a sum
/// type of encoder strategies with a small interface").
pub trait RestCodec {
    fn encode_request(&self, req: &crate::context::RequestContext) -> Result<Frame, Error>;
    fn encode_answer(&self, resp: &crate::context::ResponseContext) -> Result<Frame, Error>;

    /// `Ok(None)` is the silent-drop path: the frame's head token doesn't
    /// match `expect` (spec §4.B — "a frame labeled `answer` that arrives
    /// where a `request` is expected is silently dropped").
    fn decode(&self, frame: &Frame, expect: HeadToken) -> Result<Option<RestPayload>, Error>;
}

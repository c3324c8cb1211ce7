//! The protocol registry (spec §4.C): templates keyed by `(name, uri)`,
//! linear lookup, clone-per-connection semantics.

use crate::error::Error;
use crate::protocol::Protocol;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct ProtocolRegistry {
    inner: RwLock<Vec<Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        ProtocolRegistry {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Fails with `DuplicateProtocol` if `(name, uri)` is already registered.
    pub async fn add(&self, protocol: Protocol) -> Result<(), Error> {
        let mut templates = self.inner.write().await;
        if templates
            .iter()
            .any(|p| p.name == protocol.name && p.uri == protocol.uri)
        {
            return Err(Error::DuplicateProtocol);
        }
        templates.push(protocol);
        Ok(())
    }

    /// Like `add`, but idempotent: a duplicate `(name, uri)` replaces the
    /// existing template in place rather than erroring.
    pub async fn add_once(&self, protocol: Protocol) {
        let mut templates = self.inner.write().await;
        match templates
            .iter_mut()
            .find(|p| p.name == protocol.name && p.uri == protocol.uri)
        {
            Some(slot) => *slot = protocol,
            None => templates.push(protocol),
        }
    }

    pub async fn remove(&self, name: &str, uri: &str) -> bool {
        let mut templates = self.inner.write().await;
        let before = templates.len();
        templates.retain(|p| !(p.name == name && p.uri == uri));
        templates.len() != before
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn find(&self, name: &str, uri: &str) -> Option<Protocol> {
        self.inner
            .read()
            .await
            .iter()
            .find(|p| p.name == name && p.uri == uri)
            .cloned()
    }

    /// Exact `(name, uri)` match first, falling back to a match-any-uri
    /// template registered under the same name (spec §4.D: a subprotocol
    /// name can be registered once for every path).
    pub async fn clone_by_name(&self, name: &str, uri: &str) -> Option<Protocol> {
        let templates = self.inner.read().await;
        templates
            .iter()
            .find(|p| p.name == name && p.uri == uri)
            .or_else(|| templates.iter().find(|p| p.name == name && p.uri.is_empty()))
            .cloned()
    }

    /// First template whose `uri` matches, irrespective of name (spec
    /// §4.D's fallback path when the client sent no subprotocol list).
    pub async fn clone_by_uri(&self, uri: &str) -> Option<Protocol> {
        self.inner
            .read()
            .await
            .iter()
            .find(|p| p.matches_uri(uri))
            .cloned()
    }
}

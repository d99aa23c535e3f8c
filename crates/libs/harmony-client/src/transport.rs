//! The stanza transport capability consumed by the handshake and the engine.
//!
//! Connection handling (sockets, TLS, XMPP stream negotiation) lives behind
//! [`Transport`]. A connected [`Session`] pairs an outbound [`StanzaSink`]
//! with the receiving end of the session's inbound event channel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use harmony_stanza::{InboundStanza, OutboundStanza};
use tokio::sync::mpsc;

use crate::config::HubEndpoint;
use crate::error::TransportError;

pub const GUEST_IDENTITY: &str = "guest";
pub const GUEST_SECRET: &str = "guest";
pub const GUEST_DOMAIN: &str = "x.com";
pub const HUB_DOMAIN: &str = "connect.logitech.com";
pub const JID_RESOURCE: &str = "gatorade";

/// Login credentials for one session.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    /// The fixed guest pair used for the provisional pairing session.
    pub fn guest() -> Self {
        Self {
            identity: GUEST_IDENTITY.to_owned(),
            secret: GUEST_SECRET.to_owned(),
        }
    }

    /// Durable credentials: the hub-issued token is both identity and secret.
    pub fn from_identity(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            secret: identity.clone(),
            identity,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn is_guest(&self) -> bool {
        *self == Self::guest()
    }

    /// XMPP login id, e.g. `guest@x.com/gatorade`.
    pub fn jid(&self) -> String {
        let domain = if self.is_guest() { GUEST_DOMAIN } else { HUB_DOMAIN };
        format!("{}@{}/{}", self.identity, domain, JID_RESOURCE)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One signal from a live session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Stanza(InboundStanza),
    Error(TransportError),
}

/// Outbound half of a session.
#[async_trait]
pub trait StanzaSink: Send + Sync {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), TransportError>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&self);
}

/// A connected, ready session. Dropping the receiver half stops event
/// delivery; [`Session::close`] also tears down the connection.
pub struct Session {
    sink: Arc<dyn StanzaSink>,
    events: mpsc::Receiver<SessionEvent>,
}

impl Session {
    pub fn new(sink: Arc<dyn StanzaSink>, events: mpsc::Receiver<SessionEvent>) -> Self {
        Self { sink, events }
    }

    pub async fn send(&self, stanza: OutboundStanza) -> Result<(), TransportError> {
        self.sink.send(stanza).await
    }

    /// Next inbound signal in arrival order; `None` once the session ended.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub async fn close(self) {
        self.sink.close().await;
    }

    pub fn into_parts(self) -> (Arc<dyn StanzaSink>, mpsc::Receiver<SessionEvent>) {
        (self.sink, self.events)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Opens sessions against a hub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once the session is authenticated and ready for stanzas.
    async fn connect(
        &self,
        endpoint: &HubEndpoint,
        credentials: &Credentials,
    ) -> Result<Session, TransportError>;
}

//! Client engine for Logitech Harmony hubs.
//!
//! The hub speaks a stanza protocol over one long-lived connection. This crate
//! provides:
//!
//! - **[`Authenticator`]**: two-phase login where a guest session requests a
//!   pairing identity, then a durable session logs in with it
//! - **[`CorrelationEngine`]**: multiplexes requests over the session,
//!   matching each inbound stanza to at most one waiting caller and
//!   republishing state digests as [`EngineEvent`]s
//! - **[`HarmonyClient`]**: activity and button operations built on the
//!   engine
//! - **[`Transport`]**: the connection capability the above consume
//!
//! Payload encoding lives in the `harmony-stanza` crate and is re-exported as
//! [`stanza`].

pub mod auth;
pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
mod pending;
pub mod transport;
pub mod types;

pub use harmony_stanza as stanza;

pub use auth::Authenticator;
pub use config::{ClientConfig, HubEndpoint};
pub use engine::{CommandRequest, CorrelationEngine, EngineEvent};
pub use error::{
    AuthError, AuthPhase, AuthTokenError, ClientError, ConfigError, RequestError, TransportError,
};
pub use facade::{confirmation_of, HarmonyClient, HoldStatus};
pub use pending::StanzaPredicate;
pub use transport::{Credentials, Session, SessionEvent, StanzaSink, Transport};
pub use types::*;

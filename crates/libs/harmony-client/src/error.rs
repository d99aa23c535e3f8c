use std::fmt;

use harmony_stanza::{DecodeError, StanzaId};
use serde::{Deserialize, Serialize};

/// Failures reported by a [`Transport`](crate::Transport) or its session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("connection refused: {reason}")]
    Refused { reason: String },

    #[error("disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("send failed: {reason}")]
    Send { reason: String },

    #[error("io error: {message}")]
    Io { message: String },
}

impl TransportError {
    /// Returns `true` for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Refused { .. })
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Step of the two-phase handshake a failure happened in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthPhase {
    /// Opening the provisional guest session.
    Guest,
    /// Requesting the pairing identity on the guest session.
    Pairing,
    /// Opening the durable session with the granted identity.
    Identity,
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => f.write_str("guest"),
            Self::Pairing => f.write_str("pairing"),
            Self::Identity => f.write_str("identity"),
        }
    }
}

/// Handshake failures. Fatal to the connection attempt; the caller retries
/// the whole handshake.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("identity not granted")]
    IdentityNotGranted,

    #[error("{phase} phase failed: {source}")]
    Transport {
        phase: AuthPhase,
        #[source]
        source: TransportError,
    },

    #[error("no pairing reply within {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::IdentityNotGranted => false,
            Self::Transport { source, .. } => source.is_retryable(),
            Self::Timeout { .. } => true,
        }
    }
}

/// Failures of the cloud credential exchange.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthTokenError {
    #[error("credential exchange rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("response carried no user auth token")]
    MissingToken,

    #[error("http error: {message}")]
    Http { message: String },
}

/// Failures of a single correlated request.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("undecodable reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request {id} timed out after {after_ms} ms")]
    Timeout { id: StanzaId, after_ms: u64 },

    #[error("engine closed")]
    Closed,

    #[error("no free request id")]
    IdsExhausted,
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(source) => source.is_retryable(),
            Self::Timeout { .. } | Self::IdsExhausted => true,
            Self::Decode(_) | Self::Closed => false,
        }
    }
}

/// Errors surfaced by the high-level [`HarmonyClient`](crate::HarmonyClient).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("reply is missing field `{field}`")]
    MissingField { field: &'static str },
}

impl From<DecodeError> for ClientError {
    fn from(err: DecodeError) -> Self {
        Self::Request(RequestError::Decode(err))
    }
}

/// Configuration loading and validation failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid toml: {message}")]
    Parse { message: String },

    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        assert!(!TransportError::Refused { reason: "bad credentials".into() }.is_retryable());
        assert!(TransportError::disconnected("eof").is_retryable());

        assert!(!AuthError::IdentityNotGranted.is_retryable());
        assert!(AuthError::Timeout { after_ms: 10 }.is_retryable());
        assert!(!AuthError::Transport {
            phase: AuthPhase::Identity,
            source: TransportError::Refused { reason: "x".into() },
        }
        .is_retryable());

        assert!(RequestError::Timeout { id: 1, after_ms: 5 }.is_retryable());
        assert!(!RequestError::Closed.is_retryable());
        assert!(!RequestError::Decode(DecodeError::MissingPayload).is_retryable());
    }

    #[test]
    fn auth_error_names_the_failing_phase() {
        let err = AuthError::Transport {
            phase: AuthPhase::Pairing,
            source: TransportError::disconnected("eof"),
        };
        assert_eq!(err.to_string(), "pairing phase failed: disconnected: eof");
    }
}

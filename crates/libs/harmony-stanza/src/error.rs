use serde::{Deserialize, Serialize};

/// Errors returned when a stanza payload does not have the expected shape.
///
/// Decode failures are local to the request whose reply failed to decode;
/// they never affect other outstanding requests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("stanza carried no payload")]
    MissingPayload,

    #[error("malformed json payload: {message}")]
    Json { message: String },

    #[error("unexpected payload shape: {message}")]
    Shape { message: String },
}

impl DecodeError {
    /// Convenience constructor for `Shape`.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

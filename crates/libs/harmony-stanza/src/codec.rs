use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DecodeError;
use crate::stanza::{
    OutboundStanza, StanzaId, StanzaType, ENGINE_MIME_PREFIX, GUEST_FROM, HUB_XMLNS, PAIR_MIME,
};

/// Key/value pairs of a colon/equals delimited payload.
pub type DelimitedPayload = BTreeMap<String, String>;

/// How a pending request expects its reply payload to be encoded.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    #[default]
    Delimited,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Delimited => f.write_str("delimited"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedPayload {
    Delimited(DelimitedPayload),
    Json(JsonValue),
}

impl DecodedPayload {
    pub fn format(&self) -> PayloadFormat {
        match self {
            Self::Delimited(_) => PayloadFormat::Delimited,
            Self::Json(_) => PayloadFormat::Json,
        }
    }

    /// String field lookup that works for both encodings.
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Self::Delimited(pairs) => pairs.get(key).map(String::as_str),
            Self::Json(value) => value.get(key).and_then(JsonValue::as_str),
        }
    }

    pub fn as_delimited(&self) -> Option<&DelimitedPayload> {
        match self {
            Self::Delimited(pairs) => Some(pairs),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            Self::Delimited(_) => None,
        }
    }

    pub fn into_json(self) -> Result<JsonValue, DecodeError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Delimited(_) => Err(DecodeError::shape("expected a json payload")),
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Builds an engine command stanza. An absent body encodes as empty text.
pub fn encode_request(id: StanzaId, command: &str, body: Option<&str>) -> OutboundStanza {
    OutboundStanza {
        kind: StanzaType::Get,
        id,
        from: None,
        xmlns: HUB_XMLNS.to_owned(),
        mime: format!("{ENGINE_MIME_PREFIX}{command}"),
        payload: body.unwrap_or_default().to_owned(),
    }
}

/// Builds the pairing request sent on the guest session.
pub fn encode_pair_request(id: StanzaId, client_name: &str) -> OutboundStanza {
    OutboundStanza {
        kind: StanzaType::Get,
        id,
        from: Some(GUEST_FROM.to_owned()),
        xmlns: HUB_XMLNS.to_owned(),
        mime: PAIR_MIME.to_owned(),
        payload: format!("method=pair:name={client_name}"),
    }
}

/// Escapes an action descriptor for embedding as a delimited value; the hub
/// reads `::` as a literal colon.
pub fn encode_action(action: &str) -> String {
    action.replace(':', "::")
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Splits `key1=value1:key2=value2` into pairs.
///
/// Segments that do not contain exactly one `=` are dropped. Empty values are
/// kept. Absent or empty input yields an empty map.
pub fn decode_delimited(text: Option<&str>) -> DelimitedPayload {
    let mut pairs = DelimitedPayload::new();
    let Some(text) = text.filter(|text| !text.is_empty()) else {
        return pairs;
    };
    for segment in text.split(':') {
        let mut parts = segment.split('=');
        if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
            pairs.insert(key.to_owned(), value.to_owned());
        }
    }
    pairs
}

pub fn decode_json(text: Option<&str>) -> Result<JsonValue, DecodeError> {
    let text = text.ok_or(DecodeError::MissingPayload)?;
    Ok(serde_json::from_str(text)?)
}

pub fn decode_payload(
    text: Option<&str>,
    format: PayloadFormat,
) -> Result<DecodedPayload, DecodeError> {
    match format {
        PayloadFormat::Json => decode_json(text).map(DecodedPayload::Json),
        PayloadFormat::Delimited => Ok(DecodedPayload::Delimited(decode_delimited(text))),
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Correlation id carried in the `id` attribute of an `iq` stanza.
pub type StanzaId = u32;

/// Namespace of the `oa` element carrying every hub command.
pub const HUB_XMLNS: &str = "connect.logitech.com";

/// Mime prefix of harmony engine commands; the command name follows the `?`.
pub const ENGINE_MIME_PREFIX: &str = "vnd.logitech.harmony/vnd.logitech.harmony.engine?";

/// Mime of the pairing request sent on the guest session.
pub const PAIR_MIME: &str = "vnd.logitech.connect/vnd.logitech.pair";

/// Event type of the unsolicited state digest broadcast.
pub const STATE_DIGEST_NOTIFY: &str = "connect.stateDigest?notify";

/// `from` attribute of the pairing request.
pub const GUEST_FROM: &str = "guest";

// ── Outbound ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StanzaType {
    Get,
    Set,
    Result,
    Error,
}

impl StanzaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StanzaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request stanza ready to hand to a transport.
///
/// Renders as `<iq type id from?><oa xmlns mime>payload</oa></iq>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundStanza {
    pub kind: StanzaType,
    pub id: StanzaId,
    pub from: Option<String>,
    pub xmlns: String,
    pub mime: String,
    pub payload: String,
}

impl OutboundStanza {
    /// The engine command name, if this is an engine command stanza.
    pub fn command(&self) -> Option<&str> {
        self.mime.strip_prefix(ENGINE_MIME_PREFIX)
    }

    pub fn is_pairing(&self) -> bool {
        self.mime == PAIR_MIME
    }

    /// Wire form of the stanza with attribute and text escaping applied.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(96 + self.mime.len() + self.payload.len());
        xml.push_str("<iq type=\"");
        xml.push_str(self.kind.as_str());
        xml.push_str("\" id=\"");
        xml.push_str(&self.id.to_string());
        xml.push('"');
        if let Some(from) = &self.from {
            xml.push_str(" from=\"");
            escape_into(&mut xml, from);
            xml.push('"');
        }
        xml.push_str("><oa xmlns=\"");
        escape_into(&mut xml, &self.xmlns);
        xml.push_str("\" mime=\"");
        escape_into(&mut xml, &self.mime);
        xml.push_str("\">");
        escape_into(&mut xml, &self.payload);
        xml.push_str("</oa></iq>");
        xml
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// The `event` child of an unsolicited notification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StanzaEvent {
    pub event_type: String,
    pub text: String,
}

impl StanzaEvent {
    pub fn is_state_digest(&self) -> bool {
        self.event_type == STATE_DIGEST_NOTIFY
    }
}

/// A stanza received from the hub, already lifted out of its XML form by the
/// transport.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundStanza {
    pub id: Option<StanzaId>,
    pub event: Option<StanzaEvent>,
    /// Text of the `oa` child.
    pub payload: Option<String>,
}

impl InboundStanza {
    /// A direct reply to the request with `id`.
    pub fn reply(id: StanzaId, payload: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            event: None,
            payload: Some(payload.into()),
        }
    }

    /// An unsolicited notification without correlation id.
    pub fn notification(event_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            event: Some(StanzaEvent {
                event_type: event_type.into(),
                text: text.into(),
            }),
            payload: None,
        }
    }

    /// JSON text of the state digest, when this stanza is one.
    pub fn state_digest(&self) -> Option<&str> {
        self.event
            .as_ref()
            .filter(|event| event.is_state_digest())
            .map(|event| event.text.as_str())
    }

    /// The text a pending request decodes: the `oa` payload, or the event text
    /// for notifications that carry no payload.
    pub fn body(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .or_else(|| self.event.as_ref().map(|event| event.text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_strips_engine_prefix() {
        let stanza = OutboundStanza {
            kind: StanzaType::Get,
            id: 7,
            from: None,
            xmlns: HUB_XMLNS.into(),
            mime: format!("{ENGINE_MIME_PREFIX}getCurrentActivity"),
            payload: String::new(),
        };
        assert_eq!(stanza.command(), Some("getCurrentActivity"));
        assert!(!stanza.is_pairing());
    }

    #[test]
    fn to_xml_escapes_attributes_and_text() {
        let stanza = OutboundStanza {
            kind: StanzaType::Get,
            id: 42,
            from: Some("guest".into()),
            xmlns: HUB_XMLNS.into(),
            mime: PAIR_MIME.into(),
            payload: "name=a<b>&\"c\"".into(),
        };
        assert_eq!(
            stanza.to_xml(),
            "<iq type=\"get\" id=\"42\" from=\"guest\">\
             <oa xmlns=\"connect.logitech.com\" mime=\"vnd.logitech.connect/vnd.logitech.pair\">\
             name=a&lt;b&gt;&amp;&quot;c&quot;</oa></iq>"
        );
    }

    #[test]
    fn state_digest_only_for_notify_events() {
        let digest = InboundStanza::notification(STATE_DIGEST_NOTIFY, "{}");
        assert_eq!(digest.state_digest(), Some("{}"));
        assert_eq!(digest.body(), Some("{}"));

        let other = InboundStanza::notification(
            "harmony.engine?startActivityFinished",
            "activityId=1:errorCode=200",
        );
        assert_eq!(other.state_digest(), None);

        let reply = InboundStanza::reply(3, "result=1");
        assert_eq!(reply.state_digest(), None);
        assert_eq!(reply.body(), Some("result=1"));
    }
}

//! In-memory hub for exercising the handshake and the correlation engine.
//!
//! [`SimulatedHub`] implements [`Transport`]: it answers the pairing request on
//! guest sessions, records every connection and stanza, runs a scripted
//! [`Responder`] for engine commands and lets tests push unsolicited stanzas
//! or transport errors into the latest durable session.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use harmony_client::stanza::{
    decode_delimited, InboundStanza, OutboundStanza, STATE_DIGEST_NOTIFY,
};
use harmony_client::{
    Credentials, HubEndpoint, Session, SessionEvent, StanzaSink, Transport, TransportError,
    ACTIVITY_STATUS_STARTING, ACTIVITY_STATUS_STOPPING, POWER_OFF_ACTIVITY,
};
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;

/// Produces the hub's answers to one engine command stanza.
pub type Responder = Arc<dyn Fn(&OutboundStanza) -> Vec<InboundStanza> + Send + Sync>;

const SESSION_CAPACITY: usize = 64;

/// How the hub answers the pairing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pairing {
    Grant(String),
    /// Replies, but without an identity.
    Withhold,
    /// Never replies.
    Ignore,
}

struct HubState {
    pairing: Pairing,
    refused: Vec<String>,
    responder: Option<Responder>,
    connections: Vec<Credentials>,
    received: Vec<OutboundStanza>,
    sessions: Vec<Option<mpsc::Sender<SessionEvent>>>,
    live: Option<usize>,
    closed_sessions: usize,
}

#[derive(Clone)]
pub struct SimulatedHub {
    state: Arc<Mutex<HubState>>,
}

impl SimulatedHub {
    /// A hub granting `identity` on pairing.
    pub fn granting(identity: impl Into<String>) -> Self {
        Self::with_pairing(Pairing::Grant(identity.into()))
    }

    pub fn with_pairing(pairing: Pairing) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                pairing,
                refused: Vec::new(),
                responder: None,
                connections: Vec::new(),
                received: Vec::new(),
                sessions: Vec::new(),
                live: None,
                closed_sessions: 0,
            })),
        }
    }

    pub fn with_responder(self, responder: Responder) -> Self {
        self.state().responder = Some(responder);
        self
    }

    /// Refuses logins whose identity is `identity`.
    pub fn refusing(self, identity: impl Into<String>) -> Self {
        self.state().refused.push(identity.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().expect("hub state mutex poisoned")
    }

    /// Credentials of every connection attempt, in order.
    pub fn connections(&self) -> Vec<Credentials> {
        self.state().connections.clone()
    }

    /// Every stanza the hub received, pairing requests included.
    pub fn received(&self) -> Vec<OutboundStanza> {
        self.state().received.clone()
    }

    /// Command names of the engine stanzas received so far.
    pub fn received_commands(&self) -> Vec<String> {
        self.state()
            .received
            .iter()
            .filter_map(|stanza| stanza.command().map(str::to_owned))
            .collect()
    }

    pub fn closed_sessions(&self) -> usize {
        self.state().closed_sessions
    }

    /// Waits until at least `count` stanzas were received or five seconds
    /// passed, then returns what was received.
    pub async fn wait_for_received(&self, count: usize) -> Vec<OutboundStanza> {
        for _ in 0..2_500 {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.received()
    }

    fn live_sender(&self) -> Option<mpsc::Sender<SessionEvent>> {
        let state = self.state();
        state.live.and_then(|index| state.sessions[index].clone())
    }

    /// Delivers `stanza` on the latest durable session.
    pub async fn push(&self, stanza: InboundStanza) -> bool {
        match self.live_sender() {
            Some(tx) => tx.send(SessionEvent::Stanza(stanza)).await.is_ok(),
            None => false,
        }
    }

    pub async fn push_error(&self, err: TransportError) -> bool {
        match self.live_sender() {
            Some(tx) => tx.send(SessionEvent::Error(err)).await.is_ok(),
            None => false,
        }
    }

    /// Drops the latest durable session as if the connection was lost.
    pub fn end_session(&self) {
        let mut state = self.state();
        if let Some(index) = state.live.take() {
            state.sessions[index] = None;
        }
    }
}

#[async_trait]
impl Transport for SimulatedHub {
    async fn connect(
        &self,
        endpoint: &HubEndpoint,
        credentials: &Credentials,
    ) -> Result<Session, TransportError> {
        let mut state = self.state();
        state.connections.push(credentials.clone());
        if state.refused.iter().any(|identity| identity == credentials.identity()) {
            log::debug!("sim-hub {}: refusing {}", endpoint, credentials.jid());
            return Err(TransportError::Refused {
                reason: format!("not authorized: {}", credentials.jid()),
            });
        }

        let (tx, rx) = mpsc::channel(SESSION_CAPACITY);
        let index = state.sessions.len();
        state.sessions.push(Some(tx));
        let guest = credentials.is_guest();
        if !guest {
            state.live = Some(index);
        }
        log::debug!("sim-hub {}: session {} online for {}", endpoint, index, credentials.jid());

        let sink = HubSink {
            state: self.state.clone(),
            index,
        };
        Ok(Session::new(Arc::new(sink), rx))
    }
}

struct HubSink {
    state: Arc<Mutex<HubState>>,
    index: usize,
}

impl HubSink {
    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().expect("hub state mutex poisoned")
    }
}

#[async_trait]
impl StanzaSink for HubSink {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), TransportError> {
        let (tx, pairing, responder) = {
            let mut state = self.state();
            let Some(tx) = state.sessions[self.index].clone() else {
                return Err(TransportError::Send {
                    reason: "session closed".into(),
                });
            };
            state.received.push(stanza.clone());
            (tx, state.pairing.clone(), state.responder.clone())
        };

        let replies = if stanza.is_pairing() {
            pairing_reply(&pairing, &stanza).into_iter().collect()
        } else {
            responder.map(|respond| respond(&stanza)).unwrap_or_default()
        };
        for reply in replies {
            if tx.send(SessionEvent::Stanza(reply)).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state();
        if state.sessions[self.index].take().is_some() {
            state.closed_sessions += 1;
            if state.live == Some(self.index) {
                state.live = None;
            }
        }
    }
}

fn pairing_reply(pairing: &Pairing, stanza: &OutboundStanza) -> Option<InboundStanza> {
    let payload = match pairing {
        Pairing::Grant(identity) => format!(
            "serverIdentity=sim-hub:hubId=106:identity={identity}:status=succeeded:\
             protocolVersion={{XMPP=\"1.0\", HTTP=\"1.0\"}}"
        ),
        Pairing::Withhold => "serverIdentity=sim-hub:status=failed".to_owned(),
        Pairing::Ignore => return None,
    };
    Some(reply_to(stanza, payload))
}

// ── Stanza builders ───────────────────────────────────────────────────────────

/// Direct reply echoing the id of `stanza`.
pub fn reply_to(stanza: &OutboundStanza, payload: impl Into<String>) -> InboundStanza {
    InboundStanza::reply(stanza.id, payload)
}

pub fn state_digest(activity_id: &str, status: i64) -> InboundStanza {
    let body = json!({
        "activityId": activity_id,
        "activityStatus": status,
        "sleepTimerId": -1,
        "runningZoneList": [],
    });
    InboundStanza::notification(STATE_DIGEST_NOTIFY, body.to_string())
}

/// A responder playing a hub with the given `config` catalog.
///
/// `getCurrentActivity` reports the current activity. `config` returns the
/// catalog. `startactivity` sends an empty direct acknowledgement, then a
/// transitional digest, then the settled digest, and switches the current
/// activity.
pub fn activity_responder(config: JsonValue, current: &str) -> Responder {
    let current = Arc::new(Mutex::new(current.to_owned()));
    Arc::new(move |stanza: &OutboundStanza| {
        let mut current = current.lock().expect("current activity mutex poisoned");
        match stanza.command() {
            Some("getCurrentActivity") => vec![reply_to(stanza, format!("result={current}"))],
            Some("config") => vec![reply_to(stanza, config.to_string())],
            Some("startactivity") => {
                let body = decode_delimited(Some(stanza.payload.as_str()));
                let Some(target) = body.get("activityId") else {
                    return vec![reply_to(stanza, "errorCode=400:errorString=missing activityId")];
                };
                let (transitional, settled) = if target == POWER_OFF_ACTIVITY {
                    (ACTIVITY_STATUS_STOPPING, 0)
                } else {
                    (ACTIVITY_STATUS_STARTING, 2)
                };
                *current = target.clone();
                vec![
                    reply_to(stanza, ""),
                    state_digest(target, transitional),
                    state_digest(target, settled),
                ]
            }
            _ => Vec::new(),
        }
    })
}

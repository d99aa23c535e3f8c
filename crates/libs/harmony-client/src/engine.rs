//! Request/response correlation over one authenticated session.
//!
//! Every inbound stanza is processed once, in arrival order, by a single
//! dispatch task. Outbound requests register a pending entry before their
//! stanza is written; the dispatch task resolves at most one entry per stanza
//! and separately republishes state digests to subscribers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use harmony_stanza::{
    decode_payload, encode_request, DecodedPayload, InboundStanza, PayloadFormat, RequestIds,
    StanzaId,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{RequestError, TransportError};
use crate::pending::{Matcher, PendingRequest, PendingSet, StanzaPredicate};
use crate::transport::{Session, SessionEvent, StanzaSink};
use crate::types::StateDigest;

/// Notifications published to [`CorrelationEngine::subscribe`] receivers.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    StateDigest(StateDigest),
    /// The session reported a failure. Pending requests are left alone.
    TransportError(TransportError),
    Closed,
}

/// One correlated command.
///
/// Defaults to a delimited reply matched by correlation id and the engine's
/// configured deadline.
#[derive(Clone)]
pub struct CommandRequest {
    command: String,
    body: Option<String>,
    format: PayloadFormat,
    predicate: Option<StanzaPredicate>,
    timeout: Option<Option<Duration>>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            body: None,
            format: PayloadFormat::Delimited,
            predicate: None,
            timeout: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Replaces id matching with `predicate`, for commands acknowledged by a
    /// broadcast rather than a direct reply.
    pub fn matching(mut self, predicate: StanzaPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Waits for the reply without a deadline.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("command", &self.command)
            .field("body", &self.body)
            .field("format", &self.format)
            .field("custom_match", &self.predicate.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

struct EngineInner {
    label: String,
    sink: Arc<dyn StanzaSink>,
    pending: Mutex<PendingSet>,
    events: broadcast::Sender<EngineEvent>,
    shutdown: CancellationToken,
    request_timeout: Option<Duration>,
}

impl EngineInner {
    fn pending(&self) -> std::sync::MutexGuard<'_, PendingSet> {
        self.pending.lock().expect("pending set mutex poisoned")
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn dispatch(&self, stanza: &InboundStanza) -> bool {
        if let Some(text) = stanza.state_digest() {
            match StateDigest::from_json(text) {
                Ok(digest) => {
                    log::debug!(
                        "harmony({}): state digest activity={} status={}",
                        self.label,
                        digest.activity_id,
                        digest.activity_status
                    );
                    self.publish(EngineEvent::StateDigest(digest));
                }
                Err(err) => {
                    log::warn!(
                        "harmony({}): dropping undecodable state digest: {}",
                        self.label,
                        err
                    );
                }
            }
        }

        let Some(entry) = self.pending().take_match(stanza) else {
            log::trace!("harmony({}): no pending request for stanza {:?}", self.label, stanza.id);
            return false;
        };

        log::debug!(
            "harmony({}): resolving request {} with stanza {:?}",
            self.label,
            entry.id,
            stanza.id
        );
        let outcome = decode_payload(stanza.body(), entry.format).map_err(RequestError::from);
        if entry.reply.send(outcome).is_err() {
            log::debug!("harmony({}): caller of request {} went away", self.label, entry.id);
        }
        true
    }

    fn forget(&self, id: StanzaId) {
        self.pending().remove(id);
    }
}

/// Removes a request's pending entry when its caller stops waiting before the
/// entry was resolved or drained.
struct PendingGuard<'a> {
    inner: &'a EngineInner,
    id: StanzaId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("harmony({}): forgetting request {}", self.inner.label, self.id);
            self.inner.forget(self.id);
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Multiplexes correlated requests over one exclusively owned session.
///
/// Must be created inside a tokio runtime; the dispatch task is spawned on
/// construction and stops on [`close`](Self::close) or when the session ends.
pub struct CorrelationEngine {
    inner: Arc<EngineInner>,
}

impl CorrelationEngine {
    pub fn start(session: Session, config: &ClientConfig) -> Self {
        Self::start_with_ids(session, config, RequestIds::new())
    }

    pub fn start_with_ids(session: Session, config: &ClientConfig, ids: RequestIds) -> Self {
        let (sink, events) = session.into_parts();
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(EngineInner {
            label: config.label.clone(),
            sink,
            pending: Mutex::new(PendingSet::new(ids)),
            events: event_tx,
            shutdown: CancellationToken::new(),
            request_timeout: config.request_timeout(),
        });
        tokio::spawn(run_dispatch_loop(inner.clone(), events));
        log::info!("harmony({}): correlation engine started", inner.label);
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Sends `request` and waits for the stanza that answers it.
    pub async fn request(&self, request: CommandRequest) -> Result<DecodedPayload, RequestError> {
        let CommandRequest {
            command,
            body,
            format,
            predicate,
            timeout,
        } = request;
        let (reply, rx) = oneshot::channel();

        let stanza = {
            let mut pending = self.inner.pending();
            let id = pending.allocate_id()?;
            let matcher = predicate.map_or(Matcher::ReplyId, Matcher::Custom);
            pending
                .insert(PendingRequest {
                    id,
                    matcher,
                    format,
                    reply,
                })
                .map_err(|(_, err)| err)?;
            encode_request(id, &command, body.as_deref())
        };
        let id = stanza.id;

        log::debug!(
            "harmony({}): request {} command={} body={:?}",
            self.inner.label,
            id,
            command,
            body
        );
        let mut guard = PendingGuard {
            inner: &self.inner,
            id,
            armed: true,
        };
        self.inner.sink.send(stanza).await?;

        let outcome = match timeout.unwrap_or(self.inner.request_timeout) {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::warn!(
                        "harmony({}): request {} ({}) timed out",
                        self.inner.label,
                        id,
                        command
                    );
                    return Err(RequestError::Timeout {
                        id,
                        after_ms: millis(limit),
                    });
                }
            },
            None => rx.await,
        };
        guard.armed = false;
        // A dropped sender means the entry was drained without an answer.
        outcome.unwrap_or(Err(RequestError::Closed))
    }

    /// Fire-and-forget command; no pending entry is registered.
    pub async fn send(&self, command: &str, body: Option<&str>) -> Result<(), RequestError> {
        let id = self.inner.pending().allocate_id()?;
        log::debug!(
            "harmony({}): send {} command={} body={:?}",
            self.inner.label,
            id,
            command,
            body
        );
        self.inner
            .sink
            .send(encode_request(id, command, body))
            .await
            .map_err(RequestError::from)
    }

    /// Processes one inbound stanza. Returns whether a pending request was
    /// resolved by it.
    ///
    /// The dispatch task calls this for every session stanza; calling it
    /// directly injects a stanza as if the session had delivered it.
    pub fn dispatch(&self, stanza: &InboundStanza) -> bool {
        self.inner.dispatch(stanza)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn is_pending(&self, id: StanzaId) -> bool {
        self.inner.pending().contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pending().is_closed()
    }

    /// Closes the session and rejects every outstanding request with
    /// [`RequestError::Closed`]. Later requests fail the same way.
    pub async fn close(&self) {
        let drained = self.inner.pending().close();
        if self.inner.shutdown.is_cancelled() && drained.is_empty() {
            return;
        }
        self.inner.shutdown.cancel();
        log::info!(
            "harmony({}): closing session, rejecting {} pending request(s)",
            self.inner.label,
            drained.len()
        );
        for entry in drained {
            let _ = entry.reply.send(Err(RequestError::Closed));
        }
        self.inner.sink.close().await;
        self.inner.publish(EngineEvent::Closed);
    }
}

impl Drop for CorrelationEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn run_dispatch_loop(inner: Arc<EngineInner>, mut events: mpsc::Receiver<SessionEvent>) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(SessionEvent::Stanza(stanza)) => {
                    inner.dispatch(&stanza);
                }
                Some(SessionEvent::Error(err)) => {
                    log::warn!("harmony({}): transport error: {}", inner.label, err);
                    inner.publish(EngineEvent::TransportError(err));
                }
                None => {
                    log::info!("harmony({}): session ended", inner.label);
                    inner.publish(EngineEvent::TransportError(TransportError::disconnected(
                        "session ended",
                    )));
                    break;
                }
            },
        }
    }
    log::debug!("harmony({}): dispatch loop stopped", inner.label);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturates_instead_of_truncating() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}

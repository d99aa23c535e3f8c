use std::sync::Arc;

use harmony_stanza::{DecodedPayload, InboundStanza, PayloadFormat, RequestIds, StanzaId};
use tokio::sync::oneshot;

use crate::error::RequestError;

/// Caller-supplied test deciding whether an inbound stanza answers a request.
pub type StanzaPredicate = Arc<dyn Fn(&InboundStanza) -> bool + Send + Sync>;

pub(crate) type ReplySender = oneshot::Sender<Result<DecodedPayload, RequestError>>;

pub(crate) enum Matcher {
    /// The reply echoes the request's correlation id.
    ReplyId,
    Custom(StanzaPredicate),
}

pub(crate) struct PendingRequest {
    pub(crate) id: StanzaId,
    pub(crate) matcher: Matcher,
    pub(crate) format: PayloadFormat,
    pub(crate) reply: ReplySender,
}

impl PendingRequest {
    fn matches(&self, stanza: &InboundStanza) -> bool {
        match &self.matcher {
            Matcher::ReplyId => stanza.id == Some(self.id),
            Matcher::Custom(predicate) => predicate(stanza),
        }
    }
}

/// Outstanding requests in issue order.
///
/// Matching scans for the first entry whose matcher accepts the stanza and
/// removes only that entry; the rest keep their relative order.
pub(crate) struct PendingSet {
    entries: Vec<PendingRequest>,
    ids: RequestIds,
    closed: bool,
}

impl PendingSet {
    pub(crate) fn new(ids: RequestIds) -> Self {
        Self {
            entries: Vec::new(),
            ids,
            closed: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn contains(&self, id: StanzaId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Next id not used by any outstanding request.
    pub(crate) fn allocate_id(&mut self) -> Result<StanzaId, RequestError> {
        if self.closed {
            return Err(RequestError::Closed);
        }
        let entries = &self.entries;
        self.ids
            .next_free(|id| entries.iter().any(|entry| entry.id == id))
            .ok_or(RequestError::IdsExhausted)
    }

    /// Registers a request; hands it back with `Closed` once the set is closed.
    pub(crate) fn insert(
        &mut self,
        entry: PendingRequest,
    ) -> Result<(), (PendingRequest, RequestError)> {
        if self.closed {
            return Err((entry, RequestError::Closed));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Removes and returns the oldest live entry accepting `stanza`. Entries
    /// whose caller stopped waiting are pruned first.
    pub(crate) fn take_match(&mut self, stanza: &InboundStanza) -> Option<PendingRequest> {
        self.entries.retain(|entry| !entry.reply.is_closed());
        let index = self.entries.iter().position(|entry| entry.matches(stanza))?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn remove(&mut self, id: StanzaId) -> Option<PendingRequest> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Marks the set closed and returns every outstanding request.
    pub(crate) fn close(&mut self) -> Vec<PendingRequest> {
        self.closed = true;
        std::mem::take(&mut self.entries)
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<StanzaId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }
}

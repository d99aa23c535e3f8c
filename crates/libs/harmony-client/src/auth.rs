use std::sync::Arc;
use std::time::Duration;

use harmony_stanza::{decode_delimited, encode_pair_request, RequestIds, StanzaId};

use crate::config::{ClientConfig, HubEndpoint};
use crate::engine::millis;
use crate::error::{AuthError, AuthPhase, TransportError};
use crate::transport::{Credentials, Session, SessionEvent, Transport};

/// Runs the two-phase hub login.
///
/// A provisional guest session asks the hub for a pairing identity, then a
/// durable session is opened with that identity as both username and secret.
/// Nothing is retried here; a failure in any phase fails the whole handshake.
pub struct Authenticator<T: ?Sized> {
    transport: Arc<T>,
    client_name: String,
    pairing_timeout: Duration,
    label: String,
}

impl<T: Transport + ?Sized> Authenticator<T> {
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        Self {
            transport,
            client_name: config.client_name.clone(),
            pairing_timeout: config.pairing_timeout(),
            label: config.label.clone(),
        }
    }

    pub async fn authenticate(&self, endpoint: &HubEndpoint) -> Result<Session, AuthError> {
        let identity = self.request_identity(endpoint).await?;
        self.login_with_identity(endpoint, &identity).await
    }

    /// Phase one: pair as guest and return the granted identity token. The
    /// guest session is closed whatever the outcome.
    pub async fn request_identity(&self, endpoint: &HubEndpoint) -> Result<String, AuthError> {
        log::info!("harmony({}): pairing as guest with {}", self.label, endpoint);
        let mut session = self
            .transport
            .connect(endpoint, &Credentials::guest())
            .await
            .map_err(|source| AuthError::Transport {
                phase: AuthPhase::Guest,
                source,
            })?;

        let pair = encode_pair_request(RequestIds::new().next_id(), &self.client_name);
        let pair_id = pair.id;
        let outcome = match session.send(pair).await {
            Ok(()) => self.await_identity(&mut session, pair_id).await,
            Err(source) => Err(AuthError::Transport {
                phase: AuthPhase::Pairing,
                source,
            }),
        };
        session.close().await;
        outcome
    }

    /// Phase two: open the durable session.
    pub async fn login_with_identity(
        &self,
        endpoint: &HubEndpoint,
        identity: &str,
    ) -> Result<Session, AuthError> {
        let credentials = Credentials::from_identity(identity);
        log::info!("harmony({}): logging in as {}", self.label, credentials.jid());
        self.transport
            .connect(endpoint, &credentials)
            .await
            .map_err(|source| AuthError::Transport {
                phase: AuthPhase::Identity,
                source,
            })
    }

    async fn await_identity(
        &self,
        session: &mut Session,
        pair_id: StanzaId,
    ) -> Result<String, AuthError> {
        let label = &self.label;
        let wait = async {
            loop {
                match session.next_event().await {
                    Some(SessionEvent::Stanza(stanza)) if stanza.id == Some(pair_id) => {
                        let reply = decode_delimited(stanza.payload.as_deref());
                        return match reply.get("identity") {
                            Some(identity) if !identity.is_empty() => {
                                log::debug!("harmony({label}): received identity token");
                                Ok(identity.clone())
                            }
                            _ => {
                                log::warn!("harmony({label}): pairing reply carried no identity");
                                Err(AuthError::IdentityNotGranted)
                            }
                        };
                    }
                    Some(SessionEvent::Stanza(stanza)) => {
                        log::debug!(
                            "harmony({label}): ignoring stanza {:?} while pairing",
                            stanza.id
                        );
                    }
                    Some(SessionEvent::Error(source)) => {
                        return Err(AuthError::Transport {
                            phase: AuthPhase::Pairing,
                            source,
                        });
                    }
                    None => {
                        return Err(AuthError::Transport {
                            phase: AuthPhase::Pairing,
                            source: TransportError::disconnected(
                                "guest session ended before the pairing reply",
                            ),
                        });
                    }
                }
            }
        };
        tokio::time::timeout(self.pairing_timeout, wait)
            .await
            .map_err(|_| AuthError::Timeout {
                after_ms: millis(self.pairing_timeout),
            })?
    }
}

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use harmony_stanza::{encode_action, DecodedPayload, InboundStanza, PayloadFormat};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::engine::{CommandRequest, CorrelationEngine, EngineEvent};
use crate::error::{ClientError, RequestError};
use crate::pending::StanzaPredicate;
use crate::transport::{Session, Transport};
use crate::types::{Activity, HubConfig, StateDigest, POWER_OFF_ACTIVITY};

/// Whether a held button goes down or comes back up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldStatus {
    Press,
    Release,
}

impl HoldStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::Release => "release",
        }
    }
}

/// High-level hub operations composed from [`CorrelationEngine`] requests.
pub struct HarmonyClient {
    engine: CorrelationEngine,
    label: String,
}

impl HarmonyClient {
    /// Authenticates against `config.endpoint()` and starts the engine on the
    /// durable session.
    pub async fn connect<T: Transport + ?Sized>(
        transport: Arc<T>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let session = Authenticator::new(transport, config)
            .authenticate(&config.endpoint())
            .await?;
        Ok(Self::from_session(session, config))
    }

    pub fn from_session(session: Session, config: &ClientConfig) -> Self {
        Self {
            engine: CorrelationEngine::start(session, config),
            label: config.label.clone(),
        }
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine.subscribe()
    }

    pub async fn request(&self, request: CommandRequest) -> Result<DecodedPayload, RequestError> {
        self.engine.request(request).await
    }

    pub async fn send(&self, command: &str, body: Option<&str>) -> Result<(), RequestError> {
        self.engine.send(command, body).await
    }

    /// Id of the running activity; `"-1"` when off.
    pub async fn get_current_activity(&self) -> Result<String, ClientError> {
        log::debug!("harmony({}): retrieve current activity", self.label);
        let reply = self.engine.request(CommandRequest::new("getCurrentActivity")).await?;
        reply
            .field("result")
            .map(str::to_owned)
            .ok_or(ClientError::MissingField { field: "result" })
    }

    /// The hub's raw configuration catalog.
    pub async fn get_available_commands(&self) -> Result<JsonValue, ClientError> {
        log::debug!("harmony({}): retrieve available commands", self.label);
        let reply = self
            .engine
            .request(CommandRequest::new("config").format(PayloadFormat::Json))
            .await?;
        Ok(reply.into_json()?)
    }

    pub async fn get_hub_config(&self) -> Result<HubConfig, ClientError> {
        Ok(HubConfig::from_value(self.get_available_commands().await?)?)
    }

    pub async fn get_activities(&self) -> Result<Vec<Activity>, ClientError> {
        log::debug!("harmony({}): retrieve activities", self.label);
        Ok(self.get_hub_config().await?.activity)
    }

    /// Starts `activity_id` and waits for the state digest reporting it as
    /// settled. The direct reply to the start command is not the confirmation.
    pub async fn start_activity(&self, activity_id: &str) -> Result<StateDigest, ClientError> {
        log::info!("harmony({}): start activity {}", self.label, activity_id);
        let body = format!("activityId={activity_id}:timestamp={}", unix_millis());
        let request = CommandRequest::new("startactivity")
            .body(body)
            .format(PayloadFormat::Json)
            .matching(confirmation_of(activity_id));
        let reply = self.engine.request(request).await?;
        Ok(StateDigest::from_value(reply.into_json()?)?)
    }

    /// Stops the running activity by starting the power-off activity.
    pub async fn turn_off(&self) -> Result<StateDigest, ClientError> {
        log::info!("harmony({}): turn off", self.label);
        self.start_activity(POWER_OFF_ACTIVITY).await
    }

    pub async fn is_off(&self) -> Result<bool, ClientError> {
        let activity_id = self.get_current_activity().await?;
        let off = activity_id == POWER_OFF_ACTIVITY;
        if off {
            log::debug!("harmony({}): system is currently off", self.label);
        } else {
            log::debug!("harmony({}): system is on with activity {}", self.label, activity_id);
        }
        Ok(off)
    }

    /// Presses or releases a device button. `action` is a
    /// [`DeviceFunction::action`](crate::DeviceFunction::action) descriptor.
    pub async fn hold_action(&self, action: &str, status: HoldStatus) -> Result<(), ClientError> {
        let body = format!("action={}:status={}", encode_action(action), status.as_str());
        self.engine.send("holdAction", Some(&body)).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.engine.close().await;
    }
}

/// Matches the state digest that reports `activity_id` as settled.
pub fn confirmation_of(activity_id: &str) -> StanzaPredicate {
    let activity_id = activity_id.to_owned();
    Arc::new(move |stanza: &InboundStanza| {
        stanza
            .state_digest()
            .and_then(|text| StateDigest::from_json(text).ok())
            .is_some_and(|digest| digest.confirms(&activity_id))
    })
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

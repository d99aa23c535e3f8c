use std::sync::Arc;
use std::time::Duration;

use harmony_client::stanza::{decode_delimited, InboundStanza, OutboundStanza};
use harmony_client::{
    Activity, ClientConfig, ClientError, HarmonyClient, HoldStatus, RequestError,
    POWER_OFF_ACTIVITY,
};
use harmony_test_support::{
    activity_responder, reply_to, state_digest, Responder, SimulatedHub,
};
use serde_json::{json, Value as JsonValue};

fn catalog() -> JsonValue {
    json!({
        "activity": [
            {"id": "-1", "label": "PowerOff"},
            {"id": "1", "label": "Watch TV", "isAVActivity": true}
        ],
        "device": [{
            "id": "38",
            "label": "Receiver",
            "controlGroup": [{
                "name": "Volume",
                "function": [{
                    "name": "VolumeUp",
                    "label": "Volume Up",
                    "action": "{\"command\":\"VolumeUp\",\"type\":\"IRCommand\",\"deviceId\":\"38\"}"
                }]
            }]
        }]
    })
}

async fn client_for(hub: SimulatedHub) -> (Arc<SimulatedHub>, HarmonyClient) {
    let _ = env_logger::builder().is_test(true).try_init();
    let hub = Arc::new(hub);
    let config = ClientConfig::new("hub.local")
        .with_label("facade")
        .with_request_timeout_ms(2_000);
    let client = HarmonyClient::connect(hub.clone(), &config).await.expect("connect");
    (hub, client)
}

async fn scripted(current: &str) -> (Arc<SimulatedHub>, HarmonyClient) {
    client_for(hub_with(activity_responder(catalog(), current))).await
}

fn hub_with(responder: Responder) -> SimulatedHub {
    SimulatedHub::granting("ABC123").with_responder(responder)
}

fn last_command<'a>(received: &'a [OutboundStanza], command: &str) -> &'a OutboundStanza {
    received
        .iter()
        .rev()
        .find(|stanza| stanza.command() == Some(command))
        .unwrap_or_else(|| panic!("{command} was never sent"))
}

#[tokio::test]
async fn current_activity_and_off_state() {
    let (_hub, client) = scripted("1").await;
    assert_eq!(client.get_current_activity().await.expect("current"), "1");
    assert!(!client.is_off().await.expect("is_off"));

    let (_hub, client) = scripted(POWER_OFF_ACTIVITY).await;
    assert!(client.is_off().await.expect("is_off"));
}

#[tokio::test]
async fn current_activity_without_result_field() {
    let responder = Arc::new(|stanza: &OutboundStanza| vec![reply_to(stanza, "status=ok")]);
    let (_hub, client) = client_for(hub_with(responder)).await;

    assert_eq!(
        client.get_current_activity().await,
        Err(ClientError::MissingField { field: "result" })
    );
}

#[tokio::test]
async fn activities_come_from_the_config_catalog() {
    let responder = Arc::new(|stanza: &OutboundStanza| {
        vec![reply_to(stanza, r#"{"activity":[{"id":"1","label":"Watch TV"}]}"#)]
    });
    let (hub, client) = client_for(hub_with(responder)).await;

    let activities = client.get_activities().await.expect("activities");

    assert_eq!(activities, vec![Activity::new("1", "Watch TV")]);
    assert_eq!(hub.received_commands(), vec!["config".to_owned()]);
}

#[tokio::test]
async fn hub_config_exposes_devices_and_raw_catalog() {
    let (_hub, client) = scripted("-1").await;

    let raw = client.get_available_commands().await.expect("raw catalog");
    assert_eq!(raw, catalog());

    let config = client.get_hub_config().await.expect("typed catalog");
    assert_eq!(config.activity_by_label("Watch TV").map(|a| a.id.as_str()), Some("1"));
    let receiver = config.device_by_label("Receiver").expect("receiver");
    let volume_up = receiver.find_function("Volume", "VolumeUp").expect("function");
    assert!(volume_up.action.contains("IRCommand"));
}

#[tokio::test]
async fn start_activity_waits_for_the_settled_digest() {
    let (hub, client) = scripted("-1").await;
    let mut events = client.subscribe();

    let digest = client.start_activity("1").await.expect("started");

    assert_eq!(digest.activity_id, "1");
    assert_eq!(digest.activity_status, 2);
    let received = hub.received();
    let start = last_command(&received, "startactivity");
    let body = decode_delimited(Some(start.payload.as_str()));
    assert_eq!(body.get("activityId").map(String::as_str), Some("1"));
    assert!(body.get("timestamp").is_some_and(|ts| ts.parse::<u128>().is_ok()));

    // The transitional digest is still published to subscribers.
    let first = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event")
        .expect("open");
    assert!(matches!(
        first,
        harmony_client::EngineEvent::StateDigest(ref d) if d.activity_status == 1
    ));
    assert_eq!(client.get_current_activity().await.expect("current"), "1");
}

#[tokio::test]
async fn turn_off_starts_the_power_off_activity() {
    let (hub, client) = scripted("1").await;

    let digest = client.turn_off().await.expect("off");

    assert_eq!(digest.activity_id, POWER_OFF_ACTIVITY);
    assert_eq!(digest.activity_status, 0);
    let received = hub.received();
    let start = last_command(&received, "startactivity");
    assert!(start.payload.starts_with("activityId=-1:timestamp="));
    assert!(client.is_off().await.expect("is_off"));
}

#[tokio::test]
async fn direct_reply_and_wrong_digests_do_not_confirm_a_start() {
    // Acknowledges directly, then reports other activities and the target as
    // still starting; never confirms.
    let responder = Arc::new(|stanza: &OutboundStanza| {
        vec![
            reply_to(stanza, r#"{"activityId":"1","activityStatus":2}"#),
            state_digest("7", 2),
            state_digest("1", 1),
        ]
    });
    let (hub, client) = client_for(hub_with(responder)).await;

    let pending = client.request(
        harmony_client::CommandRequest::new("startactivity")
            .body("activityId=1:timestamp=0")
            .format(harmony_client::stanza::PayloadFormat::Json)
            .matching(harmony_client::confirmation_of("1"))
            .timeout(Duration::from_millis(100)),
    );
    assert!(matches!(pending.await, Err(RequestError::Timeout { .. })));

    let late = async {
        hub.wait_for_received(3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.push(state_digest("1", 2)).await;
    };
    let (started, ()) = tokio::join!(client.start_activity("1"), late);
    assert_eq!(started.expect("confirmed").activity_status, 2);
}

#[tokio::test]
async fn hold_action_escapes_colons_and_sends_without_waiting() {
    let (hub, client) = client_for(SimulatedHub::granting("ABC123")).await;
    let action = r#"{"command":"VolumeUp","type":"IRCommand","deviceId":"38"}"#;

    client.hold_action(action, HoldStatus::Press).await.expect("press");
    client.hold_action(action, HoldStatus::Release).await.expect("release");

    let received = hub.received();
    let holds: Vec<&OutboundStanza> = received
        .iter()
        .filter(|stanza| stanza.command() == Some("holdAction"))
        .collect();
    assert_eq!(holds.len(), 2);
    assert_eq!(
        holds[0].payload,
        r#"action={"command"::"VolumeUp","type"::"IRCommand","deviceId"::"38"}:status=press"#
    );
    assert!(holds[1].payload.ends_with(":status=release"));
    assert_eq!(client.engine().pending_len(), 0);
}

#[tokio::test]
async fn unsolicited_stanzas_without_waiters_are_dropped() {
    let (hub, client) = scripted("1").await;

    assert!(hub.push(InboundStanza::reply(424_242, "result=9")).await);

    assert_eq!(client.get_current_activity().await.expect("current"), "1");
}

#[tokio::test]
async fn abandoned_start_does_not_swallow_the_next_confirmation() {
    let (hub, client) = client_for(SimulatedHub::granting("ABC123")).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), client.start_activity("1")).await;
    assert!(abandoned.is_err());
    assert_eq!(client.engine().pending_len(), 0);

    let confirm = async {
        // Pairing request plus both starts.
        hub.wait_for_received(3).await;
        hub.push(state_digest("1", 2)).await;
    };
    let (started, ()) = tokio::join!(client.start_activity("1"), confirm);

    let digest = started.expect("retry confirmed");
    assert_eq!(digest.activity_id, "1");
    assert_eq!(client.engine().pending_len(), 0);
}

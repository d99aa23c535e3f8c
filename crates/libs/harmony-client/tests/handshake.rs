use std::sync::Arc;

use harmony_client::{
    AuthError, AuthPhase, Authenticator, ClientConfig, ClientError, Credentials, HarmonyClient,
    TransportError,
};
use harmony_test_support::{Pairing, SimulatedHub};

fn config() -> ClientConfig {
    ClientConfig::new("192.168.1.20").with_label("test-hub")
}

#[tokio::test]
async fn pairs_as_guest_then_logs_in_with_granted_identity() {
    let _ = env_logger::builder().is_test(true).try_init();
    let hub = Arc::new(SimulatedHub::granting("ABC123"));

    let session = Authenticator::new(hub.clone(), &config())
        .authenticate(&config().endpoint())
        .await
        .expect("handshake");

    assert_eq!(
        hub.connections(),
        vec![Credentials::guest(), Credentials::from_identity("ABC123")]
    );
    assert_eq!(hub.closed_sessions(), 1, "guest session must be closed");

    let pair = &hub.received()[0];
    assert!(pair.is_pairing());
    assert_eq!(pair.from.as_deref(), Some("guest"));
    assert!(pair.payload.starts_with("method=pair:name="));

    session.close().await;
    assert_eq!(hub.closed_sessions(), 2);
}

#[test]
fn durable_credentials_use_identity_as_secret() {
    let credentials = Credentials::from_identity("ABC123");
    assert_eq!(credentials.identity(), "ABC123");
    assert_eq!(credentials.secret(), "ABC123");
    assert_eq!(credentials.jid(), "ABC123@connect.logitech.com/gatorade");
    assert_eq!(Credentials::guest().jid(), "guest@x.com/gatorade");
}

#[tokio::test]
async fn reply_without_identity_is_not_granted() {
    let hub = Arc::new(SimulatedHub::with_pairing(Pairing::Withhold));

    let err = Authenticator::new(hub.clone(), &config())
        .authenticate(&config().endpoint())
        .await
        .expect_err("no identity");

    assert_eq!(err, AuthError::IdentityNotGranted);
    assert!(!err.is_retryable());
    assert_eq!(hub.connections(), vec![Credentials::guest()]);
    assert_eq!(hub.closed_sessions(), 1);
}

#[tokio::test]
async fn refused_durable_login_reports_identity_phase() {
    let hub = Arc::new(SimulatedHub::granting("ABC123").refusing("ABC123"));

    let err = HarmonyClient::connect(hub.clone(), &config())
        .await
        .err()
        .expect("login refused");

    match err {
        ClientError::Auth(AuthError::Transport { phase, source }) => {
            assert_eq!(phase, AuthPhase::Identity);
            assert!(matches!(source, TransportError::Refused { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(hub.connections().len(), 2);
}

#[tokio::test]
async fn refused_guest_login_reports_guest_phase() {
    let hub = Arc::new(SimulatedHub::granting("ABC123").refusing("guest"));

    let err = Authenticator::new(hub.clone(), &config())
        .request_identity(&config().endpoint())
        .await
        .expect_err("guest refused");

    assert!(matches!(
        err,
        AuthError::Transport {
            phase: AuthPhase::Guest,
            ..
        }
    ));
    assert_eq!(hub.connections(), vec![Credentials::guest()]);
}

#[tokio::test]
async fn silent_hub_times_out_pairing() {
    let hub = Arc::new(SimulatedHub::with_pairing(Pairing::Ignore));
    let config = config().with_pairing_timeout_ms(50);

    let err = Authenticator::new(hub.clone(), &config)
        .authenticate(&config.endpoint())
        .await
        .expect_err("no pairing reply");

    assert_eq!(err, AuthError::Timeout { after_ms: 50 });
    assert!(err.is_retryable());
    assert_eq!(hub.closed_sessions(), 1, "guest session closed after timeout");
    assert_eq!(hub.connections().len(), 1);
}

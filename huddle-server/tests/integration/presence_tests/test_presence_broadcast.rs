use huddle_core::{EnvelopeBody, PresenceStatus, UserId, signaling};
use std::time::Duration;

use crate::integration::{init_tracing, online, spawn_server};

#[tokio::test]
async fn test_presence_broadcast() {
    init_tracing();
    let (url, service) = spawn_server().await;

    let mut alice = online(&url, &service, "alice").await;
    let mut bob = online(&url, &service, "bob").await;

    let announced = alice.recv_kind("userStatus").await.expect("No online status");
    match announced.body {
        EnvelopeBody::UserStatus(s) => {
            assert_eq!(s.user_id, UserId::from("bob"));
            assert_eq!(s.status, PresenceStatus::Online);
        }
        other => panic!("Expected userStatus, got {other:?}"),
    }

    // Malformed input and server-only envelopes are dropped; the socket stays usable.
    bob.send_raw("{not json").await.expect("Send failed");
    bob.send(signaling::user_joined("bob".into(), "R1".into(), None))
        .await
        .expect("Send failed");
    alice
        .expect_silence(Duration::from_millis(300))
        .await
        .expect("Dropped input must not be relayed");

    bob.send(signaling::presence("bob".into(), PresenceStatus::Away))
        .await
        .expect("Send failed");
    let away = alice.recv().await.expect("No away status");
    assert!(matches!(
        away.body,
        EnvelopeBody::UserStatus(ref s) if s.status == PresenceStatus::Away
    ));
}

use huddle_core::{SignalType, signaling};
use serde_json::json;
use std::time::Duration;

use crate::integration::{init_tracing, join, online, spawn_server};

#[tokio::test]
async fn test_broadcast_signal() {
    init_tracing();
    let (url, service) = spawn_server().await;

    let mut alice = online(&url, &service, "alice").await;
    let mut bob = online(&url, &service, "bob").await;
    let mut carol = online(&url, &service, "carol").await;
    let mut dave = online(&url, &service, "dave").await;
    for client in [&mut alice, &mut bob, &mut carol] {
        join(client, &service, "R1").await;
    }
    for client in [&mut alice, &mut bob, &mut carol, &mut dave] {
        client.flush().await;
    }

    alice
        .send(signaling::call_signal(
            SignalType::CallStart,
            "R1".into(),
            "alice".into(),
            json!({"video": true, "audio": true}),
            None,
        ))
        .await
        .expect("Send failed");

    for client in [&mut bob, &mut carol] {
        let envelope = client.recv().await.expect("No call-start");
        let signal = envelope.as_call_signal().expect("Not a call signal");
        assert_eq!(signal.signal_type, SignalType::CallStart);
        assert!(signal.is_broadcast());
    }

    alice
        .expect_silence(Duration::from_millis(300))
        .await
        .expect("Sender must not receive its own broadcast");
    dave.expect_silence(Duration::from_millis(100))
        .await
        .expect("Non-member must not receive room broadcast");
}

use huddle_core::{EnvelopeBody, MessageType, signaling};
use std::time::Duration;

use crate::integration::{init_tracing, join, online, spawn_server};

#[tokio::test]
async fn test_chat_relay() {
    init_tracing();
    let (url, service) = spawn_server().await;

    let mut alice = online(&url, &service, "alice").await;
    let mut bob = online(&url, &service, "bob").await;
    let mut carol = online(&url, &service, "carol").await;
    join(&mut alice, &service, "R1").await;
    join(&mut bob, &service, "R1").await;
    for client in [&mut alice, &mut bob, &mut carol] {
        client.flush().await;
    }

    alice
        .send(signaling::chat_message(
            "alice".into(),
            "R1",
            "hello room",
            None,
            Vec::new(),
        ))
        .await
        .expect("Send failed");

    let received = bob.recv().await.expect("Bob got nothing");
    match received.body {
        EnvelopeBody::Message(m) => {
            assert_eq!(m.text, "hello room");
            assert_eq!(m.message_type, MessageType::Text);
        }
        other => panic!("Expected message, got {other:?}"),
    }
    carol
        .expect_silence(Duration::from_millis(200))
        .await
        .expect("Room chat leaked outside the room");

    alice
        .send(signaling::chat_message(
            "alice".into(),
            "dm-alice-carol",
            "psst",
            Some("carol".into()),
            Vec::new(),
        ))
        .await
        .expect("Send failed");

    let direct = carol.recv_kind("message").await.expect("Carol got nothing");
    assert!(matches!(direct.body, EnvelopeBody::Message(ref m) if m.text == "psst"));
    bob.expect_silence(Duration::from_millis(200))
        .await
        .expect("Direct message leaked to bob");
}

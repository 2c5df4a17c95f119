use huddle_client::TransportClient;
use huddle_core::{EnvelopeBody, UserId};
use std::time::Duration;

use crate::integration::{fast_reconnect, init_tracing};
use crate::utils::{FakeConnector, next_session};

#[tokio::test]
async fn test_connect_registers_first() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let transport = TransportClient::new(fast_reconnect(3), connector.clone());

    assert!(transport.connect("alice".into(), "Alice").await);
    assert!(transport.is_connected());

    let mut server = next_session(&mut sessions).await;
    let first = server.recv().await.expect("Nothing sent");
    assert!(first.id.is_some(), "Every sent envelope carries an id");
    match first.body {
        EnvelopeBody::Register(r) => {
            assert_eq!(r.user_id, UserId::from("alice"));
            assert_eq!(r.username, "Alice");
        }
        other => panic!("Expected register first, got {other:?}"),
    }

    assert!(transport.connect("alice".into(), "Alice").await);
    assert_eq!(connector.opens(), 1, "Second connect must not open again");
    server
        .expect_silence(Duration::from_millis(100))
        .await
        .expect("Second connect must not register again");
}

#[tokio::test(start_paused = true)]
async fn test_initial_connect_failure_does_not_retry() {
    init_tracing();
    let (connector, _sessions) = FakeConnector::new();
    connector.set_accepting(false);
    let transport = TransportClient::new(fast_reconnect(3), connector.clone());

    assert!(!transport.connect("alice".into(), "Alice").await);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(connector.opens(), 1);
    assert!(!transport.is_connected());
}

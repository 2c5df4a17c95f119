use huddle_client::TransportClient;
use huddle_core::EnvelopeBody;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::integration::{fast_reconnect, init_tracing};
use crate::utils::{FakeConnector, next_session, wait_until};

#[tokio::test]
async fn test_reconnect_reregisters() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let transport = TransportClient::new(fast_reconnect(3), connector.clone());

    let changes = Arc::new(Mutex::new(Vec::new()));
    let c = changes.clone();
    transport.on_connection_change(move |up| c.lock().unwrap().push(*up));

    assert!(transport.connect("alice".into(), "Alice").await);
    let first = next_session(&mut sessions).await;
    drop(first);

    let mut second = next_session(&mut sessions).await;
    let register = second.recv().await.expect("Nothing sent after reconnect");
    assert!(matches!(register.body, EnvelopeBody::Register(ref r) if r.username == "Alice"));

    assert!(wait_until(|| changes.lock().unwrap().len() == 3).await);
    assert_eq!(*changes.lock().unwrap(), vec![true, false, true]);
    assert_eq!(transport.reconnect_attempts(), 0, "A successful open resets the count");
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_attempts_are_capped() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let transport = TransportClient::new(fast_reconnect(3), connector.clone());

    assert!(transport.connect("alice".into(), "Alice").await);
    let session = next_session(&mut sessions).await;

    connector.set_accepting(false);
    drop(session);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.opens(), 1 + 3);
    assert_eq!(transport.reconnect_attempts(), 3);
    assert!(!transport.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let transport = TransportClient::new(fast_reconnect(3), connector.clone());

    assert!(transport.connect("alice".into(), "Alice").await);
    drop(next_session(&mut sessions).await);
    tokio::task::yield_now().await;

    transport.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.opens(), 1);
}

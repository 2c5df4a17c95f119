use huddle_client::TransportClient;
use huddle_core::{PresenceStatus, signaling};
use std::sync::{Arc, Mutex};

use crate::integration::{fast_reconnect, init_tracing};
use crate::utils::{FakeConnector, next_session};

#[tokio::test]
async fn test_send_when_closed() {
    init_tracing();
    let (connector, mut sessions) = FakeConnector::new();
    let transport = TransportClient::new(fast_reconnect(3), connector);

    let status = || signaling::presence("alice".into(), PresenceStatus::Away);
    assert!(!transport.send(status()), "Never opened");

    let changes = Arc::new(Mutex::new(Vec::new()));
    let c = changes.clone();
    transport.on_connection_change(move |up| c.lock().unwrap().push(*up));

    assert!(transport.connect("alice".into(), "Alice").await);
    let mut server = next_session(&mut sessions).await;
    assert!(transport.send(status()));
    server.recv_kind("userStatus").await.expect("Not delivered");

    transport.disconnect();
    assert!(!transport.send(status()), "Closed by the user");
    assert!(!transport.is_connected());
    assert_eq!(*changes.lock().unwrap(), vec![true, false]);
}

use huddle_core::{SessionDescription, SignalType, signaling};
use std::time::Duration;

use crate::integration::{init_tracing, join, online, spawn_server};

#[tokio::test]
async fn test_addressed_signal() {
    init_tracing();
    let (url, service) = spawn_server().await;

    let mut alice = online(&url, &service, "alice").await;
    let mut bob = online(&url, &service, "bob").await;
    let mut carol = online(&url, &service, "carol").await;
    for client in [&mut alice, &mut bob, &mut carol] {
        join(client, &service, "R1").await;
    }
    bob.flush().await;
    carol.flush().await;

    let offer = signaling::call_signal(
        SignalType::Offer,
        "R1".into(),
        "alice".into(),
        SessionDescription::offer("v=0 alice").to_value(),
        Some("bob".into()),
    );
    let sent_id = offer.id.clone();
    alice.send(offer).await.expect("Send failed");

    let relayed = bob.recv().await.expect("Bob got nothing");
    assert_eq!(relayed.id, sent_id, "Relay must keep the envelope id");
    let signal = relayed.as_call_signal().expect("Not a call signal");
    assert_eq!(signal.signal_type, SignalType::Offer);
    assert_eq!(signal.sender_id.as_str(), "alice");
    assert_eq!(signal.description().expect("Bad description").sdp, "v=0 alice");

    carol
        .expect_silence(Duration::from_millis(300))
        .await
        .expect("Addressed signal leaked to carol");
}

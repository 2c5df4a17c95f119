use huddle_client::{CallError, MediaConstraints, MediaError, MediaKind};
use huddle_core::{CallStartPayload, EnvelopeBody, SignalType};
use std::time::Duration;

use crate::integration::Harness;
use crate::integration::call_tests::request;
use crate::integration::init_tracing;

#[tokio::test]
async fn test_initialize_announces_before_joining() {
    init_tracing();
    let mut h = Harness::connect("alice").await;

    let local = h
        .manager
        .initialize_call(request("alice"), MediaConstraints::new(true, true))
        .await
        .expect("Failed to start call");
    assert!(local.has(MediaKind::Audio) && local.has(MediaKind::Video));

    let announce = h.server.recv().await.expect("Nothing sent");
    let signal = announce.as_call_signal().expect("Expected call-start first");
    assert_eq!(signal.signal_type, SignalType::CallStart);
    assert!(signal.is_broadcast());
    let payload: CallStartPayload =
        serde_json::from_value(signal.payload.clone()).expect("Bad call-start payload");
    assert_eq!(payload.conversation_id.as_deref(), Some("conv-1"));
    assert_eq!(payload.call_session_id.as_deref(), Some("session-1"));
    assert!(payload.video && payload.audio);

    let join = h.server.recv().await.expect("No joinRoom");
    match join.body {
        EnvelopeBody::JoinRoom(m) => {
            assert_eq!(m.room_id.as_str(), "R1");
            assert_eq!(m.username.as_deref(), Some("ALICE"));
        }
        other => panic!("Expected joinRoom, got {other:?}"),
    }

    let snapshot = h.manager.snapshot().await.expect("No active call");
    assert!(snapshot.media.audio && snapshot.media.video);
    assert!(snapshot.peers.is_empty());
}

#[tokio::test]
async fn test_join_call_does_not_announce() {
    init_tracing();
    let mut h = Harness::connect("bob").await;

    h.manager
        .join_call(request("bob"), MediaConstraints::audio_only())
        .await
        .expect("Failed to join call");

    let first = h.server.recv().await.expect("Nothing sent");
    assert_eq!(first.kind(), "joinRoom");
    h.server
        .expect_silence(Duration::from_millis(100))
        .await
        .expect("Nothing else expected");

    let snapshot = h.manager.snapshot().await.expect("No active call");
    assert!(snapshot.media.audio);
    assert!(!snapshot.media.video);
}

#[tokio::test]
async fn test_media_failure_is_surfaced() {
    init_tracing();
    let mut h = Harness::connect("alice").await;
    h.devices
        .fail_user_media(MediaError::PermissionDenied("camera".into()));

    let result = h
        .manager
        .initialize_call(request("alice"), MediaConstraints::new(true, true))
        .await;

    assert!(matches!(
        result,
        Err(CallError::Media(MediaError::PermissionDenied(_)))
    ));
    assert!(h.manager.snapshot().await.is_none());
    h.server
        .expect_silence(Duration::from_millis(100))
        .await
        .expect("Nothing is sent when media fails");
}

#[tokio::test]
async fn test_second_call_is_rejected() {
    init_tracing();
    let h = Harness::connect("alice").await;
    h.manager
        .initialize_call(request("alice"), MediaConstraints::audio_only())
        .await
        .expect("Failed to start call");

    let again = h
        .manager
        .join_call(request("alice"), MediaConstraints::audio_only())
        .await;
    assert!(matches!(again, Err(CallError::AlreadyInCall(ref room)) if room.as_str() == "R1"));
}

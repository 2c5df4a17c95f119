use huddle_client::{MediaConstraints, MediaKind};
use huddle_core::{SessionDescription, SignalType};

use crate::integration::Harness;
use crate::integration::call_tests::{
    connect_peer, recv_signal, request, signal_from, tracks_of,
};
use crate::integration::init_tracing;
use crate::utils::{EventLog, fake_sdp};

#[tokio::test]
async fn test_toggles_report_applied_state() {
    init_tracing();
    let h = Harness::connect("alice").await;
    assert!(!h.manager.toggle_audio().await, "No call, nothing to toggle");

    let local = h
        .manager
        .initialize_call(request("alice"), MediaConstraints::new(true, true))
        .await
        .expect("Failed to start call");

    let muted = h.manager.toggle_audio().await;
    assert!(!muted);
    assert!(local.tracks_of(MediaKind::Audio).iter().all(|t| t.is_enabled() == muted));
    assert!(local.tracks_of(MediaKind::Video).iter().all(|t| t.is_enabled()));

    let unmuted = h.manager.toggle_audio().await;
    assert!(unmuted);
    assert!(local.tracks_of(MediaKind::Audio).iter().all(|t| t.is_enabled() == unmuted));

    let video = h.manager.toggle_video().await;
    assert!(!video);
    assert!(local.tracks_of(MediaKind::Video).iter().all(|t| !t.is_enabled()));

    let snapshot = h.manager.snapshot().await.expect("No active call");
    assert!(snapshot.media.audio);
    assert!(!snapshot.media.video);
}

#[tokio::test]
async fn test_enabling_missing_video_acquires_and_renegotiates() {
    init_tracing();
    let mut h = Harness::connect("alice").await;
    let events = EventLog::attach(&h.manager);
    let local = h
        .manager
        .initialize_call(request("alice"), MediaConstraints::audio_only())
        .await
        .expect("Failed to start call");
    h.server.recv_kind("joinRoom").await.expect("No joinRoom");

    connect_peer(&mut h, "bob").await;
    assert!(events.wait_for("stream:bob").await);

    assert!(h.manager.toggle_video().await);
    assert!(local.has(MediaKind::Video));
    assert_eq!(
        h.devices.user_media_calls().last(),
        Some(&MediaConstraints::video_only())
    );

    let offer = recv_signal(&mut h.server, SignalType::Offer).await;
    let sdp = offer.description().expect("Bad offer").sdp;
    assert!(sdp.contains(" video"), "Renegotiated offer carries the camera track");
    assert_eq!(h.factory.log.count("add_track Camera"), 1);

    h.server.push(signal_from(
        "bob",
        Some("alice"),
        SignalType::Answer,
        SessionDescription::answer(fake_sdp(&tracks_of("bob"))).to_value(),
    ));
    let snapshot = h.manager.snapshot().await.expect("No active call");
    assert!(snapshot.media.video);
    assert_eq!(events.count("stream:"), 1, "Renegotiation reuses the known stream");
}

#[tokio::test]
async fn test_failed_acquisition_leaves_video_off() {
    init_tracing();
    let h = Harness::connect("alice").await;
    h.manager
        .initialize_call(request("alice"), MediaConstraints::audio_only())
        .await
        .expect("Failed to start call");

    h.devices
        .fail_user_media(huddle_client::MediaError::DeviceBusy("camera".into()));
    assert!(!h.manager.toggle_video().await);

    let snapshot = h.manager.snapshot().await.expect("No active call");
    assert!(!snapshot.media.video);
}

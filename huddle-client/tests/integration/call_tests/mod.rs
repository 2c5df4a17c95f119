mod test_call_start;
mod test_media_toggles;

use huddle_client::{CallRequest, MediaConstraints, MediaKind};
use huddle_core::{CallSignal, Envelope, SessionDescription, SignalType, signaling};
use serde_json::Value;

use crate::integration::Harness;
use crate::utils::{FAKE_CANDIDATE, FakeSession, FakeTrack, fake_sdp};

pub fn request(user: &str) -> CallRequest {
    CallRequest::new(user, "R1")
        .with_username(user.to_uppercase())
        .with_conversation("conv-1")
        .with_call_session("session-1")
}

/// Start a full audio+video call for `user` and consume `call-start` + `joinRoom`.
pub async fn in_call(user: &str) -> Harness {
    let mut h = Harness::connect(user).await;
    h.manager
        .initialize_call(request(user), MediaConstraints::new(true, true))
        .await
        .expect("Failed to start call");
    h.server.recv_kind("joinRoom").await.expect("No joinRoom");
    h
}

/// Skip envelopes until a call signal of `signal_type` arrives.
pub async fn recv_signal(server: &mut FakeSession, signal_type: SignalType) -> CallSignal {
    loop {
        let envelope = server.recv().await.expect("Client went quiet");
        if let Some(signal) = envelope.as_call_signal() {
            if signal.signal_type == signal_type {
                return signal.clone();
            }
        }
    }
}

pub fn signal_from(peer: &str, to: Option<&str>, signal_type: SignalType, payload: Value) -> Envelope {
    signaling::call_signal(
        signal_type,
        "R1".into(),
        peer.into(),
        payload,
        to.map(Into::into),
    )
}

pub fn tracks_of(peer: &str) -> Vec<FakeTrack> {
    let stream = format!("{peer}-stream");
    vec![
        FakeTrack::new(&stream, &format!("{peer}-audio"), MediaKind::Audio),
        FakeTrack::new(&stream, &format!("{peer}-video"), MediaKind::Video),
    ]
}

/// `peer` joins the room: the harness offers, `peer` answers with its tracks.
pub async fn connect_peer(h: &mut Harness, peer: &str) {
    let me = h.transport.identity().expect("Not connected").user_id;

    h.server
        .push(signaling::user_joined(peer.into(), "R1".into(), None));
    let offer = recv_signal(&mut h.server, SignalType::Offer).await;
    assert_eq!(offer.receiver_id.as_ref().map(|r| r.as_str()), Some(peer));

    h.server.push(signal_from(
        peer,
        Some(me.as_str()),
        SignalType::Answer,
        SessionDescription::answer(fake_sdp(&tracks_of(peer))).to_value(),
    ));
    h.server.push(signal_from(
        peer,
        Some(me.as_str()),
        SignalType::IceCandidate,
        serde_json::from_str(FAKE_CANDIDATE).expect("Bad candidate"),
    ));
}

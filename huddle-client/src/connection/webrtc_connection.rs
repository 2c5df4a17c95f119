use crate::connection::connection_event::{ConnectionEvent, NativeState, PeerLink};
use crate::connection::media_connection::{ConnectionFactory, MediaConnection};
use crate::connection::rtc_config::RtcConfig;
use crate::media::{LocalTrack, MediaKind, RemoteTrack};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds `webrtc` peer connections configured from an [`RtcConfig`].
#[derive(Clone, Default)]
pub struct WebRtcConnectionFactory {
    config: RtcConfig,
}

impl WebRtcConnectionFactory {
    pub fn new(config: RtcConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(
        &self,
        link: PeerLink,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn MediaConnection>> {
        let connection = WebRtcConnection::new(link, &self.config, events).await?;
        Ok(Arc::new(connection))
    }
}

pub struct WebRtcConnection {
    link: PeerLink,
    peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<String, Arc<RTCRtpSender>>>,
}

impl WebRtcConnection {
    pub async fn new(
        link: PeerLink,
        config: &RtcConfig,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = events.clone();
        let state_link = link.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let link = state_link.clone();

                Box::pin(async move {
                    info!("Peer connection state for {}: {:?}", link, s);
                    let state = match s {
                        RTCPeerConnectionState::Connecting => NativeState::Connecting,
                        RTCPeerConnectionState::Connected => NativeState::Connected,
                        RTCPeerConnectionState::Disconnected => NativeState::Disconnected,
                        RTCPeerConnectionState::Failed => NativeState::Failed,
                        RTCPeerConnectionState::Closed => NativeState::Closed,
                        _ => NativeState::New,
                    };
                    let _ = tx.send(ConnectionEvent::StateChanged { link, state });
                })
            },
        ));

        let ice_tx = events.clone();
        let ice_link = link.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let link = ice_link.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(json_candidate) = candidate.to_json() else {
                    return;
                };
                let Ok(candidate) = serde_json::to_string(&json_candidate) else {
                    return;
                };
                let _ = tx.send(ConnectionEvent::IceCandidate { link, candidate });
            })
        }));

        let track_tx = events;
        let track_link = link.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let link = track_link.clone();

                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        _ => MediaKind::Video,
                    };
                    let remote = RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                        handle: Some(track),
                    };
                    debug!("Remote track {} ({:?}) from {}", remote.id, kind, link);
                    let _ = tx.send(ConnectionEvent::Track {
                        link,
                        track: remote,
                    });
                })
            },
        ));

        Ok(Self {
            link,
            peer_connection,
            senders: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let rtp: Arc<dyn TrackLocal + Send + Sync> = track.rtp_track();
        let sender = self
            .peer_connection
            .add_track(rtp)
            .await
            .with_context(|| format!("Failed to add track {} for {}", track.id(), self.link))?;

        // RTCP has to be drained for interceptors (NACK, reports) to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        self.senders
            .lock()
            .await
            .insert(track.id().to_owned(), sender);
        Ok(())
    }

    async fn remove_track(&self, track_id: &str) -> Result<()> {
        let Some(sender) = self.senders.lock().await.remove(track_id) else {
            return Ok(());
        };
        self.peer_connection.remove_track(&sender).await?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: String) -> Result<String> {
        let desc = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(desc).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn accept_answer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if self.peer_connection.signaling_state() != RTCSignalingState::HaveLocalOffer {
            return Ok(());
        }
        // A rollback description still has to parse, so reuse the pending offer's SDP.
        let Some(mut desc) = self.peer_connection.pending_local_description().await else {
            return Ok(());
        };
        desc.sdp_type = RTCSdpType::Rollback;
        self.peer_connection
            .set_local_description(desc)
            .await
            .with_context(|| format!("Failed to roll back local offer for {}", self.link))?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate_json: String) -> Result<()> {
        let candidate: RTCIceCandidateInit =
            serde_json::from_str(&candidate_json).context("Failed to parse ICE candidate JSON")?;
        self.peer_connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().await.clear();
        self.peer_connection.close().await?;
        Ok(())
    }
}

use crate::connection::{MediaConnection, PeerLink};
use crate::media::{LocalStream, RemoteStream, RemoteTrack};
use huddle_core::{RoomId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What the application hands over to start or join a call. All ids are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub user_id: UserId,
    pub username: Option<String>,
    pub room_id: RoomId,
    pub call_session_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl CallRequest {
    pub fn new(user_id: impl Into<UserId>, room_id: impl Into<RoomId>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
            room_id: room_id.into(),
            call_session_id: None,
            conversation_id: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_call_session(mut self, call_session_id: impl Into<String>) -> Self {
        self.call_session_id = Some(call_session_id.into());
        self
    }
}

/// Local media availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaState {
    pub video: bool,
    pub audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// This side observed the peer join and sent the first offer.
    Offerer,
    /// This side received the first offer.
    Answerer,
}

/// Live states of a tracked peer. Terminal states remove the record instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Negotiating,
    Connected,
}

pub(crate) struct PeerRecord {
    pub(crate) link: PeerLink,
    pub(crate) connection: Arc<dyn MediaConnection>,
    pub(crate) role: NegotiationRole,
    pub(crate) state: PeerState,
    pub(crate) streams: Vec<RemoteStream>,
    /// Our offer is out and no answer has been applied yet.
    pub(crate) offer_pending: bool,
    /// Tracks changed while an offer was pending; offer again after the answer.
    pub(crate) renegotiate: bool,
}

impl PeerRecord {
    pub(crate) fn new(
        link: PeerLink,
        connection: Arc<dyn MediaConnection>,
        role: NegotiationRole,
    ) -> Self {
        Self {
            link,
            connection,
            role,
            state: PeerState::Negotiating,
            streams: Vec::new(),
            offer_pending: false,
            renegotiate: false,
        }
    }

    /// Group a remote track into its stream. Returns the stream when the track opened a new one.
    pub(crate) fn attach_track(&mut self, track: RemoteTrack) -> Option<RemoteStream> {
        if let Some(stream) = self.streams.iter_mut().find(|s| s.id == track.stream_id) {
            if !stream.tracks.iter().any(|t| t.id == track.id) {
                stream.tracks.push(track);
            }
            return None;
        }

        let stream = RemoteStream::new(track);
        self.streams.push(stream.clone());
        self.state = PeerState::Connected;
        Some(stream)
    }
}

pub(crate) struct CallSession {
    pub(crate) user_id: UserId,
    pub(crate) room_id: RoomId,
    pub(crate) local: LocalStream,
    pub(crate) screen: Option<LocalStream>,
    pub(crate) screen_watch: Option<JoinHandle<()>>,
    pub(crate) media: MediaState,
    pub(crate) peers: HashMap<UserId, PeerRecord>,
}

impl CallSession {
    pub(crate) fn new(user_id: UserId, room_id: RoomId, local: LocalStream, media: MediaState) -> Self {
        Self {
            user_id,
            room_id,
            local,
            screen: None,
            screen_watch: None,
            media,
            peers: HashMap::new(),
        }
    }

    /// Consistent copy of the current connection handles.
    pub(crate) fn connections(&self) -> Vec<(UserId, Arc<dyn MediaConnection>)> {
        self.peers
            .iter()
            .map(|(id, record)| (id.clone(), record.connection.clone()))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> CallSnapshot {
        let mut peers: Vec<PeerSnapshot> = self
            .peers
            .values()
            .map(|record| PeerSnapshot {
                user_id: record.link.user_id.clone(),
                role: record.role,
                state: record.state,
                stream_ids: record.streams.iter().map(|s| s.id.clone()).collect(),
            })
            .collect();
        peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        CallSnapshot {
            user_id: self.user_id.clone(),
            room_id: self.room_id.clone(),
            media: self.media,
            screen_sharing: self.screen.is_some(),
            peers,
        }
    }
}

/// Read-only view of the active call.
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub media: MediaState,
    pub screen_sharing: bool,
    pub peers: Vec<PeerSnapshot>,
}

impl CallSnapshot {
    pub fn peer(&self, user_id: &UserId) -> Option<&PeerSnapshot> {
        self.peers.iter().find(|p| &p.user_id == user_id)
    }
}

#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub user_id: UserId,
    pub role: NegotiationRole,
    pub state: PeerState,
    pub stream_ids: Vec<String>,
}

use crate::media::RemoteTrack;
use huddle_core::UserId;
use std::fmt;

/// Distinguishes successive connections to the same remote user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// The remote user a native connection belongs to, plus which connection it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerLink {
    pub user_id: UserId,
    pub connection: ConnectionId,
}

impl fmt::Display for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.user_id, self.connection.0)
    }
}

/// Connectivity state reported by the native connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl NativeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NativeState::Disconnected | NativeState::Failed | NativeState::Closed
        )
    }
}

/// Events a native connection pushes to the call engine.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A local ICE candidate (JSON `RTCIceCandidateInit`) to forward to the peer.
    IceCandidate { link: PeerLink, candidate: String },

    /// The remote side added a track.
    Track { link: PeerLink, track: RemoteTrack },

    StateChanged { link: PeerLink, state: NativeState },
}

impl ConnectionEvent {
    pub fn link(&self) -> &PeerLink {
        match self {
            ConnectionEvent::IceCandidate { link, .. }
            | ConnectionEvent::Track { link, .. }
            | ConnectionEvent::StateChanged { link, .. } => link,
        }
    }
}

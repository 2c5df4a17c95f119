use crate::media::RemoteStream;
use crate::observers::Observers;
use huddle_core::{RoomId, UserId};

#[derive(Debug, Clone)]
pub struct StreamAdded {
    pub user_id: UserId,
    pub stream: RemoteStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `end_call()` on this side.
    Local,
    /// The last remaining peer announced `call-end`.
    Remote,
    /// The signaling channel reconnected mid-call; connections were torn down.
    TransportReset,
}

#[derive(Debug, Clone)]
pub struct CallEnded {
    pub room_id: RoomId,
    pub reason: EndReason,
}

/// Observer lists the application registers on. Handlers run on the call engine task.
pub(crate) struct CallEvents {
    pub(crate) stream_added: Observers<StreamAdded>,
    pub(crate) stream_removed: Observers<UserId>,
    pub(crate) participant_joined: Observers<UserId>,
    pub(crate) participant_left: Observers<UserId>,
    pub(crate) call_ended: Observers<CallEnded>,
    pub(crate) screen_sharing_changed: Observers<bool>,
}

impl CallEvents {
    pub(crate) fn new() -> Self {
        Self {
            stream_added: Observers::new("stream-added"),
            stream_removed: Observers::new("stream-removed"),
            participant_joined: Observers::new("participant-joined"),
            participant_left: Observers::new("participant-left"),
            call_ended: Observers::new("call-ended"),
            screen_sharing_changed: Observers::new("screen-sharing-changed"),
        }
    }
}

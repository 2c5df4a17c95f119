use huddle_core::RoomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open channel to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("channel is not open")]
    Closed,
}

/// Failure to acquire a local capture device. The one error class the
/// application is expected to show to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to use {0} was denied")]
    PermissionDenied(String),

    #[error("{0} is busy")]
    DeviceBusy(String),

    #[error("no {0} device found")]
    NotFound(String),

    #[error("media capture failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("already in a call in room {0}")]
    AlreadyInCall(RoomId),

    #[error("no active call")]
    NoActiveCall,

    #[error("call engine has stopped")]
    EngineStopped,
}

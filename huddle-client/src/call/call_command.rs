use crate::call::call_session::{CallRequest, CallSnapshot};
use crate::error::CallError;
use crate::media::{LocalStream, MediaConstraints};
use huddle_core::Envelope;
use tokio::sync::oneshot;

/// Requests from [`crate::CallManager`] handles to the engine task.
pub(crate) enum CallCommand {
    /// Initialize (`announce == true`) or join a call.
    Start {
        request: CallRequest,
        constraints: MediaConstraints,
        announce: bool,
        reply: oneshot::Sender<Result<LocalStream, CallError>>,
    },
    ToggleVideo {
        reply: oneshot::Sender<bool>,
    },
    ToggleAudio {
        reply: oneshot::Sender<bool>,
    },
    ToggleScreenSharing {
        reply: oneshot::Sender<Result<bool, CallError>>,
    },
    EndCall {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<CallSnapshot>>,
    },
}

/// Inputs the engine receives from callbacks rather than from the application.
pub(crate) enum EngineEvent {
    Inbound(Envelope),
    Connectivity(bool),
    /// A screen capture track ended; `generation` identifies which share it belonged to.
    ScreenEnded { generation: u64 },
}

mod call_command;
mod call_engine;
mod call_events;
mod call_manager;
mod call_session;

pub use call_events::{CallEnded, EndReason, StreamAdded};
pub use call_manager::*;
pub use call_session::{
    CallRequest, CallSnapshot, MediaState, NegotiationRole, PeerSnapshot, PeerState,
};

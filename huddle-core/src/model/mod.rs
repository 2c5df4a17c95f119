mod call_signal;
mod chat;
mod envelope;
mod ice;
mod ids;
mod presence;

pub use call_signal::{CallSignal, CallStartPayload, SdpKind, SessionDescription, SignalType};
pub use chat::{Attachment, ChatMessage, MessageType};
pub use envelope::{Envelope, EnvelopeBody, Register, RoomMembership, UserStatus};
pub use ice::IceServerConfig;
pub use ids::{RoomId, UserId};
pub use presence::PresenceStatus;

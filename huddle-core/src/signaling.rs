//! Envelope builders. Stateless with respect to any call: every builder returns a
//! ready-to-send [`Envelope`] and never touches membership or session state.

use crate::model::{
    Attachment, CallSignal, ChatMessage, Envelope, EnvelopeBody, MessageType, PresenceStatus,
    Register, RoomId, RoomMembership, SignalType, UserId, UserStatus,
};
use crate::utils::now_millis;
use serde_json::Value;

pub fn register(user_id: UserId, display_name: impl Into<String>) -> Envelope {
    Envelope::new(EnvelopeBody::Register(Register {
        user_id,
        username: display_name.into(),
    }))
}

/// Informational only; does not affect room membership or call state.
pub fn presence(user_id: UserId, status: PresenceStatus) -> Envelope {
    Envelope::new(EnvelopeBody::UserStatus(UserStatus { user_id, status }))
}

pub fn chat_message(
    sender_id: UserId,
    conversation_id: impl Into<String>,
    text: impl Into<String>,
    receiver_id: Option<UserId>,
    attachments: Vec<Attachment>,
) -> Envelope {
    let message_type = if attachments.is_empty() {
        MessageType::Text
    } else {
        MessageType::File
    };

    Envelope::with_id(EnvelopeBody::Message(ChatMessage {
        sender_id,
        receiver_id,
        conversation_id: conversation_id.into(),
        text: text.into(),
        timestamp: now_millis(),
        message_type,
        attachments,
    }))
}

/// Omitting `receiver_id` broadcasts to everyone currently in the room.
pub fn call_signal(
    signal_type: SignalType,
    room_id: RoomId,
    sender_id: UserId,
    payload: Value,
    receiver_id: Option<UserId>,
) -> Envelope {
    Envelope::with_id(EnvelopeBody::CallSignaling(CallSignal {
        signal_type,
        sender_id,
        receiver_id,
        room_id,
        payload,
        timestamp: Some(now_millis()),
    }))
}

pub fn join_room(user_id: UserId, room_id: RoomId, display_name: Option<String>) -> Envelope {
    Envelope::new(EnvelopeBody::JoinRoom(RoomMembership {
        user_id,
        room_id,
        username: display_name,
    }))
}

pub fn leave_room(user_id: UserId, room_id: RoomId) -> Envelope {
    Envelope::new(EnvelopeBody::LeaveRoom(RoomMembership {
        user_id,
        room_id,
        username: None,
    }))
}

pub fn user_joined(user_id: UserId, room_id: RoomId, username: Option<String>) -> Envelope {
    Envelope::with_id(EnvelopeBody::UserJoined(RoomMembership {
        user_id,
        room_id,
        username,
    }))
}

pub fn user_left(user_id: UserId, room_id: RoomId) -> Envelope {
    Envelope::with_id(EnvelopeBody::UserLeft(RoomMembership {
        user_id,
        room_id,
        username: None,
    }))
}

use crate::error::ProtocolError;
use crate::model::call_signal::{CallSignal, SignalType};
use crate::model::chat::ChatMessage;
use crate::model::ids::{RoomId, UserId};
use crate::model::presence::PresenceStatus;
use crate::utils::new_id;
use serde::{Deserialize, Serialize};

/// One unit of wire communication. Serialized as a flat JSON object with a `type` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EnvelopeBody {
    Register(Register),
    UserStatus(UserStatus),
    Message(ChatMessage),
    JoinRoom(RoomMembership),
    LeaveRoom(RoomMembership),
    CallSignaling(CallSignal),
    UserJoined(RoomMembership),
    UserLeft(RoomMembership),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// Shared shape of join/leave requests and the server's joined/left notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembership {
    pub user_id: UserId,
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Envelope {
    pub fn new(body: EnvelopeBody) -> Self {
        Self { id: None, body }
    }

    pub fn with_id(body: EnvelopeBody) -> Self {
        Self {
            id: Some(new_id()),
            body,
        }
    }

    /// Assign a fresh id when the envelope has none yet.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(new_id)
    }

    /// Wire name of the `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match &self.body {
            EnvelopeBody::Register(_) => "register",
            EnvelopeBody::UserStatus(_) => "userStatus",
            EnvelopeBody::Message(_) => "message",
            EnvelopeBody::JoinRoom(_) => "joinRoom",
            EnvelopeBody::LeaveRoom(_) => "leaveRoom",
            EnvelopeBody::CallSignaling(_) => "callSignaling",
            EnvelopeBody::UserJoined(_) => "userJoined",
            EnvelopeBody::UserLeft(_) => "userLeft",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the field-level contract of each envelope type.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match &self.body {
            EnvelopeBody::Register(r) => {
                require(r.user_id.as_str(), "userId")?;
                require(&r.username, "username")
            }
            EnvelopeBody::UserStatus(s) => require(s.user_id.as_str(), "userId"),
            EnvelopeBody::Message(m) => {
                require(m.sender_id.as_str(), "senderId")?;
                require(&m.conversation_id, "conversationId")
            }
            EnvelopeBody::JoinRoom(m)
            | EnvelopeBody::LeaveRoom(m)
            | EnvelopeBody::UserJoined(m)
            | EnvelopeBody::UserLeft(m) => {
                require(m.user_id.as_str(), "userId")?;
                require(m.room_id.as_str(), "roomId")
            }
            EnvelopeBody::CallSignaling(s) => {
                require(s.sender_id.as_str(), "senderId")?;
                require(s.room_id.as_str(), "roomId")?;
                match s.signal_type {
                    SignalType::Offer | SignalType::Answer => s.description().map(|_| ()),
                    SignalType::IceCandidate => s.candidate_json().map(|_| ()),
                    _ => Ok(()),
                }
            }
        }
    }

    pub fn as_call_signal(&self) -> Option<&CallSignal> {
        match &self.body {
            EnvelopeBody::CallSignaling(s) => Some(s),
            _ => None,
        }
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::MissingField(field));
    }
    Ok(())
}

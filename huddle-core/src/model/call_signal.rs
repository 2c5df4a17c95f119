use crate::error::ProtocolError;
use crate::model::ids::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    Offer,
    Answer,
    IceCandidate,
    CallStart,
    CallEnd,
    UserJoined,
    UserLeft,
}

impl SignalType {
    /// Signals that carry negotiation state and must come from a room member.
    pub fn is_negotiation(self) -> bool {
        matches!(
            self,
            SignalType::Offer | SignalType::Answer | SignalType::IceCandidate
        )
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Offer => "offer",
            SignalType::Answer => "answer",
            SignalType::IceCandidate => "ice-candidate",
            SignalType::CallStart => "call-start",
            SignalType::CallEnd => "call-end",
            SignalType::UserJoined => "user-joined",
            SignalType::UserLeft => "user-left",
        };
        f.write_str(s)
    }
}

/// Call negotiation payload relayed between peers of one room.
///
/// `receiver_id == None` means "everyone currently in the room".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallSignal {
    pub signal_type: SignalType,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub room_id: RoomId,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl CallSignal {
    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_none()
    }

    /// True when `user` is an intended recipient of this signal.
    pub fn is_addressed_to(&self, user: &UserId) -> bool {
        self.receiver_id.as_ref().is_none_or(|r| r == user)
    }

    /// Offer/answer payload as a typed description.
    pub fn description(&self) -> Result<SessionDescription, ProtocolError> {
        let desc: SessionDescription = serde_json::from_value(self.payload.clone())
            .map_err(|e| ProtocolError::InvalidPayload(self.signal_type, e.to_string()))?;

        let expected = match self.signal_type {
            SignalType::Offer => SdpKind::Offer,
            SignalType::Answer => SdpKind::Answer,
            other => {
                return Err(ProtocolError::InvalidPayload(
                    other,
                    "signal carries no session description".to_owned(),
                ));
            }
        };
        if desc.kind != expected {
            return Err(ProtocolError::InvalidPayload(
                self.signal_type,
                format!("description type is {:?}", desc.kind),
            ));
        }
        if desc.sdp.is_empty() {
            return Err(ProtocolError::InvalidPayload(
                self.signal_type,
                "empty sdp".to_owned(),
            ));
        }
        Ok(desc)
    }

    /// ICE candidate payload re-encoded as the JSON string native stacks consume.
    pub fn candidate_json(&self) -> Result<String, ProtocolError> {
        let has_candidate = self
            .payload
            .get("candidate")
            .is_some_and(|c| c.is_string());
        if self.signal_type != SignalType::IceCandidate || !has_candidate {
            return Err(ProtocolError::InvalidPayload(
                self.signal_type,
                "missing candidate".to_owned(),
            ));
        }
        Ok(self.payload.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "type": self.kind, "sdp": self.sdp })
    }
}

/// Payload of a `call-start` announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallStartPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_session_id: Option<String>,
    pub video: bool,
    pub audio: bool,
}

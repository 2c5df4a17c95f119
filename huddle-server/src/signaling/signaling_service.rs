use crate::room::RoomRegistry;
use axum::extract::ws::Message;
use dashmap::DashMap;
use huddle_core::signaling;
use huddle_core::{
    CallSignal, ChatMessage, Envelope, EnvelopeBody, PresenceStatus, ProtocolError, Register,
    RoomId, RoomMembership, UserId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Server side of one WebSocket. Bound to a user by its `register` envelope.
pub struct ClientConnection {
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
    user: Option<UserId>,
}

impl ClientConnection {
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }
}

struct PeerSink {
    connection: u64,
    username: String,
    tx: mpsc::UnboundedSender<Message>,
}

struct SignalingInner {
    peers: DashMap<UserId, PeerSink>,
    rooms: RoomRegistry,
    next_connection: AtomicU64,
}

#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl Default for SignalingService {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                rooms: RoomRegistry::new(),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.inner.rooms
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.inner.peers.contains_key(user_id)
    }

    pub fn connect(&self, tx: mpsc::UnboundedSender<Message>) -> ClientConnection {
        ClientConnection {
            id: self.inner.next_connection.fetch_add(1, Ordering::Relaxed),
            tx,
            user: None,
        }
    }

    /// Decode one text frame and route it.
    pub fn handle_text(&self, conn: &mut ClientConnection, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Invalid envelope on connection {}: {}", conn.id, e);
                return;
            }
        };
        if let Err(e) = check(&envelope) {
            warn!("Rejected {} on connection {}: {}", envelope.kind(), conn.id, e);
            return;
        }

        match &envelope.body {
            EnvelopeBody::Register(register) => self.register(conn, register),
            EnvelopeBody::UserStatus(status) => {
                if let Some(user) = self.bound(conn, &status.user_id) {
                    self.broadcast_all(&user, &envelope);
                }
            }
            EnvelopeBody::JoinRoom(membership) => {
                if let Some(user) = self.bound(conn, &membership.user_id) {
                    self.join(user, membership);
                }
            }
            EnvelopeBody::LeaveRoom(membership) => {
                if let Some(user) = self.bound(conn, &membership.user_id) {
                    self.leave(&user, &membership.room_id);
                }
            }
            EnvelopeBody::CallSignaling(signal) => {
                if let Some(user) = self.bound(conn, &signal.sender_id) {
                    self.relay_signal(&user, signal, &envelope);
                }
            }
            EnvelopeBody::Message(message) => {
                if let Some(user) = self.bound(conn, &message.sender_id) {
                    self.relay_message(&user, message, &envelope);
                }
            }
            EnvelopeBody::UserJoined(_) | EnvelopeBody::UserLeft(_) => {
                warn!(
                    "Dropping server-only {} sent by connection {}",
                    envelope.kind(),
                    conn.id
                );
            }
        }
    }

    /// The socket is gone: leave every room and announce the user offline.
    pub fn disconnect(&self, conn: ClientConnection) {
        let Some(user) = conn.user else {
            return;
        };
        // A newer socket may have re-registered the same user.
        let removed = self
            .inner
            .peers
            .remove_if(&user, |_, sink| sink.connection == conn.id)
            .is_some();
        if !removed {
            debug!("{} already rebound to another connection", user);
            return;
        }

        for room_id in self.inner.rooms.remove_user(&user) {
            self.fan_out_left(&user, &room_id);
        }
        self.broadcast_all(&user, &signaling::presence(user.clone(), PresenceStatus::Offline));
        info!("{} went offline", user);
    }

    pub fn send_envelope(&self, user_id: &UserId, envelope: &Envelope) -> bool {
        let Some(peer) = self.inner.peers.get(user_id) else {
            warn!("Attempted to send {} to offline user {}", envelope.kind(), user_id);
            return false;
        };

        match envelope.to_json() {
            Ok(json) => {
                if let Err(e) = peer.tx.send(Message::Text(json.into())) {
                    error!("Failed to send WS message to {}: {:?}", user_id, e);
                    return false;
                }
                true
            }
            Err(e) => {
                error!("Failed to serialize {} envelope: {}", envelope.kind(), e);
                false
            }
        }
    }

    fn register(&self, conn: &mut ClientConnection, register: &Register) {
        if let Some(previous) = conn.user.as_ref().filter(|u| **u != register.user_id) {
            warn!(
                "Connection {} re-registering from {} to {}",
                conn.id, previous, register.user_id
            );
        }

        let user = register.user_id.clone();
        self.inner.peers.insert(
            user.clone(),
            PeerSink {
                connection: conn.id,
                username: register.username.clone(),
                tx: conn.tx.clone(),
            },
        );
        conn.user = Some(user.clone());

        info!("{} registered as '{}'", user, register.username);
        self.broadcast_all(&user, &signaling::presence(user.clone(), PresenceStatus::Online));
    }

    fn join(&self, user: UserId, membership: &RoomMembership) {
        let room_id = &membership.room_id;
        if !self.inner.rooms.join(room_id, &user) {
            debug!("{} is already in room {}", user, room_id);
            return;
        }

        let username = membership.username.clone().or_else(|| {
            self.inner
                .peers
                .get(&user)
                .map(|peer| peer.username.clone())
        });
        info!("{} joined room {}", user, room_id);

        let notice = signaling::user_joined(user.clone(), room_id.clone(), username);
        self.broadcast_room(room_id, &user, &notice);
    }

    fn leave(&self, user: &UserId, room_id: &RoomId) {
        if !self.inner.rooms.leave(room_id, user) {
            debug!("{} left room {} without being a member", user, room_id);
            return;
        }
        info!("{} left room {}", user, room_id);
        self.fan_out_left(user, room_id);
    }

    fn fan_out_left(&self, user: &UserId, room_id: &RoomId) {
        let notice = signaling::user_left(user.clone(), room_id.clone());
        self.broadcast_room(room_id, user, &notice);
    }

    fn relay_signal(&self, sender: &UserId, signal: &CallSignal, envelope: &Envelope) {
        if signal.signal_type.is_negotiation() && !self.inner.rooms.is_member(&signal.room_id, sender) {
            warn!(
                "Dropping {} from {}: not a member of room {}",
                signal.signal_type, sender, signal.room_id
            );
            return;
        }

        match &signal.receiver_id {
            Some(receiver) => {
                debug!("Relaying {} {} -> {}", signal.signal_type, sender, receiver);
                self.send_envelope(receiver, envelope);
            }
            None => {
                debug!(
                    "Broadcasting {} from {} to room {}",
                    signal.signal_type, sender, signal.room_id
                );
                self.broadcast_room(&signal.room_id, sender, envelope);
            }
        }
    }

    fn relay_message(&self, sender: &UserId, message: &ChatMessage, envelope: &Envelope) {
        match &message.receiver_id {
            Some(receiver) => {
                self.send_envelope(receiver, envelope);
            }
            None => {
                let room_id = RoomId::from(message.conversation_id.as_str());
                self.broadcast_room(&room_id, sender, envelope);
            }
        }
    }

    fn broadcast_room(&self, room_id: &RoomId, except: &UserId, envelope: &Envelope) {
        for member in self.inner.rooms.members(room_id) {
            if &member != except {
                self.send_envelope(&member, envelope);
            }
        }
    }

    fn broadcast_all(&self, except: &UserId, envelope: &Envelope) {
        let online: Vec<UserId> = self
            .inner
            .peers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|user| user != except)
            .collect();
        for user in online {
            self.send_envelope(&user, envelope);
        }
    }

    /// The registered user of this socket, provided it matches the claimed id.
    fn bound(&self, conn: &ClientConnection, claimed: &UserId) -> Option<UserId> {
        match &conn.user {
            None => {
                warn!("Connection {} sent a message before registering", conn.id);
                None
            }
            Some(user) if user != claimed => {
                warn!(
                    "Connection {} registered as {} claimed to be {}",
                    conn.id, user, claimed
                );
                None
            }
            Some(user) => Some(user.clone()),
        }
    }
}

/// Field-level checks. Call signal payloads are relayed untouched.
fn check(envelope: &Envelope) -> Result<(), ProtocolError> {
    match &envelope.body {
        EnvelopeBody::CallSignaling(signal) if signal.sender_id.is_empty() => {
            Err(ProtocolError::MissingField("senderId"))
        }
        EnvelopeBody::CallSignaling(signal) if signal.room_id.is_empty() => {
            Err(ProtocolError::MissingField("roomId"))
        }
        EnvelopeBody::CallSignaling(_) => Ok(()),
        _ => envelope.validate(),
    }
}

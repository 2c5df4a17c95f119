use dashmap::DashMap;
use huddle_core::{RoomId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Room membership: every room maps to the users that joined it and have not left.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, HashSet<UserId>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the user was already a member.
    pub fn join(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let added = self
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(user_id.clone());
        if added {
            debug!("{} joined room {}", user_id, room_id);
        }
        added
    }

    /// Returns false when the user was not a member. Empty rooms are dropped.
    pub fn leave(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let removed = self
            .rooms
            .get_mut(room_id)
            .is_some_and(|mut members| members.remove(user_id));
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
        removed
    }

    pub fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains(user_id))
    }

    pub fn members(&self, room_id: &RoomId) -> Vec<UserId> {
        let mut members: Vec<UserId> = self
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Remove the user from every room. Returns the rooms they were in.
    pub fn remove_user(&self, user_id: &UserId) -> Vec<RoomId> {
        let joined: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().contains(user_id))
            .map(|entry| entry.key().clone())
            .collect();

        joined
            .into_iter()
            .filter(|room_id| self.leave(room_id, user_id))
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

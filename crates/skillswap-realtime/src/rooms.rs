//! Room membership tracking.
//!
//! Ephemeral bookkeeping of which conversation and post rooms the current
//! connection has joined. Cleared on every disconnect; the owning component
//! decides which rooms to re-join after a reconnect.

use crate::frame::{
    FrameDraft, EVENT_JOIN_CONVERSATION, EVENT_JOIN_POST, EVENT_LEAVE_CONVERSATION,
    EVENT_LEAVE_POST, EVENT_TYPING_START, EVENT_TYPING_STOP,
};
use serde_json::json;
use std::collections::HashSet;

/// Active room memberships for one connection.
#[derive(Debug, Default)]
pub struct RoomTracker {
    conversations: HashSet<i64>,
    posts: HashSet<i64>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_conversation(&mut self, id: i64) {
        self.conversations.insert(id);
    }

    pub fn leave_conversation(&mut self, id: i64) {
        self.conversations.remove(&id);
    }

    pub fn join_post(&mut self, id: i64) {
        self.posts.insert(id);
    }

    pub fn leave_post(&mut self, id: i64) {
        self.posts.remove(&id);
    }

    pub fn conversations(&self) -> Vec<i64> {
        self.conversations.iter().copied().collect()
    }

    pub fn posts(&self) -> Vec<i64> {
        self.posts.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty() && self.posts.is_empty()
    }

    /// Drop all memberships. Called when the connection goes away.
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.posts.clear();
    }
}

// Canonical frame builders for room and typing signaling. Room ids travel
// as strings on the wire.

pub fn join_conversation_frame(conversation_id: i64) -> FrameDraft {
    FrameDraft::new(
        EVENT_JOIN_CONVERSATION,
        json!({"conversation_id": conversation_id.to_string()}),
    )
}

pub fn leave_conversation_frame(conversation_id: i64) -> FrameDraft {
    FrameDraft::new(
        EVENT_LEAVE_CONVERSATION,
        json!({"conversation_id": conversation_id.to_string()}),
    )
}

pub fn typing_start_frame(conversation_id: i64) -> FrameDraft {
    FrameDraft::new(
        EVENT_TYPING_START,
        json!({"conversation_id": conversation_id.to_string()}),
    )
}

pub fn typing_stop_frame(conversation_id: i64) -> FrameDraft {
    FrameDraft::new(
        EVENT_TYPING_STOP,
        json!({"conversation_id": conversation_id.to_string()}),
    )
}

pub fn join_post_frame(post_id: i64) -> FrameDraft {
    FrameDraft::new(EVENT_JOIN_POST, json!({"post_id": post_id.to_string()}))
}

pub fn leave_post_frame(post_id: i64) -> FrameDraft {
    FrameDraft::new(EVENT_LEAVE_POST, json!({"post_id": post_id.to_string()}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_lifecycle() {
        let mut rooms = RoomTracker::new();
        rooms.join_conversation(1);
        rooms.join_conversation(2);
        rooms.join_post(10);
        assert_eq!(rooms.conversations().len(), 2);
        assert_eq!(rooms.posts(), vec![10]);

        rooms.leave_conversation(1);
        assert_eq!(rooms.conversations(), vec![2]);

        rooms.clear();
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut rooms = RoomTracker::new();
        rooms.join_post(5);
        rooms.join_post(5);
        assert_eq!(rooms.posts().len(), 1);
    }

    #[test]
    fn test_room_id_coerced_to_string() {
        let draft = join_conversation_frame(42);
        assert_eq!(draft.kind, "join_conversation");
        assert_eq!(draft.data["conversation_id"], "42");

        let draft = join_post_frame(7);
        assert_eq!(draft.data["post_id"], "7");
    }
}

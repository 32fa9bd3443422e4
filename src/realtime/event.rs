//! Typed change events decoded at the channel boundary.
//!
//! A broadcast frame names its table and operation and carries the new row
//! (`record`) and/or the prior row (`old_record`). [`ChangeEvent::decode`]
//! turns it into one closed enum; frames for unknown tables, or whose rows
//! do not match the table's shape, decode to `None` and are dropped.

use frames::{Broadcast, Operation};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::chat::types::{ChatMessage, GroupMembership, GroupRow};
use crate::kanban::types::{BoardMemberRow, BoardRow, Card, CategoryRow};

/// Primary key of a deleted row.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RecordId {
    pub id: String,
}

/// One row change. Deletes carry only the key columns of the old row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowChange<R, K = RecordId> {
    Insert(R),
    Update(R),
    Delete(K),
}

impl<R: DeserializeOwned, K: DeserializeOwned> RowChange<R, K> {
    fn from_broadcast(broadcast: &Broadcast) -> Option<Self> {
        match broadcast.operation {
            Operation::Insert => row(broadcast.record.as_ref()).map(Self::Insert),
            Operation::Update => row(broadcast.record.as_ref()).map(Self::Update),
            Operation::Delete => row(broadcast.old_record.as_ref()).map(Self::Delete),
        }
    }
}

fn row<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    T::deserialize(value?).ok()
}

/// Every change the caches know how to apply.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    DirectMessage(RowChange<ChatMessage>),
    GroupMessage(RowChange<ChatMessage>),
    GroupMembership(RowChange<GroupMembership, GroupMembership>),
    Group(RowChange<GroupRow>),
    Board(RowChange<BoardRow>),
    Category(RowChange<CategoryRow>),
    Card(RowChange<Card>),
    BoardMember(RowChange<BoardMemberRow, BoardMemberRow>),
}

impl ChangeEvent {
    /// Decode raw frame bytes. Malformed frames yield `None`.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let broadcast = frames::decode_broadcast(bytes).ok()?;
        Self::from_broadcast(&broadcast)
    }

    /// Dispatch on (table, operation) only.
    #[must_use]
    pub fn from_broadcast(broadcast: &Broadcast) -> Option<Self> {
        let event = match broadcast.table.as_str() {
            "messages" => Self::DirectMessage(RowChange::from_broadcast(broadcast)?),
            "group_messages" => Self::GroupMessage(RowChange::from_broadcast(broadcast)?),
            "chat_group_members" => Self::GroupMembership(RowChange::from_broadcast(broadcast)?),
            "chat_groups" => Self::Group(RowChange::from_broadcast(broadcast)?),
            "kanban_boards" => Self::Board(RowChange::from_broadcast(broadcast)?),
            "kanban_categories" => Self::Category(RowChange::from_broadcast(broadcast)?),
            "kanban_cards" => Self::Card(RowChange::from_broadcast(broadcast)?),
            "kanban_board_members" => Self::BoardMember(RowChange::from_broadcast(broadcast)?),
            _ => return None,
        };
        Some(event)
    }

    /// True for events routed to the chat caches.
    #[must_use]
    pub fn is_chat(&self) -> bool {
        matches!(
            self,
            Self::DirectMessage(_) | Self::GroupMessage(_) | Self::GroupMembership(_) | Self::Group(_)
        )
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

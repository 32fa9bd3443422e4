//! Per-conversation message cache.
//!
//! DESIGN
//! ======
//! Each slug maps to a [`DetailState`]. Messages inside a loaded slot are
//! kept oldest first; every insert goes to its timestamp position, so a push
//! that overtakes an earlier one still lands in order. A message id appears
//! at most once per slot: a confirmed row whose id is already present is
//! merged into the existing entry in place; it only moves if the confirmed
//! timestamp no longer sorts at its index.
//!
//! A slot created by a send holds only the optimistic message and has never
//! seen the conversation history. It stays marked unfetched until a load
//! completes, so the first read still fetches and merges the history under
//! the messages already shown.
//!
//! Changes that arrive while a slot is still loading are buffered and merged
//! into the fetched rows when the load completes. Optimistic ids are tracked
//! in the same cell as the slots they live in, so one closure updates both.

use std::collections::HashMap;

use tokio::sync::watch;

use super::types::{ChatMessage, ChatSlug, SenderInfo};
use crate::pending::PendingSet;

#[derive(Clone, Debug, PartialEq)]
pub enum DetailState {
    Loading,
    Loaded(Vec<ChatMessage>),
    Error(String),
}

impl DetailState {
    #[must_use]
    pub fn messages(&self) -> Option<&[ChatMessage]> {
        match self {
            Self::Loaded(list) => Some(list),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagesState {
    pub conversations: HashMap<ChatSlug, DetailState>,
    pending: PendingSet<ChatSlug>,
    early: HashMap<ChatSlug, Vec<ChatMessage>>,
    unfetched: HashMap<ChatSlug, Hydration>,
}

/// Fetch state of a loaded slot that was created by a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hydration {
    Needed,
    Running,
}

impl MessagesState {
    /// True while `id` is an unconfirmed local send.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Shape of the slot before an optimistic send, used to undo it exactly.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SendSlot {
    Created,
    ReplacedError(String),
    Existing,
    Buffered,
}

/// What a confirmed insert did to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    Inserted,
    Merged,
    Buffered,
    NotCached,
}

pub struct MessageCache {
    state: watch::Sender<MessagesState>,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCache {
    #[must_use]
    pub fn new() -> Self {
        Self { state: watch::Sender::new(MessagesState::default()) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MessagesState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn get(&self, slug: &ChatSlug) -> Option<DetailState> {
        self.state.borrow().conversations.get(slug).cloned()
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.state.borrow().is_pending(id)
    }

    /// Sender metadata for `user_id` as joined onto any cached group message.
    #[must_use]
    pub fn sender_info(&self, user_id: &str) -> Option<SenderInfo> {
        self.state.borrow().conversations.values().find_map(|detail| {
            detail
                .messages()?
                .iter()
                .find_map(|m| m.sender.as_ref().filter(|s| s.id == user_id).cloned())
        })
    }

    /// Start a load for an absent, failed or unfetched slot. Absent and failed
    /// slots move to loading; an unfetched slot keeps showing its messages.
    /// Returns false if a load is already running or the slot is loaded.
    pub(crate) fn begin(&self, slug: &ChatSlug) -> bool {
        let mut started = false;
        self.state.send_if_modified(|s| match s.conversations.get(slug) {
            Some(DetailState::Loading) => false,
            Some(DetailState::Loaded(_)) => {
                if s.unfetched.get(slug) == Some(&Hydration::Needed) {
                    s.unfetched.insert(slug.clone(), Hydration::Running);
                    started = true;
                }
                false
            }
            _ => {
                s.conversations.insert(slug.clone(), DetailState::Loading);
                started = true;
                true
            }
        });
        started
    }

    /// Complete a load. Ignored unless the slot is still loading or is an
    /// unfetched slot whose load is running.
    pub(crate) fn finish(&self, slug: &ChatSlug, result: Result<Vec<ChatMessage>, String>) -> bool {
        self.state.send_if_modified(|s| {
            if s.unfetched.get(slug) == Some(&Hydration::Running) {
                let Some(DetailState::Loaded(list)) = s.conversations.get_mut(slug) else {
                    s.unfetched.remove(slug);
                    return false;
                };
                let Ok(mut rows) = result else {
                    s.unfetched.insert(slug.clone(), Hydration::Needed);
                    return false;
                };
                s.unfetched.remove(slug);
                rows.sort_by_key(|m| m.created_at);
                for message in std::mem::take(list) {
                    upsert_sorted(&mut rows, &mut s.pending, message);
                }
                *list = rows;
                return true;
            }
            if !matches!(s.conversations.get(slug), Some(DetailState::Loading)) {
                return false;
            }
            let early = s.early.remove(slug).unwrap_or_default();
            let next = match result {
                Ok(mut rows) => {
                    rows.sort_by_key(|m| m.created_at);
                    for message in early {
                        upsert_sorted(&mut rows, &mut s.pending, message);
                    }
                    DetailState::Loaded(rows)
                }
                Err(message) => {
                    s.pending.retain(|_, at| at != slug);
                    DetailState::Error(message)
                }
            };
            s.conversations.insert(slug.clone(), next);
            true
        })
    }

    /// Add an optimistic message and track its id.
    pub(crate) fn insert_optimistic(&self, slug: &ChatSlug, message: ChatMessage) -> SendSlot {
        let mut slot = SendSlot::Existing;
        self.state.send_modify(|s| {
            s.pending.register(message.id.clone(), slug.clone());
            match s.conversations.get_mut(slug) {
                Some(DetailState::Loaded(list)) => {
                    insert_sorted(list, message);
                }
                Some(DetailState::Loading) => {
                    s.early.entry(slug.clone()).or_default().push(message);
                    slot = SendSlot::Buffered;
                }
                Some(DetailState::Error(err)) => {
                    slot = SendSlot::ReplacedError(err.clone());
                    s.conversations.insert(slug.clone(), DetailState::Loaded(vec![message]));
                    s.unfetched.insert(slug.clone(), Hydration::Needed);
                }
                None => {
                    slot = SendSlot::Created;
                    s.conversations.insert(slug.clone(), DetailState::Loaded(vec![message]));
                    s.unfetched.insert(slug.clone(), Hydration::Needed);
                }
            }
        });
        slot
    }

    /// Undo [`MessageCache::insert_optimistic`].
    pub(crate) fn rollback_send(&self, slug: &ChatSlug, id: &str, slot: SendSlot) {
        self.state.send_modify(|s| {
            s.pending.forget(id);
            if let Some(buffer) = s.early.get_mut(slug) {
                buffer.retain(|m| m.id != id);
            }
            let emptied = match s.conversations.get_mut(slug) {
                Some(DetailState::Loaded(list)) => {
                    list.retain(|m| m.id != id);
                    list.is_empty()
                }
                _ => false,
            };
            if !emptied {
                return;
            }
            match slot {
                SendSlot::Created => {
                    s.conversations.remove(slug);
                    s.unfetched.remove(slug);
                }
                SendSlot::ReplacedError(err) => {
                    s.conversations.insert(slug.clone(), DetailState::Error(err));
                    s.unfetched.remove(slug);
                }
                SendSlot::Existing | SendSlot::Buffered => {}
            }
        });
    }

    /// Apply a confirmed insert: merge by id, else insert by timestamp.
    pub(crate) fn apply_insert(&self, slug: &ChatSlug, message: ChatMessage) -> InsertOutcome {
        let mut outcome = InsertOutcome::NotCached;
        self.state.send_if_modified(|s| match s.conversations.get_mut(slug) {
            Some(DetailState::Loaded(list)) => {
                outcome = upsert_sorted(list, &mut s.pending, message);
                true
            }
            Some(DetailState::Loading) => {
                let buffer = s.early.entry(slug.clone()).or_default();
                buffer.retain(|m| m.id != message.id);
                buffer.push(message);
                outcome = InsertOutcome::Buffered;
                true
            }
            _ => false,
        });
        outcome
    }

    /// Apply an edit to a message already in the slot.
    pub(crate) fn apply_update(&self, slug: &ChatSlug, message: ChatMessage) -> bool {
        self.state.send_if_modified(|s| match s.conversations.get_mut(slug) {
            Some(DetailState::Loaded(list)) => {
                if !list.iter().any(|m| m.id == message.id) {
                    return false;
                }
                upsert_sorted(list, &mut s.pending, message);
                true
            }
            Some(DetailState::Loading) => {
                let Some(buffer) = s.early.get_mut(slug) else {
                    return false;
                };
                let Some(existing) = buffer.iter_mut().find(|m| m.id == message.id) else {
                    return false;
                };
                existing.merge_confirmed(message);
                true
            }
            _ => false,
        })
    }

    /// Remove a message wherever it is cached. Returns the removed copy.
    pub(crate) fn remove_message(&self, id: &str) -> Option<(ChatSlug, ChatMessage)> {
        let mut removed = None;
        self.state.send_if_modified(|s| {
            s.pending.forget(id);
            for (slug, detail) in &mut s.conversations {
                if let DetailState::Loaded(list) = detail {
                    if let Some(index) = list.iter().position(|m| m.id == id) {
                        removed = Some((slug.clone(), list.remove(index)));
                        return true;
                    }
                }
            }
            for (slug, buffer) in &mut s.early {
                if let Some(index) = buffer.iter().position(|m| m.id == id) {
                    removed = Some((slug.clone(), buffer.remove(index)));
                    return true;
                }
            }
            false
        });
        removed
    }

    /// Put back a message removed by [`MessageCache::remove_message`]. A slot
    /// that is still loading gets it back in its early buffer.
    pub(crate) fn restore_message(&self, slug: &ChatSlug, message: ChatMessage) {
        self.state.send_if_modified(|s| {
            let restored = match s.conversations.get_mut(slug) {
                Some(DetailState::Loaded(list)) => {
                    if !list.iter().any(|m| m.id == message.id) {
                        insert_sorted(list, message.clone());
                    }
                    true
                }
                Some(DetailState::Loading) => {
                    let buffer = s.early.entry(slug.clone()).or_default();
                    if !buffer.iter().any(|m| m.id == message.id) {
                        buffer.push(message.clone());
                    }
                    true
                }
                _ => false,
            };
            if restored && message.optimistic {
                s.pending.register(message.id.clone(), slug.clone());
            }
            restored
        });
    }

    /// Evict one conversation and the optimistic ids that lived in it.
    pub(crate) fn remove(&self, slug: &ChatSlug) -> bool {
        self.state.send_if_modified(|s| {
            s.pending.retain(|_, at| at != slug);
            s.early.remove(slug);
            s.unfetched.remove(slug);
            s.conversations.remove(slug).is_some()
        })
    }

    pub(crate) fn clear(&self) {
        self.state.send_modify(|s| *s = MessagesState::default());
    }
}

fn insert_sorted(list: &mut Vec<ChatMessage>, message: ChatMessage) {
    let index = list.partition_point(|m| m.created_at <= message.created_at);
    list.insert(index, message);
}

/// Merge a confirmed row into `list`, consuming its pending registration.
fn upsert_sorted(list: &mut Vec<ChatMessage>, pending: &mut PendingSet<ChatSlug>, message: ChatMessage) -> InsertOutcome {
    if message.optimistic {
        if list.iter().any(|m| m.id == message.id) {
            pending.reconcile(&message.id);
            return InsertOutcome::Merged;
        }
        insert_sorted(list, message);
        return InsertOutcome::Inserted;
    }
    let Some(index) = list.iter().position(|m| m.id == message.id) else {
        insert_sorted(list, message);
        return InsertOutcome::Inserted;
    };
    if list[index].optimistic {
        pending.reconcile(&message.id);
    }
    list[index].merge_confirmed(message);
    let at = list[index].created_at;
    let after_prev = index == 0 || list[index - 1].created_at <= at;
    let before_next = list.get(index + 1).is_none_or(|next| at <= next.created_at);
    let sorted_here = after_prev && before_next;
    if !sorted_here {
        let moved = list.remove(index);
        insert_sorted(list, moved);
    }
    InsertOutcome::Merged
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;

//! Conversation overview cache.
//!
//! One [`ConversationSummary`] per slug for the current scope, held in a
//! `watch` cell so readers get synchronous snapshots and observers are woken
//! on every change. Mutations are single closures over the cell.

use std::collections::BTreeMap;

use tokio::sync::watch;

use super::types::{ChatMessage, ChatSlug, ConversationSummary};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverviewState {
    pub status: LoadStatus,
    pub conversations: BTreeMap<ChatSlug, ConversationSummary>,
}

pub struct OverviewCache {
    state: watch::Sender<OverviewState>,
}

impl Default for OverviewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OverviewCache {
    #[must_use]
    pub fn new() -> Self {
        Self { state: watch::Sender::new(OverviewState::default()) }
    }

    #[must_use]
    pub fn current(&self) -> OverviewState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OverviewState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        self.state.borrow().status.clone()
    }

    #[must_use]
    pub fn get(&self, slug: &ChatSlug) -> Option<ConversationSummary> {
        self.state.borrow().conversations.get(slug).cloned()
    }

    #[must_use]
    pub fn contains(&self, slug: &ChatSlug) -> bool {
        self.state.borrow().conversations.contains_key(slug)
    }

    /// Summaries ordered by last activity, newest first; silent ones last.
    #[must_use]
    pub fn by_recent(&self) -> Vec<ConversationSummary> {
        let mut rows: Vec<ConversationSummary> = self.state.borrow().conversations.values().cloned().collect();
        rows.sort_by(|a, b| b.msg_created_at.cmp(&a.msg_created_at));
        rows
    }

    pub(crate) fn begin_load(&self) {
        self.state.send_modify(|s| s.status = LoadStatus::Loading);
    }

    pub(crate) fn finish(&self, rows: Vec<ConversationSummary>) {
        self.state.send_modify(|s| {
            s.conversations = rows.into_iter().map(|row| (row.slug(), row)).collect();
            s.status = LoadStatus::Loaded;
        });
    }

    /// Failed loads leave the overview empty.
    pub(crate) fn fail(&self, message: String) {
        self.state.send_modify(|s| {
            s.conversations.clear();
            s.status = LoadStatus::Failed(message);
        });
    }

    pub(crate) fn upsert(&self, summary: ConversationSummary) {
        self.state.send_modify(|s| {
            s.conversations.insert(summary.slug(), summary);
        });
    }

    pub(crate) fn remove(&self, slug: &ChatSlug) -> bool {
        self.state.send_if_modified(|s| s.conversations.remove(slug).is_some())
    }

    /// Update the preview for a new message. Returns false if the slug has no
    /// summary yet. A message already shown as the preview is not counted twice.
    pub(crate) fn apply_message(&self, slug: &ChatSlug, message: &ChatMessage, from_other: bool) -> bool {
        let mut known = false;
        self.state.send_if_modified(|s| {
            let Some(summary) = s.conversations.get_mut(slug) else {
                return false;
            };
            known = true;
            if summary.msg_created_at == Some(message.created_at) && summary.data == message.data {
                return false;
            }
            if summary.msg_created_at.is_some_and(|at| at > message.created_at) {
                return false;
            }
            summary.set_preview(message);
            if from_other {
                summary.unread_count += 1;
            }
            true
        });
        known
    }

    /// Refresh the preview after an edit, if the edited message is the one shown.
    pub(crate) fn apply_edit(&self, slug: &ChatSlug, message: &ChatMessage) {
        self.state.send_if_modified(|s| {
            let Some(summary) = s.conversations.get_mut(slug) else {
                return false;
            };
            if summary.msg_created_at != Some(message.created_at) {
                return false;
            }
            summary.set_preview(message);
            true
        });
    }

    pub(crate) fn mark_read(&self, slug: &ChatSlug, at: time::OffsetDateTime) -> bool {
        self.state.send_if_modified(|s| {
            let Some(summary) = s.conversations.get_mut(slug) else {
                return false;
            };
            summary.unread_count = 0;
            summary.msg_read_at = Some(at);
            true
        })
    }

    pub(crate) fn clear(&self) {
        self.state.send_modify(|s| *s = OverviewState::default());
    }
}

#[cfg(test)]
#[path = "overview_test.rs"]
mod tests;

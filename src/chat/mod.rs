//! Messaging caches: conversation overview and per-conversation messages.
//!
//! DESIGN
//! ======
//! [`ChatStore`] owns both caches plus the scope controller that bounds
//! them. Every entry point that names an organisation first enters that
//! scope; a change wipes the overview, every message slot and every tracked
//! optimistic id before anything else happens. Async completions capture the
//! scope generation up front and drop their result if it moved.
//!
//! Realtime changes reach the store through `apply_*` methods that share
//! the same cache operations as the fetch and send paths.
//!
//! ERROR HANDLING
//! ==============
//! Fetch failures are reported and recorded in the cache (empty overview,
//! error-tagged slot); nothing is retried. Send and delete failures roll the
//! optimistic change back before the error is returned.

pub mod messages;
pub mod overview;
pub mod types;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::error::SyncError;
use crate::notify::{Notifier, report};
use crate::realtime::event::{RecordId, RowChange};
use crate::session::{Scope, ScopeController, ScopeEntry, SessionHandle};
use messages::{DetailState, MessageCache};
use overview::{LoadStatus, OverviewCache};
use types::{ChatMessage, ChatSlug, ConversationKind, GroupMembership, GroupRow, MessageContent};

pub struct ChatStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Arc<dyn Notifier>,
    session: SessionHandle,
    scope: ScopeController,
    overview: OverviewCache,
    messages: MessageCache,
    summary_fetches: Mutex<HashSet<ChatSlug>>,
}

impl ChatStore {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, notifier: Arc<dyn Notifier>, session: SessionHandle) -> Self {
        Self {
            backend,
            notifier,
            session,
            scope: ScopeController::new(),
            overview: OverviewCache::new(),
            messages: MessageCache::new(),
            summary_fetches: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn overview(&self) -> &OverviewCache {
        &self.overview
    }

    #[must_use]
    pub fn messages(&self) -> &MessageCache {
        &self.messages
    }

    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.scope.current()
    }

    /// Enter `org_id`/`user_id`, wiping every cache if the scope changed.
    fn enter(&self, org_id: &str, user_id: &str) -> ScopeEntry {
        let entry = self.scope.enter(&Scope::new(org_id, user_id));
        if let ScopeEntry::Changed(generation) = entry {
            info!(org_id, user_id, generation, "chat scope changed; clearing caches");
            self.overview.clear();
            self.messages.clear();
        }
        entry
    }

    // =========================================================================
    // OVERVIEW
    // =========================================================================

    /// Load the conversation overview for a scope. Repeated calls for an
    /// unchanged scope are served from the cache.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the overview is left empty.
    pub async fn fetch_overview(&self, org_id: &str, user_id: &str) -> Result<(), SyncError> {
        let entry = self.enter(org_id, user_id);
        if matches!(entry, ScopeEntry::Unchanged(_)) && matches!(self.overview.status(), LoadStatus::Loaded | LoadStatus::Loading) {
            return Ok(());
        }
        let generation = entry.generation();
        self.overview.begin_load();

        let result = self.backend.chat_overview(org_id).await;
        if !self.scope.is_current(generation) {
            debug!(org_id, "discarding stale chat overview");
            return Ok(());
        }
        match result {
            Ok(rows) => {
                debug!(org_id, count = rows.len(), "chat overview loaded");
                self.overview.finish(rows);
                Ok(())
            }
            Err(e) => {
                warn!(org_id, error = %e, "chat overview failed");
                self.overview.fail(e.to_string());
                let err = SyncError::from(e);
                report(self.notifier.as_ref(), &err, "get_chat_overview", "Could not get chat overview");
                Err(err)
            }
        }
    }

    /// Reset the unread counter of a conversation locally.
    pub fn mark_read(&self, slug: &ChatSlug) -> bool {
        self.overview.mark_read(slug, OffsetDateTime::now_utc())
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Current state of a conversation, starting a background load if the
    /// slot is absent or failed.
    pub fn fetch(self: &Arc<Self>, slug: &ChatSlug, org_id: &str, user_id: &str) -> Option<DetailState> {
        if let Some(generation) = self.start_load(slug, org_id, user_id) {
            let store = Arc::clone(self);
            let slug = slug.clone();
            let org_id = org_id.to_string();
            tokio::spawn(async move {
                store.complete_load(&slug, &org_id, generation).await;
            });
        }
        self.messages.get(slug)
    }

    /// Like [`ChatStore::fetch`] but waits for a load it starts to finish.
    pub async fn load_messages(&self, slug: &ChatSlug, org_id: &str, user_id: &str) -> Option<DetailState> {
        if let Some(generation) = self.start_load(slug, org_id, user_id) {
            self.complete_load(slug, org_id, generation).await;
        }
        self.messages.get(slug)
    }

    fn start_load(&self, slug: &ChatSlug, org_id: &str, user_id: &str) -> Option<u64> {
        let generation = self.enter(org_id, user_id).generation();
        self.messages.begin(slug).then_some(generation)
    }

    async fn complete_load(&self, slug: &ChatSlug, org_id: &str, generation: u64) {
        let result = self.backend.messages(org_id, slug).await;
        if !self.scope.is_current(generation) {
            debug!(%slug, "discarding stale messages");
            return;
        }
        match result {
            Ok(rows) => {
                debug!(%slug, count = rows.len(), "messages loaded");
                self.messages.finish(slug, Ok(rows));
            }
            Err(e) => {
                warn!(%slug, error = %e, "messages fetch failed");
                self.messages.finish(slug, Err(e.to_string()));
                self.notifier.capture(&e, "messages");
            }
        }
    }

    /// Send a message optimistically and persist it under its local id.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] without a session (nothing changes);
    /// otherwise the backend failure, after the optimistic copy is removed.
    pub async fn send_message(
        &self,
        kind: ConversationKind,
        recipient_id: &str,
        content: MessageContent,
        org_id: &str,
        user_id: &str,
    ) -> Result<String, SyncError> {
        self.session.require()?;
        self.enter(org_id, user_id);

        let slug = ChatSlug::new(kind, recipient_id);
        let (typ, data) = content.into_parts();
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            from_id: user_id.to_string(),
            to_id: recipient_id.to_string(),
            org_id: org_id.to_string(),
            typ,
            data,
            created_at: OffsetDateTime::now_utc(),
            edited_at: None,
            sender: if slug.is_group() { self.messages.sender_info(user_id) } else { None },
            optimistic: true,
        };
        let slot = self.messages.insert_optimistic(&slug, message.clone());

        match self.backend.insert_message(kind, &message).await {
            Ok(()) => {
                debug!(%slug, id = %message.id, "message sent");
                Ok(message.id)
            }
            Err(e) => {
                warn!(%slug, id = %message.id, error = %e, "send failed; rolling back");
                self.messages.rollback_send(&slug, &message.id, slot);
                let err = SyncError::from(e);
                report(self.notifier.as_ref(), &err, "send_message", "Could not send message");
                Err(err)
            }
        }
    }

    /// Delete a message locally, restoring it if the backend refuses.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`], [`SyncError::NotFound`] if the
    /// message is not cached, or the backend failure.
    pub async fn delete_message(&self, kind: ConversationKind, message_id: &str) -> Result<(), SyncError> {
        self.session.require()?;
        let (slug, removed) = self
            .messages
            .remove_message(message_id)
            .ok_or_else(|| SyncError::not_found("message", message_id))?;

        if let Err(e) = self.backend.delete_message(kind, message_id).await {
            warn!(%slug, id = message_id, error = %e, "delete failed; restoring");
            self.messages.restore_message(&slug, removed);
            let err = SyncError::from(e);
            report(self.notifier.as_ref(), &err, "delete_message", "Could not delete message");
            return Err(err);
        }
        Ok(())
    }

    /// Evict one conversation's messages.
    pub fn remove_chat(&self, slug: &ChatSlug) -> bool {
        self.messages.remove(slug)
    }

    /// Evict every conversation's messages.
    pub fn clear_all(&self) {
        self.messages.clear();
    }

    /// Drop every cache and forget the scope (sign-out).
    pub fn reset(&self) {
        self.scope.reset();
        self.overview.clear();
        self.messages.clear();
    }

    // =========================================================================
    // REALTIME
    // =========================================================================

    /// Apply a message row change from a direct or group channel.
    pub async fn apply_message_change(&self, kind: ConversationKind, change: RowChange<ChatMessage>) {
        let Some(scope) = self.scope.current() else {
            return;
        };
        match change {
            RowChange::Insert(message) => self.apply_message_insert(&scope, kind, message).await,
            RowChange::Update(message) => {
                if message.org_id != scope.org_id {
                    return;
                }
                let slug = message.slug_for(kind, &scope.user_id);
                self.overview.apply_edit(&slug, &message);
                self.messages.apply_update(&slug, message);
            }
            RowChange::Delete(RecordId { id }) => {
                self.messages.remove_message(&id);
            }
        }
    }

    async fn apply_message_insert(&self, scope: &Scope, kind: ConversationKind, message: ChatMessage) {
        if message.org_id != scope.org_id {
            debug!(id = %message.id, "ignoring message from another org");
            return;
        }
        let slug = message.slug_for(kind, &scope.user_id);
        let from_other = message.from_id != scope.user_id;
        let outcome = self.messages.apply_insert(&slug, message.clone());
        debug!(%slug, id = %message.id, ?outcome, "message insert applied");
        if !self.overview.apply_message(&slug, &message, from_other) {
            self.hydrate_summary(scope, &slug).await;
        }
    }

    /// Fetch the overview row for a conversation first seen via realtime.
    /// Skipped until the overview itself has loaded; at most one fetch per
    /// conversation runs at a time.
    async fn hydrate_summary(&self, scope: &Scope, slug: &ChatSlug) {
        if self.overview.status() != LoadStatus::Loaded {
            debug!(%slug, status = ?self.overview.status(), "overview not loaded; skipping summary hydrate");
            return;
        }
        if !self.summary_fetches().insert(slug.clone()) {
            debug!(%slug, "summary hydrate already running");
            return;
        }
        let generation = self.scope.generation();
        let result = self.backend.conversation_summary(&scope.org_id, slug).await;
        self.summary_fetches().remove(slug);
        match result {
            Ok(Some(summary)) if self.scope.is_current(generation) => self.overview.upsert(summary),
            Ok(_) => debug!(%slug, "no summary to hydrate"),
            Err(e) => {
                warn!(%slug, error = %e, "summary hydrate failed");
                self.notifier.capture(&e, "get_chat_overview");
            }
        }
    }

    fn summary_fetches(&self) -> MutexGuard<'_, HashSet<ChatSlug>> {
        self.summary_fetches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a group membership change for the current user.
    pub async fn apply_membership_change(&self, change: RowChange<GroupMembership, GroupMembership>) {
        let Some(scope) = self.scope.current() else {
            return;
        };
        match change {
            RowChange::Insert(row) | RowChange::Update(row) if row.user_id == scope.user_id => {
                let slug = ChatSlug::group(&row.group_id);
                if !self.overview.contains(&slug) {
                    self.hydrate_summary(&scope, &slug).await;
                }
            }
            RowChange::Delete(row) if row.user_id == scope.user_id => {
                self.conversation_removed(&ChatSlug::group(&row.group_id));
            }
            _ => {}
        }
    }

    /// Apply a change to a group row (rename or deletion).
    pub fn apply_group_change(&self, change: RowChange<GroupRow>) {
        match change {
            RowChange::Insert(_) => {}
            RowChange::Update(group) => {
                let slug = ChatSlug::group(&group.id);
                if let Some(mut summary) = self.overview.get(&slug) {
                    summary.name = group.name;
                    self.overview.upsert(summary);
                }
            }
            RowChange::Delete(RecordId { id }) => self.conversation_removed(&ChatSlug::group(id)),
        }
    }

    fn conversation_removed(&self, slug: &ChatSlug) {
        info!(%slug, "conversation removed");
        self.overview.remove(slug);
        self.messages.remove(slug);
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

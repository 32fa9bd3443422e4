//! Realtime subscription manager.
//!
//! DESIGN
//! ======
//! Subscriptions are keyed by [`ChannelKey`]. Chat channels are bound to one
//! (organisation, user) scope. Board channels are opened and closed per board.
//! Leaving a scope for a different one closes every channel, boards included,
//! before the new chat channels open; the board caches of the old scope are
//! gone by then.
//!
//! Each open channel has a reader task holding only a weak reference to the
//! manager. Closing a channel aborts its reader and unsubscribes from the
//! transport, so no event for a closed channel reaches a cache.
//!
//! ERROR HANDLING
//! ==============
//! Subscribe and membership-query failures are captured through the notifier
//! and logged; they never propagate to the caller. Undecodable frames are
//! dropped at trace level.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::event::{ChangeEvent, RowChange};
use super::transport::PushTransport;
use crate::backend::ChatBackend;
use crate::chat::ChatStore;
use crate::chat::types::{ConversationKind, GroupMembership};
use crate::kanban::KanbanStore;
use crate::notify::Notifier;
use crate::session::Scope;

/// One realtime channel, rendered to its wire name via `Display`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKey {
    /// Direct messages to and from a user within an organisation.
    Direct { org_id: String, user_id: String },
    /// Group membership changes for a user within an organisation.
    Membership { org_id: String, user_id: String },
    Group(String),
    Board(String),
    Categories(String),
    Cards(String),
    Members(String),
}

impl ChannelKey {
    #[must_use]
    pub fn is_chat(&self) -> bool {
        matches!(self, Self::Direct { .. } | Self::Membership { .. } | Self::Group(_))
    }

    /// The four channels that keep one board current.
    #[must_use]
    pub fn board_channels(board_id: &str) -> [Self; 4] {
        [
            Self::Board(board_id.to_string()),
            Self::Categories(board_id.to_string()),
            Self::Cards(board_id.to_string()),
            Self::Members(board_id.to_string()),
        ]
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { org_id, user_id } => write!(f, "chat-direct:{org_id}:{user_id}"),
            Self::Membership { org_id, user_id } => write!(f, "chat-membership:{org_id}:{user_id}"),
            Self::Group(id) => write!(f, "chat-group:{id}"),
            Self::Board(id) => write!(f, "kanban-board:{id}"),
            Self::Categories(id) => write!(f, "kanban-cat:{id}"),
            Self::Cards(id) => write!(f, "kanban-cards:{id}"),
            Self::Members(id) => write!(f, "kanban-members:{id}"),
        }
    }
}

#[derive(Default)]
struct Subscriptions {
    chat_scope: Option<Scope>,
    readers: HashMap<ChannelKey, JoinHandle<()>>,
}

pub struct RealtimeManager {
    transport: Arc<dyn PushTransport>,
    chat_backend: Arc<dyn ChatBackend>,
    chat: Arc<ChatStore>,
    kanban: Arc<KanbanStore>,
    notifier: Arc<dyn Notifier>,
    subs: Mutex<Subscriptions>,
}

impl RealtimeManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn PushTransport>,
        chat_backend: Arc<dyn ChatBackend>,
        chat: Arc<ChatStore>,
        kanban: Arc<KanbanStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self { transport, chat_backend, chat, kanban, notifier, subs: Mutex::new(Subscriptions::default()) })
    }

    /// Wire names of every open channel, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let subs = self.subs.lock().await;
        let mut keys: Vec<&ChannelKey> = subs.readers.keys().collect();
        keys.sort();
        keys.into_iter().map(ToString::to_string).collect()
    }

    pub async fn chat_scope(&self) -> Option<Scope> {
        self.subs.lock().await.chat_scope.clone()
    }

    // =========================================================================
    // CHAT
    // =========================================================================

    /// Open the chat channels for `org_id`/`user_id`. A no-op when that scope
    /// is already live. Leaving a previous scope closes all of its channels,
    /// board channels included; on first use only stray chat channels close.
    pub async fn initialize_chat(self: &Arc<Self>, org_id: &str, user_id: &str) {
        let scope = Scope::new(org_id, user_id);
        let mut subs = self.subs.lock().await;
        if subs.chat_scope.as_ref() == Some(&scope) {
            debug!(org_id, user_id, "chat channels already live");
            return;
        }
        if let Some(previous) = &subs.chat_scope {
            info!(from = %previous.org_id, to = org_id, "scope changed; closing every channel");
            self.close_where(&mut subs, |_| true).await;
        } else {
            self.close_where(&mut subs, ChannelKey::is_chat).await;
        }
        subs.chat_scope = Some(scope);
        info!(org_id, user_id, "initializing chat channels");

        let direct = ChannelKey::Direct { org_id: org_id.to_string(), user_id: user_id.to_string() };
        let membership = ChannelKey::Membership { org_id: org_id.to_string(), user_id: user_id.to_string() };
        self.open(&mut subs, direct).await;
        self.open(&mut subs, membership).await;

        match self.chat_backend.group_ids(org_id, user_id).await {
            Ok(group_ids) => {
                for group_id in group_ids {
                    self.open(&mut subs, ChannelKey::Group(group_id)).await;
                }
            }
            Err(e) => {
                warn!(org_id, user_id, error = %e, "group membership query failed");
                self.notifier.capture(&e, "chat_group_members");
            }
        }
    }

    // =========================================================================
    // KANBAN
    // =========================================================================

    /// Open the four channels of a board. Already-open boards are left alone.
    pub async fn open_board(self: &Arc<Self>, board_id: &str, user_id: &str) {
        let mut subs = self.subs.lock().await;
        if subs.readers.contains_key(&ChannelKey::Board(board_id.to_string())) {
            debug!(board_id, "board channels already live");
            return;
        }
        info!(board_id, user_id, "opening board channels");
        for key in ChannelKey::board_channels(board_id) {
            self.open(&mut subs, key).await;
        }
    }

    pub async fn close_board(&self, board_id: &str) {
        let mut subs = self.subs.lock().await;
        for key in ChannelKey::board_channels(board_id) {
            self.close(&mut subs, &key).await;
        }
    }

    /// Close every channel and forget the chat scope.
    pub async fn shutdown(&self) {
        let mut subs = self.subs.lock().await;
        self.close_where(&mut subs, |_| true).await;
        subs.chat_scope = None;
        info!("realtime shut down");
    }

    // =========================================================================
    // CHANNELS
    // =========================================================================

    /// Subscribe `key` and start its reader. A refused subscribe is
    /// captured and the channel stays closed.
    async fn open(self: &Arc<Self>, subs: &mut Subscriptions, key: ChannelKey) {
        if subs.readers.contains_key(&key) {
            return;
        }
        let channel = key.to_string();
        match self.transport.subscribe(&channel).await {
            Ok(rx) => {
                info!(%channel, "subscription opened");
                subs.readers.insert(key, self.spawn_reader(channel, rx));
            }
            Err(e) => {
                warn!(%channel, error = %e, "subscribe failed");
                self.notifier.capture(&e, "realtime_subscribe");
            }
        }
    }

    fn spawn_reader(self: &Arc<Self>, channel: String, rx: mpsc::Receiver<Vec<u8>>) -> JoinHandle<()> {
        tokio::spawn(read_channel(Arc::downgrade(self), channel, rx))
    }

    async fn close(&self, subs: &mut Subscriptions, key: &ChannelKey) {
        let Some(reader) = subs.readers.remove(key) else {
            return;
        };
        reader.abort();
        let channel = key.to_string();
        self.transport.unsubscribe(&channel).await;
        info!(%channel, "subscription closed");
    }

    async fn close_where(&self, subs: &mut Subscriptions, matches: impl Fn(&ChannelKey) -> bool) {
        let keys: Vec<ChannelKey> = subs.readers.keys().filter(|&k| matches(k)).cloned().collect();
        for key in keys {
            self.close(subs, &key).await;
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Route one decoded event to the cache that owns its table.
    async fn dispatch(self: &Arc<Self>, event: ChangeEvent) {
        match event {
            ChangeEvent::DirectMessage(change) => self.chat.apply_message_change(ConversationKind::Direct, change).await,
            ChangeEvent::GroupMessage(change) => self.chat.apply_message_change(ConversationKind::Group, change).await,
            ChangeEvent::GroupMembership(change) => {
                self.chat.apply_membership_change(change.clone()).await;
                self.follow_membership(change).await;
            }
            ChangeEvent::Group(change) => self.chat.apply_group_change(change),
            ChangeEvent::Board(change) => self.kanban.apply_board_change(change),
            ChangeEvent::Category(change) => self.kanban.apply_category_change(change),
            ChangeEvent::Card(change) => self.kanban.apply_card_change(change),
            ChangeEvent::BoardMember(change) => self.kanban.apply_member_change(change),
        }
    }

    /// Open or close a group channel when the current user joins or leaves.
    async fn follow_membership(self: &Arc<Self>, change: RowChange<GroupMembership, GroupMembership>) {
        let mut subs = self.subs.lock().await;
        let Some(user_id) = subs.chat_scope.as_ref().map(|s| s.user_id.clone()) else {
            return;
        };
        match change {
            RowChange::Insert(row) if row.user_id == user_id => {
                self.open(&mut subs, ChannelKey::Group(row.group_id)).await;
            }
            RowChange::Delete(row) if row.user_id == user_id => {
                self.close(&mut subs, &ChannelKey::Group(row.group_id)).await;
            }
            _ => {}
        }
    }
}

/// Reader loop for one channel. Ends when the transport drops the sender,
/// when the task is aborted, or once the manager is gone.
async fn read_channel(manager: Weak<RealtimeManager>, channel: String, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = rx.recv().await {
        let Some(event) = ChangeEvent::decode(&bytes) else {
            trace!(%channel, len = bytes.len(), "dropping undecodable frame");
            continue;
        };
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.dispatch(event).await;
    }
    debug!(%channel, "channel reader finished");
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

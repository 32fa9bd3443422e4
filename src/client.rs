//! Session-wide entry point bundling the stores and the realtime manager.
//!
//! DESIGN
//! ======
//! One [`SyncClient`] is built per signed-in session. It owns the chat and
//! kanban stores behind `Arc` so UI code and realtime reader tasks share the
//! same caches. Entering an organisation opens the chat channels and loads
//! both overviews concurrently; the stores enter the new scope on their
//! first poll, so events that arrive meanwhile are applied to the new scope.

use std::sync::Arc;

use tracing::info;

use crate::backend::{ChatBackend, KanbanBackend};
use crate::chat::ChatStore;
use crate::error::SyncError;
use crate::kanban::KanbanStore;
use crate::kanban::types::Board;
use crate::notify::Notifier;
use crate::realtime::{PushTransport, RealtimeManager};
use crate::session::SessionHandle;

pub struct SyncClient {
    session: SessionHandle,
    chat: Arc<ChatStore>,
    kanban: Arc<KanbanStore>,
    realtime: Arc<RealtimeManager>,
}

impl SyncClient {
    #[must_use]
    pub fn new<B>(backend: Arc<B>, transport: Arc<dyn PushTransport>, notifier: Arc<dyn Notifier>, session: SessionHandle) -> Self
    where
        B: ChatBackend + KanbanBackend + 'static,
    {
        let chat = Arc::new(ChatStore::new(backend.clone(), notifier.clone(), session.clone()));
        let kanban = Arc::new(KanbanStore::new(backend.clone(), notifier.clone(), session.clone()));
        let realtime = RealtimeManager::new(transport, backend, chat.clone(), kanban.clone(), notifier);
        Self { session, chat, kanban, realtime }
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn chat(&self) -> &Arc<ChatStore> {
        &self.chat
    }

    #[must_use]
    pub fn kanban(&self) -> &Arc<KanbanStore> {
        &self.kanban
    }

    #[must_use]
    pub fn realtime(&self) -> &Arc<RealtimeManager> {
        &self.realtime
    }

    /// Make `org_id` current: open chat channels, load the chat overview and
    /// every board of the organisation.
    ///
    /// # Errors
    ///
    /// The first load failure (chat first). Both loads always run to
    /// completion and record their own failure in their cache.
    pub async fn enter_org(&self, org_id: &str, user_id: &str) -> Result<(), SyncError> {
        info!(org_id, user_id, "entering organisation");
        let ((), chat, kanban) = tokio::join!(
            self.realtime.initialize_chat(org_id, user_id),
            self.chat.fetch_overview(org_id, user_id),
            self.kanban.fetch_all(org_id, user_id),
        );
        chat?;
        kanban
    }

    /// Load a board and keep it current through its channels.
    ///
    /// # Errors
    ///
    /// Same as [`KanbanStore::fetch_board`]; channels are opened only once
    /// the board loaded.
    pub async fn open_board(&self, board_id: &str, user_id: &str) -> Result<Option<Board>, SyncError> {
        let board = self.kanban.fetch_board(board_id, false).await?;
        if board.is_some() {
            self.realtime.open_board(board_id, user_id).await;
        }
        Ok(board)
    }

    pub async fn close_board(&self, board_id: &str) {
        self.realtime.close_board(board_id).await;
    }

    /// Close every channel, drop every cache and clear the session.
    pub async fn sign_out(&self) {
        self.realtime.shutdown().await;
        self.chat.reset();
        self.kanban.reset();
        self.session.set(None);
        info!("signed out");
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

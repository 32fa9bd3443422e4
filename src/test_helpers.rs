//! Scriptable collaborators and fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Notify;

use crate::backend::{BackendError, ChatBackend, KanbanBackend};
use crate::chat::types::{ChatMessage, ChatSlug, ConversationKind, ConversationSummary, MessageType};
use crate::error::ErrorCode;
use crate::kanban::types::{
    BoardMemberRow, BoardPatch, BoardRow, Card, CardPatch, CategoryPatch, CategoryRow, Member, NewBoard,
};
use crate::notify::Notifier;
use crate::session::{Session, SessionHandle};

// =============================================================================
// FIXTURES
// =============================================================================

/// Fixed base time plus `secs`.
#[must_use]
pub fn ts(secs: i64) -> OffsetDateTime {
    datetime!(2024-05-01 10:00 UTC) + time::Duration::seconds(secs)
}

#[must_use]
pub fn signed_in(user_id: &str) -> SessionHandle {
    SessionHandle::new(Some(Session { user_id: user_id.into(), access_token: format!("token-{user_id}") }))
}

#[must_use]
pub fn message(id: &str, from: &str, to: &str, secs: i64) -> ChatMessage {
    ChatMessage {
        id: id.into(),
        from_id: from.into(),
        to_id: to.into(),
        org_id: "orgA".into(),
        typ: MessageType::Text,
        data: serde_json::json!(format!("text {id}")),
        created_at: ts(secs),
        edited_at: None,
        sender: None,
        optimistic: false,
    }
}

#[must_use]
pub fn summary(slug: &ChatSlug, name: &str) -> ConversationSummary {
    ConversationSummary {
        is_group: slug.is_group(),
        id: slug.id().into(),
        name: name.into(),
        avatar_url: String::new(),
        unread_count: 0,
        typ: None,
        data: serde_json::Value::Null,
        msg_created_at: None,
        msg_edited_at: None,
        msg_read_at: None,
    }
}

#[must_use]
pub fn board_row(id: &str, org_id: &str) -> BoardRow {
    BoardRow { id: id.into(), name: format!("Board {id}"), org_id: org_id.into(), owner_id: "u1".into(), created_at: ts(0) }
}

#[must_use]
pub fn category_row(id: &str, board_id: &str, position: i64) -> CategoryRow {
    CategoryRow {
        id: id.into(),
        board_id: board_id.into(),
        name: format!("Category {id}"),
        color: "#888888".into(),
        position,
        created_at: ts(position),
    }
}

#[must_use]
pub fn card(id: &str, board_id: &str, category_id: &str, position: i64) -> Card {
    Card {
        id: id.into(),
        board_id: board_id.into(),
        category_id: category_id.into(),
        title: format!("Card {id}"),
        description: Some(String::new()),
        priority: None,
        due_date: None,
        tags: Vec::new(),
        created_by: "u1".into(),
        created_at: ts(position),
        updated_at: None,
        position,
    }
}

#[must_use]
pub fn member_row(board_id: &str, user_id: &str, name: &str) -> BoardMemberRow {
    BoardMemberRow {
        board_id: board_id.into(),
        user_id: user_id.into(),
        user: Some(Member { id: user_id.into(), name: name.into(), avatar_url: String::new() }),
    }
}

/// Poll `check` until it holds; panics after two seconds.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Broadcast carrying `row` as its new record.
pub fn row_broadcast<T: serde::Serialize>(channel: &str, operation: frames::Operation, table: &str, row: &T) -> frames::Broadcast {
    frames::Broadcast::new(channel, operation, table).with_record(serde_json::to_value(row).unwrap())
}

/// Delete broadcast carrying `old` as the removed row.
pub fn delete_broadcast(channel: &str, table: &str, old: serde_json::Value) -> frames::Broadcast {
    frames::Broadcast::new(channel, frames::Operation::Delete, table).with_old_record(old)
}

// =============================================================================
// RECORDING NOTIFIER
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<(String, String)>>,
    pub captures: Mutex<Vec<(&'static str, &'static str)>>,
}

impl RecordingNotifier {
    pub fn error_titles(&self) -> Vec<String> {
        self.errors.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn capture_contexts(&self) -> Vec<&'static str> {
        self.captures.lock().unwrap().iter().map(|(_, c)| *c).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.into());
    }

    fn error(&self, title: &str, description: &str) {
        self.errors.lock().unwrap().push((title.into(), description.into()));
    }

    fn capture(&self, err: &dyn ErrorCode, context: &'static str) {
        self.captures.lock().unwrap().push((err.error_code(), context));
    }
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// In-memory backend. Calls are counted per method; a gate registered for
/// `"method"` or `"method:arg"` holds the call until the test releases it
/// with `notify_one`; failures are injected the same way.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failures: Mutex<HashSet<String>>,
    pub writes: Mutex<Vec<String>>,
    pub overview: Mutex<HashMap<String, Vec<ConversationSummary>>>,
    pub messages: Mutex<HashMap<ChatSlug, Vec<ChatMessage>>>,
    pub groups: Mutex<HashMap<(String, String), Vec<String>>>,
    pub boards: Mutex<Vec<BoardRow>>,
    pub categories: Mutex<Vec<CategoryRow>>,
    pub cards: Mutex<Vec<Card>>,
    pub members: Mutex<Vec<BoardMemberRow>>,
    pub users: Mutex<HashMap<String, Member>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or fetch) the gate for `key`.
    pub fn gate(&self, key: &str) -> Arc<Notify> {
        self.gates.lock().unwrap().entry(key.into()).or_default().clone()
    }

    pub fn fail(&self, key: &str) {
        self.failures.lock().unwrap().insert(key.into());
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Wait until `key` has been called at least `n` times.
    pub async fn wait_for_calls(&self, key: &str, n: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while self.calls(key) < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Seed a full board: row, categories, cards and members.
    pub fn seed_board(&self, board: BoardRow, categories: Vec<CategoryRow>, cards: Vec<Card>, members: Vec<BoardMemberRow>) {
        self.boards.lock().unwrap().push(board);
        self.categories.lock().unwrap().extend(categories);
        self.cards.lock().unwrap().extend(cards);
        self.members.lock().unwrap().extend(members);
    }

    async fn enter(&self, method: &str, arg: &str) -> Result<(), BackendError> {
        let keyed = format!("{method}:{arg}");
        {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry(method.into()).or_default() += 1;
            *calls.entry(keyed.clone()).or_default() += 1;
        }
        let gate = {
            let gates = self.gates.lock().unwrap();
            gates.get(&keyed).or_else(|| gates.get(method)).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let failures = self.failures.lock().unwrap();
        if failures.contains(method) || failures.contains(&keyed) {
            return Err(BackendError::Status { status: 500, message: format!("{method} failed") });
        }
        Ok(())
    }

    fn record(&self, write: String) {
        self.writes.lock().unwrap().push(write);
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat_overview(&self, org_id: &str) -> Result<Vec<ConversationSummary>, BackendError> {
        self.enter("chat_overview", org_id).await?;
        Ok(self.overview.lock().unwrap().get(org_id).cloned().unwrap_or_default())
    }

    async fn conversation_summary(
        &self,
        org_id: &str,
        slug: &ChatSlug,
    ) -> Result<Option<ConversationSummary>, BackendError> {
        self.enter("conversation_summary", &slug.to_string()).await?;
        let overview = self.overview.lock().unwrap();
        Ok(overview
            .get(org_id)
            .and_then(|rows| rows.iter().find(|r| &r.slug() == slug).cloned()))
    }

    async fn group_ids(&self, org_id: &str, user_id: &str) -> Result<Vec<String>, BackendError> {
        self.enter("group_ids", org_id).await?;
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&(org_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn messages(&self, _org_id: &str, slug: &ChatSlug) -> Result<Vec<ChatMessage>, BackendError> {
        self.enter("messages", &slug.to_string()).await?;
        Ok(self.messages.lock().unwrap().get(slug).cloned().unwrap_or_default())
    }

    async fn insert_message(&self, kind: ConversationKind, message: &ChatMessage) -> Result<(), BackendError> {
        self.enter("insert_message", &message.id).await?;
        self.record(format!("insert_message:{kind:?}:{}", message.id));
        Ok(())
    }

    async fn delete_message(&self, _kind: ConversationKind, message_id: &str) -> Result<(), BackendError> {
        self.enter("delete_message", message_id).await?;
        self.record(format!("delete_message:{message_id}"));
        Ok(())
    }
}

#[async_trait]
impl KanbanBackend for MockBackend {
    async fn board(&self, board_id: &str) -> Result<Option<BoardRow>, BackendError> {
        self.enter("board", board_id).await?;
        Ok(self.boards.lock().unwrap().iter().find(|b| b.id == board_id).cloned())
    }

    async fn boards_for_org(&self, org_id: &str) -> Result<Vec<BoardRow>, BackendError> {
        self.enter("boards_for_org", org_id).await?;
        Ok(self.boards.lock().unwrap().iter().filter(|b| b.org_id == org_id).cloned().collect())
    }

    async fn categories(&self, board_ids: &[String]) -> Result<Vec<CategoryRow>, BackendError> {
        self.enter("categories", &board_ids.join(",")).await?;
        let mut rows: Vec<CategoryRow> = self
            .categories
            .lock()
            .unwrap()
            .iter()
            .filter(|c| board_ids.contains(&c.board_id))
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.position);
        Ok(rows)
    }

    async fn cards(&self, board_ids: &[String]) -> Result<Vec<Card>, BackendError> {
        self.enter("cards", &board_ids.join(",")).await?;
        let mut rows: Vec<Card> =
            self.cards.lock().unwrap().iter().filter(|c| board_ids.contains(&c.board_id)).cloned().collect();
        rows.sort_by_key(|c| c.position);
        Ok(rows)
    }

    async fn members(&self, board_ids: &[String]) -> Result<Vec<BoardMemberRow>, BackendError> {
        self.enter("members", &board_ids.join(",")).await?;
        Ok(self.members.lock().unwrap().iter().filter(|m| board_ids.contains(&m.board_id)).cloned().collect())
    }

    async fn create_board(&self, board: &NewBoard, from_template: bool) -> Result<(), BackendError> {
        self.enter("create_board", &board.id).await?;
        self.record(format!("create_board:{}:{from_template}", board.name));
        self.boards.lock().unwrap().push(BoardRow {
            id: board.id.clone(),
            name: board.name.clone(),
            org_id: board.org_id.clone(),
            owner_id: board.owner_id.clone(),
            created_at: ts(0),
        });
        Ok(())
    }

    async fn update_board(&self, board_id: &str, _patch: &BoardPatch) -> Result<(), BackendError> {
        self.enter("update_board", board_id).await?;
        self.record(format!("update_board:{board_id}"));
        Ok(())
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), BackendError> {
        self.enter("delete_board", board_id).await?;
        self.record(format!("delete_board:{board_id}"));
        self.boards.lock().unwrap().retain(|b| b.id != board_id);
        Ok(())
    }

    async fn insert_category(&self, category: &CategoryRow) -> Result<(), BackendError> {
        self.enter("insert_category", &category.id).await?;
        self.record(format!("insert_category:{}:{}", category.name, category.position));
        self.categories.lock().unwrap().push(category.clone());
        Ok(())
    }

    async fn update_category(&self, category_id: &str, patch: &CategoryPatch) -> Result<(), BackendError> {
        self.enter("update_category", category_id).await?;
        self.record(format!("update_category:{category_id}:{}", patch.board_id.as_deref().unwrap_or("-")));
        Ok(())
    }

    async fn move_category_cards(&self, category_id: &str, board_id: &str) -> Result<(), BackendError> {
        self.enter("move_category_cards", category_id).await?;
        self.record(format!("move_category_cards:{category_id}:{board_id}"));
        Ok(())
    }

    async fn delete_category(&self, category_id: &str) -> Result<(), BackendError> {
        self.enter("delete_category", category_id).await?;
        self.record(format!("delete_category:{category_id}"));
        Ok(())
    }

    async fn insert_card(&self, card: &Card) -> Result<(), BackendError> {
        self.enter("insert_card", &card.id).await?;
        self.record(format!("insert_card:{}:{}", card.title, card.position));
        self.cards.lock().unwrap().push(card.clone());
        Ok(())
    }

    async fn update_card(&self, card_id: &str, _patch: &CardPatch) -> Result<(), BackendError> {
        self.enter("update_card", card_id).await?;
        self.record(format!("update_card:{card_id}"));
        Ok(())
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), BackendError> {
        self.enter("delete_card", card_id).await?;
        self.record(format!("delete_card:{card_id}"));
        Ok(())
    }

    async fn add_member(&self, board_id: &str, user_id: &str) -> Result<Member, BackendError> {
        self.enter("add_member", user_id).await?;
        self.record(format!("add_member:{board_id}:{user_id}"));
        Ok(self.users.lock().unwrap().get(user_id).cloned().unwrap_or_else(|| Member {
            id: user_id.into(),
            name: format!("User {user_id}"),
            avatar_url: String::new(),
        }))
    }

    async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.enter("remove_member", user_id).await?;
        self.record(format!("remove_member:{board_id}:{user_id}"));
        Ok(())
    }
}

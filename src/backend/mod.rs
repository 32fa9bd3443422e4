//! Backend boundary: row queries and RPCs against the hosted database.
//!
//! DESIGN
//! ======
//! Stores talk to the backend only through [`ChatBackend`] and
//! [`KanbanBackend`]. Every call returns an explicit `Result`; nothing here
//! retries. [`rest::RestBackend`] is the HTTP implementation; tests inject
//! scripted doubles.

pub mod rest;

use async_trait::async_trait;

use crate::chat::types::{ChatMessage, ChatSlug, ConversationKind, ConversationSummary};
use crate::error::ErrorCode;
use crate::kanban::types::{BoardMemberRow, BoardPatch, BoardRow, Card, CardPatch, CategoryPatch, CategoryRow, Member, NewBoard};

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("backend request failed: {0}")]
    Request(String),
    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// The response body did not match the expected row shape.
    #[error("backend response decode failed: {0}")]
    Decode(String),
    /// A single-row query matched nothing.
    #[error("row not found: {0}")]
    NotFound(String),
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_BACKEND_REQUEST",
            Self::Status { .. } => "E_BACKEND_STATUS",
            Self::Decode(_) => "E_BACKEND_DECODE",
            Self::NotFound(_) => "E_BACKEND_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Conversation overview for the signed-in user within `org_id`.
    async fn chat_overview(&self, org_id: &str) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Single overview row, used when a conversation appears via realtime.
    async fn conversation_summary(&self, org_id: &str, slug: &ChatSlug)
    -> Result<Option<ConversationSummary>, BackendError>;

    /// Ids of the groups `user_id` belongs to within `org_id`.
    async fn group_ids(&self, org_id: &str, user_id: &str) -> Result<Vec<String>, BackendError>;

    /// Messages of one conversation, oldest first. Group rows carry sender metadata.
    async fn messages(&self, org_id: &str, slug: &ChatSlug) -> Result<Vec<ChatMessage>, BackendError>;

    /// Persist a message under its client-generated id.
    async fn insert_message(&self, kind: ConversationKind, message: &ChatMessage) -> Result<(), BackendError>;

    async fn delete_message(&self, kind: ConversationKind, message_id: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait KanbanBackend: Send + Sync {
    async fn board(&self, board_id: &str) -> Result<Option<BoardRow>, BackendError>;

    async fn boards_for_org(&self, org_id: &str) -> Result<Vec<BoardRow>, BackendError>;

    /// Categories of the given boards ordered by position.
    async fn categories(&self, board_ids: &[String]) -> Result<Vec<CategoryRow>, BackendError>;

    /// Cards of the given boards ordered by position.
    async fn cards(&self, board_ids: &[String]) -> Result<Vec<Card>, BackendError>;

    /// Member rows of the given boards with the joined user.
    async fn members(&self, board_ids: &[String]) -> Result<Vec<BoardMemberRow>, BackendError>;

    /// Create a board; `from_template` seeds the onboarding categories server-side.
    async fn create_board(&self, board: &NewBoard, from_template: bool) -> Result<(), BackendError>;

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<(), BackendError>;

    async fn delete_board(&self, board_id: &str) -> Result<(), BackendError>;

    async fn insert_category(&self, category: &CategoryRow) -> Result<(), BackendError>;

    async fn update_category(&self, category_id: &str, patch: &CategoryPatch) -> Result<(), BackendError>;

    /// Re-home every card of a category onto `board_id`.
    async fn move_category_cards(&self, category_id: &str, board_id: &str) -> Result<(), BackendError>;

    async fn delete_category(&self, category_id: &str) -> Result<(), BackendError>;

    async fn insert_card(&self, card: &Card) -> Result<(), BackendError>;

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<(), BackendError>;

    async fn delete_card(&self, card_id: &str) -> Result<(), BackendError>;

    async fn add_member(&self, board_id: &str, user_id: &str) -> Result<Member, BackendError>;

    async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), BackendError>;
}

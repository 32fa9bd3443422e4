//! REST backend: PostgREST-style HTTP adapter for the hosted database.
//!
//! Tables live under `/rest/v1/<table>` with `column=eq.value` filters and
//! RPCs under `/rest/v1/rpc/<function>`. Requests carry the public API key
//! plus the session's bearer token (falling back to the API key when signed
//! out, which row-level security then restricts). Pure helpers for filters
//! and status mapping are split out for testability.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{BackendError, ChatBackend, KanbanBackend};
use crate::chat::types::{ChatMessage, ChatSlug, ConversationKind, ConversationSummary};
use crate::config::SyncConfig;
use crate::kanban::types::{BoardMemberRow, BoardPatch, BoardRow, Card, CardPatch, CategoryPatch, CategoryRow, Member, NewBoard};
use crate::session::SessionHandle;

const REST_PATH: &str = "/rest/v1";
const MEMBER_SELECT: &str = "board_id,user_id,users(id,name,avatar_url)";

// =============================================================================
// CLIENT
// =============================================================================

pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: SessionHandle,
}

impl RestBackend {
    /// Build a client from typed config.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Request`] if the HTTP client fails to build.
    pub fn new(config: &SyncConfig, session: SessionHandle) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self { http, base_url: format!("{}{REST_PATH}", config.backend_url), anon_key: config.anon_key.clone(), session })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let token = self
            .session
            .current()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token);
        self.http
            .request(method, format!("{}/{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        check_status(status, body)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, BackendError> {
        let body = self
            .send(self.request(reqwest::Method::GET, table).query(query))
            .await?;
        parse_rows(&body)
    }

    async fn rpc<T: DeserializeOwned>(&self, function: &str, args: &Value) -> Result<T, BackendError> {
        let body = self
            .send(self.request(reqwest::Method::POST, &format!("rpc/{function}")).json(args))
            .await?;
        parse_body(&body)
    }

    async fn insert<B: Serialize + Sync + ?Sized>(&self, table: &str, row: &B) -> Result<(), BackendError> {
        self.send(
            self.request(reqwest::Method::POST, table)
                .header("Prefer", "return=minimal")
                .json(row),
        )
        .await
        .map(drop)
    }

    async fn update<B: Serialize + Sync + ?Sized>(&self, table: &str, filters: &[(&str, String)], patch: &B) -> Result<(), BackendError> {
        self.send(
            self.request(reqwest::Method::PATCH, table)
                .header("Prefer", "return=minimal")
                .query(filters)
                .json(patch),
        )
        .await
        .map(drop)
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), BackendError> {
        self.send(self.request(reqwest::Method::DELETE, table).query(filters))
            .await
            .map(drop)
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

pub(crate) fn eq(value: &str) -> String {
    format!("eq.{value}")
}

pub(crate) fn in_list(values: &[String]) -> String {
    format!("in.({})", values.join(","))
}

pub(crate) fn check_status(status: u16, body: String) -> Result<String, BackendError> {
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or(body);
    Err(BackendError::Status { status, message })
}

pub(crate) fn parse_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, BackendError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
}

/// Insert body for a message; group rows use the `by_id`/`group_id` columns.
pub(crate) fn message_row(kind: ConversationKind, message: &ChatMessage) -> Value {
    match kind {
        ConversationKind::Direct => json!({
            "id": message.id,
            "from_id": message.from_id,
            "to_id": message.to_id,
            "org_id": message.org_id,
            "typ": message.typ,
            "data": message.data,
        }),
        ConversationKind::Group => json!({
            "id": message.id,
            "by_id": message.from_id,
            "group_id": message.to_id,
            "org_id": message.org_id,
            "typ": message.typ,
            "data": message.data,
        }),
    }
}

fn message_table(kind: ConversationKind) -> &'static str {
    match kind {
        ConversationKind::Direct => "messages",
        ConversationKind::Group => "group_messages",
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[async_trait]
impl ChatBackend for RestBackend {
    async fn chat_overview(&self, org_id: &str) -> Result<Vec<ConversationSummary>, BackendError> {
        self.rpc("get_chat_overview", &json!({ "org_id": org_id })).await
    }

    async fn conversation_summary(
        &self,
        org_id: &str,
        slug: &ChatSlug,
    ) -> Result<Option<ConversationSummary>, BackendError> {
        let rows = self.chat_overview(org_id).await?;
        Ok(rows.into_iter().find(|row| &row.slug() == slug))
    }

    async fn group_ids(&self, org_id: &str, user_id: &str) -> Result<Vec<String>, BackendError> {
        #[derive(serde::Deserialize)]
        struct Row {
            group_id: String,
        }
        let rows: Vec<Row> = self
            .select(
                "chat_group_members",
                &[
                    ("select", "group_id,chat_groups!inner(org_id)".to_string()),
                    ("user_id", eq(user_id)),
                    ("chat_groups.org_id", eq(org_id)),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.group_id).collect())
    }

    async fn messages(&self, org_id: &str, slug: &ChatSlug) -> Result<Vec<ChatMessage>, BackendError> {
        match slug.kind() {
            ConversationKind::Direct => self.rpc("get_messages", &json!({ "slug": slug.to_string() })).await,
            ConversationKind::Group => {
                self.select(
                    "group_messages",
                    &[
                        ("select", "*,users(id,name,avatar_url)".to_string()),
                        ("group_id", eq(slug.id())),
                        ("org_id", eq(org_id)),
                        ("order", "created_at.asc".to_string()),
                    ],
                )
                .await
            }
        }
    }

    async fn insert_message(&self, kind: ConversationKind, message: &ChatMessage) -> Result<(), BackendError> {
        self.insert(message_table(kind), &message_row(kind, message)).await
    }

    async fn delete_message(&self, kind: ConversationKind, message_id: &str) -> Result<(), BackendError> {
        self.delete(message_table(kind), &[("id", eq(message_id))]).await
    }
}

// =============================================================================
// KANBAN
// =============================================================================

#[async_trait]
impl KanbanBackend for RestBackend {
    async fn board(&self, board_id: &str) -> Result<Option<BoardRow>, BackendError> {
        let rows: Vec<BoardRow> = self
            .select("kanban_boards", &[("select", "*".to_string()), ("id", eq(board_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn boards_for_org(&self, org_id: &str) -> Result<Vec<BoardRow>, BackendError> {
        self.select(
            "kanban_boards",
            &[("select", "*".to_string()), ("org_id", eq(org_id)), ("order", "created_at.asc".to_string())],
        )
        .await
    }

    async fn categories(&self, board_ids: &[String]) -> Result<Vec<CategoryRow>, BackendError> {
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "kanban_categories",
            &[("select", "*".to_string()), ("board_id", in_list(board_ids)), ("order", "position.asc".to_string())],
        )
        .await
    }

    async fn cards(&self, board_ids: &[String]) -> Result<Vec<Card>, BackendError> {
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "kanban_cards",
            &[("select", "*".to_string()), ("board_id", in_list(board_ids)), ("order", "position.asc".to_string())],
        )
        .await
    }

    async fn members(&self, board_ids: &[String]) -> Result<Vec<BoardMemberRow>, BackendError> {
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "kanban_board_members",
            &[("select", MEMBER_SELECT.to_string()), ("board_id", in_list(board_ids))],
        )
        .await
    }

    async fn create_board(&self, board: &NewBoard, from_template: bool) -> Result<(), BackendError> {
        if from_template {
            return self
                .rpc::<Value>(
                    "create_board",
                    &json!({ "id": board.id, "board_name": board.name, "org_id": board.org_id }),
                )
                .await
                .map(drop);
        }
        self.insert("kanban_boards", board).await
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<(), BackendError> {
        self.update("kanban_boards", &[("id", eq(board_id))], patch).await
    }

    async fn delete_board(&self, board_id: &str) -> Result<(), BackendError> {
        self.delete("kanban_boards", &[("id", eq(board_id))]).await
    }

    async fn insert_category(&self, category: &CategoryRow) -> Result<(), BackendError> {
        self.insert("kanban_categories", category).await
    }

    async fn update_category(&self, category_id: &str, patch: &CategoryPatch) -> Result<(), BackendError> {
        self.update("kanban_categories", &[("id", eq(category_id))], patch).await
    }

    async fn move_category_cards(&self, category_id: &str, board_id: &str) -> Result<(), BackendError> {
        self.update("kanban_cards", &[("category_id", eq(category_id))], &json!({ "board_id": board_id }))
            .await
    }

    async fn delete_category(&self, category_id: &str) -> Result<(), BackendError> {
        self.delete("kanban_categories", &[("id", eq(category_id))]).await
    }

    async fn insert_card(&self, card: &Card) -> Result<(), BackendError> {
        self.insert("kanban_cards", card).await
    }

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<(), BackendError> {
        self.update("kanban_cards", &[("id", eq(card_id))], patch).await
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), BackendError> {
        self.delete("kanban_cards", &[("id", eq(card_id))]).await
    }

    async fn add_member(&self, board_id: &str, user_id: &str) -> Result<Member, BackendError> {
        let body = self
            .send(
                self.request(reqwest::Method::POST, "kanban_board_members")
                    .header("Prefer", "return=representation")
                    .query(&[("select", MEMBER_SELECT)])
                    .json(&json!({ "board_id": board_id, "user_id": user_id })),
            )
            .await?;
        let rows: Vec<BoardMemberRow> = parse_rows(&body)?;
        rows.into_iter()
            .next()
            .map(|row| row.member())
            .ok_or_else(|| BackendError::NotFound(format!("member {user_id} of board {board_id}")))
    }

    async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.delete("kanban_board_members", &[("board_id", eq(board_id)), ("user_id", eq(user_id))])
            .await
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;

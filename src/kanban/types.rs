//! Kanban rows and the composed board view.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// `kanban_boards` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardRow {
    pub id: String,
    pub name: String,
    pub org_id: String,
    pub owner_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `kanban_categories` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub color: String,
    pub position: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `kanban_cards` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub board_id: String,
    pub category_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// `kanban_board_members` row, optionally with the joined user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMemberRow {
    pub board_id: String,
    pub user_id: String,
    #[serde(default, alias = "users")]
    pub user: Option<Member>,
}

impl BoardMemberRow {
    /// Joined user, or an id-only placeholder when the row came without one.
    #[must_use]
    pub fn member(&self) -> Member {
        self.user.clone().unwrap_or_else(|| Member {
            id: self.user_id.clone(),
            name: String::new(),
            avatar_url: String::new(),
        })
    }
}

/// A category with its cards in render order.
#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub color: String,
    pub position: i64,
    pub created_at: OffsetDateTime,
    pub cards: Vec<Card>,
}

impl Category {
    #[must_use]
    pub fn from_row(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            board_id: row.board_id,
            name: row.name,
            color: row.color,
            position: row.position,
            created_at: row.created_at,
            cards: Vec::new(),
        }
    }

    /// Overwrite row fields, keeping the card list.
    pub(crate) fn apply_row(&mut self, row: CategoryRow) {
        self.board_id = row.board_id;
        self.name = row.name;
        self.color = row.color;
        self.position = row.position;
        self.created_at = row.created_at;
    }

    /// Position for a card appended to this category.
    #[must_use]
    pub fn next_card_position(&self) -> i64 {
        self.cards.iter().map(|c| c.position).fold(0, i64::max) + 1
    }
}

/// Board composed client-side from its four source tables.
#[derive(Clone, Debug, PartialEq)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub org_id: String,
    pub owner_id: String,
    pub created_at: OffsetDateTime,
    /// UI-only description; not stored in the boards table.
    pub description: Option<String>,
    pub categories: Vec<Category>,
    pub members: Vec<Member>,
}

impl Board {
    #[must_use]
    pub fn from_row(row: BoardRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            org_id: row.org_id,
            owner_id: row.owner_id,
            created_at: row.created_at,
            description: None,
            categories: Vec::new(),
            members: Vec::new(),
        }
    }

    pub(crate) fn apply_row(&mut self, row: BoardRow) {
        self.name = row.name;
        self.org_id = row.org_id;
        self.owner_id = row.owner_id;
        self.created_at = row.created_at;
    }

    #[must_use]
    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub(crate) fn category_mut(&mut self, category_id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == category_id)
    }

    /// Locate a card: (category index, card index).
    #[must_use]
    pub fn find_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.categories.iter().enumerate().find_map(|(ci, cat)| {
            cat.cards
                .iter()
                .position(|c| c.id == card_id)
                .map(|ki| (ci, ki))
        })
    }

    #[must_use]
    pub fn card(&self, card_id: &str) -> Option<&Card> {
        let (ci, ki) = self.find_card(card_id)?;
        Some(&self.categories[ci].cards[ki])
    }

    /// Position for a category appended to this board.
    #[must_use]
    pub fn next_category_position(&self) -> i64 {
        self.categories.iter().map(|c| c.position).fold(-1, i64::max) + 1
    }
}

/// Partial board update.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BoardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// UI-only; never sent to the backend.
    #[serde(skip)]
    pub description: Option<String>,
}

impl BoardPatch {
    pub(crate) fn apply(&self, board: &mut Board) {
        if let Some(name) = &self.name {
            board.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            board.description = Some(description.clone());
        }
    }
}

/// Partial category update. Setting `board_id` moves the category (and its cards).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

impl CategoryPatch {
    pub(crate) fn apply(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name.clone_from(name);
        }
        if let Some(color) = &self.color {
            category.color.clone_from(color);
        }
        if let Some(position) = self.position {
            category.position = position;
        }
        if let Some(board_id) = &self.board_id {
            category.board_id.clone_from(board_id);
            for card in &mut category.cards {
                card.board_id.clone_from(board_id);
            }
        }
    }
}

/// Partial card update. `Some(None)` clears a nullable column.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

impl CardPatch {
    pub(crate) fn apply(&self, card: &mut Card) {
        if let Some(title) = &self.title {
            card.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            card.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(due_date) = &self.due_date {
            card.due_date.clone_from(due_date);
        }
        if let Some(tags) = &self.tags {
            card.tags.clone_from(tags);
        }
        if let Some(position) = self.position {
            card.position = position;
        }
        if let Some(category_id) = &self.category_id {
            card.category_id.clone_from(category_id);
        }
        if let Some(board_id) = &self.board_id {
            card.board_id.clone_from(board_id);
        }
    }

    /// True if applying this patch moves the card out of (`board_id`, `category_id`).
    #[must_use]
    pub fn moves_from(&self, board_id: &str, category_id: &str) -> bool {
        self.category_id.as_deref().is_some_and(|c| c != category_id)
            || self.board_id.as_deref().is_some_and(|b| b != board_id)
    }
}

/// Input for [`crate::kanban::KanbanStore::create_card`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewCard {
    pub board_id: String,
    pub category_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub created_by: String,
}

/// Insert payload for a new board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewBoard {
    pub id: String,
    pub name: String,
    pub org_id: String,
    pub owner_id: String,
}

/// Insert position rule shared by realtime card and category inserts:
/// a position inside the current list bounds is used as the index,
/// anything else appends.
pub(crate) fn insert_at_position<T>(list: &mut Vec<T>, position: i64, item: T) {
    match usize::try_from(position) {
        Ok(index) if index < list.len() => list.insert(index, item),
        _ => list.push(item),
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

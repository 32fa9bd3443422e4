//! Kanban store: board loading and user-initiated mutations.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::types::{
    Board, BoardMemberRow, BoardPatch, BoardRow, Card, CardPatch, Category, CategoryPatch, CategoryRow, Member,
    NewBoard, NewCard, Priority,
};
use crate::backend::KanbanBackend;
use crate::error::SyncError;
use crate::notify::{Notifier, report};
use crate::pending::PendingSet;
use crate::session::{Scope, ScopeController, ScopeEntry, SessionHandle};

/// Length of generated board ids.
const BOARD_ID_LEN: usize = 21;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KanbanState {
    pub boards: HashMap<String, Board>,
    /// Message of the last failed load, cleared by the next successful one.
    pub error: Option<String>,
    /// Card ids with a local update awaiting its echo, tagged with the board
    /// the card now lives on.
    pub(crate) pending: PendingSet<String>,
}

impl KanbanState {
    #[must_use]
    pub fn is_pending(&self, card_id: &str) -> bool {
        self.pending.contains(card_id)
    }
}

pub struct KanbanStore {
    backend: Arc<dyn KanbanBackend>,
    notifier: Arc<dyn Notifier>,
    session: SessionHandle,
    pub(crate) scope: ScopeController,
    pub(crate) state: watch::Sender<KanbanState>,
}

/// Where a card sat before an optimistic update.
struct CardSnapshot {
    card: Card,
    board_id: String,
    category_id: String,
    index: usize,
}

impl KanbanStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KanbanBackend>, notifier: Arc<dyn Notifier>, session: SessionHandle) -> Self {
        Self {
            backend,
            notifier,
            session,
            scope: ScopeController::new(),
            state: watch::Sender::new(KanbanState::default()),
        }
    }

    #[must_use]
    pub fn current(&self) -> KanbanState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<KanbanState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn board(&self, board_id: &str) -> Option<Board> {
        self.state.borrow().boards.get(board_id).cloned()
    }

    #[must_use]
    pub fn is_pending(&self, card_id: &str) -> bool {
        self.state.borrow().is_pending(card_id)
    }

    /// Report a failure and hand it back as `Err`.
    fn fail<T>(&self, err: impl Into<SyncError>, context: &'static str, title: &str) -> Result<T, SyncError> {
        let err = err.into();
        warn!(context, error = %err, "kanban operation failed");
        report(self.notifier.as_ref(), &err, context, title);
        Err(err)
    }

    /// Drop every board and forget the scope (sign-out).
    pub fn reset(&self) {
        self.scope.reset();
        self.state.send_modify(|s| *s = KanbanState::default());
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Cached board, or a fresh load when absent or `refetch` is set.
    ///
    /// # Errors
    ///
    /// Returns the backend failure after recording it in `error`.
    pub async fn fetch_board(&self, board_id: &str, refetch: bool) -> Result<Option<Board>, SyncError> {
        if !refetch {
            if let Some(board) = self.board(board_id) {
                return Ok(Some(board));
            }
        }
        let generation = self.scope.generation();
        let ids = [board_id.to_string()];

        let loaded = async {
            let Some(row) = self.backend.board(board_id).await? else {
                return Ok(None);
            };
            let (categories, cards, members) = futures::try_join!(
                self.backend.categories(&ids),
                self.backend.cards(&ids),
                self.backend.members(&ids),
            )?;
            Ok::<_, crate::backend::BackendError>(assemble(vec![row], categories, cards, members).into_values().next())
        }
        .await;

        if !self.scope.is_current(generation) {
            debug!(board_id, "discarding stale board");
            return Ok(None);
        }
        match loaded {
            Ok(Some(board)) => {
                debug!(board_id, categories = board.categories.len(), "board loaded");
                self.state.send_modify(|s| {
                    s.boards.insert(board.id.clone(), board.clone());
                    s.error = None;
                });
                Ok(Some(board))
            }
            Ok(None) => {
                self.state.send_if_modified(|s| s.boards.remove(board_id).is_some());
                Ok(None)
            }
            Err(e) => {
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                self.fail(e, "kanban_fetch_board", "Could not load kanban data")
            }
        }
    }

    /// One category of a board, loading the board if needed.
    ///
    /// # Errors
    ///
    /// Same as [`KanbanStore::fetch_board`].
    pub async fn fetch_category(&self, board_id: &str, category_id: &str) -> Result<Option<Category>, SyncError> {
        Ok(self
            .fetch_board(board_id, false)
            .await?
            .and_then(|board| board.categories.into_iter().find(|c| c.id == category_id)))
    }

    /// Load every board of an organisation. Replaces the whole cache.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the cache is left empty with `error` set.
    pub async fn fetch_all(&self, org_id: &str, user_id: &str) -> Result<(), SyncError> {
        let entry = self.scope.enter(&Scope::new(org_id, user_id));
        if let ScopeEntry::Changed(generation) = entry {
            info!(org_id, user_id, generation, "kanban scope changed; clearing boards");
            self.state.send_modify(|s| *s = KanbanState::default());
        }
        let generation = entry.generation();

        let loaded = async {
            let boards = self.backend.boards_for_org(org_id).await?;
            let ids: Vec<String> = boards.iter().map(|b| b.id.clone()).collect();
            let (categories, cards, members) = futures::try_join!(
                self.backend.categories(&ids),
                self.backend.cards(&ids),
                self.backend.members(&ids),
            )?;
            Ok::<_, crate::backend::BackendError>(assemble(boards, categories, cards, members))
        }
        .await;

        if !self.scope.is_current(generation) {
            debug!(org_id, "discarding stale kanban load");
            return Ok(());
        }
        match loaded {
            Ok(boards) => {
                info!(org_id, boards = boards.len(), "kanban loaded");
                self.state.send_modify(|s| {
                    *s = KanbanState { boards, ..KanbanState::default() };
                });
                Ok(())
            }
            Err(e) => {
                self.state.send_modify(|s| *s = KanbanState { error: Some(e.to_string()), ..KanbanState::default() });
                self.fail(e, "kanban_fetch_all", "Could not load kanban data")
            }
        }
    }

    // =========================================================================
    // BOARDS
    // =========================================================================

    /// Create a board in the current organisation and load it.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`], [`SyncError::NoScope`] before any
    /// organisation was loaded, or the backend failure.
    pub async fn create_board(&self, name: &str, owner_id: &str, from_template: bool) -> Result<String, SyncError> {
        self.session.require()?;
        let Some(scope) = self.scope.current() else {
            return Err(SyncError::NoScope);
        };
        let board = NewBoard {
            id: board_id(),
            name: name.to_string(),
            org_id: scope.org_id,
            owner_id: owner_id.to_string(),
        };
        let context = if from_template { "create_board" } else { "kanban_boards" };
        if let Err(e) = self.backend.create_board(&board, from_template).await {
            return self.fail(e, context, "Could not create board");
        }
        self.fetch_board(&board.id, true).await?;
        self.notifier.success(&format!("Created board \"{name}\""));
        Ok(board.id)
    }

    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn update_board(&self, board_id: &str, patch: BoardPatch) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.update_board(board_id, &patch).await {
            return self.fail(e, "kanban_boards", "Could not update board");
        }
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(board_id) else {
                return false;
            };
            patch.apply(board);
            true
        });
        self.notifier.success("Board updated");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn delete_board(&self, board_id: &str) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.delete_board(board_id).await {
            return self.fail(e, "kanban_boards", "Could not delete board");
        }
        self.state.send_modify(|s| remove_board(s, board_id));
        self.notifier.success("Board deleted");
        Ok(())
    }

    // =========================================================================
    // CATEGORIES
    // =========================================================================

    /// Append a category to a board.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] if the board cannot be loaded, otherwise the
    /// backend failure.
    pub async fn create_category(&self, board_id: &str, name: &str, color: &str) -> Result<String, SyncError> {
        self.session.require()?;
        let Some(board) = self.fetch_board(board_id, false).await? else {
            return self.fail(SyncError::not_found("board", board_id), "kanban_categories", "Could not create category");
        };
        let row = CategoryRow {
            id: uuid::Uuid::new_v4().to_string(),
            board_id: board_id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            position: board.next_category_position(),
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(e) = self.backend.insert_category(&row).await {
            return self.fail(e, "kanban_categories", "Could not create category");
        }
        let id = row.id.clone();
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(board_id) else {
                return false;
            };
            if board.category(&row.id).is_some() {
                return false;
            }
            board.categories.push(Category::from_row(row));
            true
        });
        self.notifier.success(&format!("Created category \"{name}\""));
        Ok(id)
    }

    /// Update a category. A new `board_id` moves the category and its cards;
    /// if moving the cards fails the category row is moved back.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn update_category(&self, category_id: &str, old_board_id: &str, patch: CategoryPatch) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.update_category(category_id, &patch).await {
            return self.fail(e, "kanban_categories", "Could not update category");
        }
        let moved_to = patch.board_id.as_deref().filter(|b| *b != old_board_id);
        if let Some(new_board_id) = moved_to {
            if let Err(e) = self.backend.move_category_cards(category_id, new_board_id).await {
                let revert = CategoryPatch { board_id: Some(old_board_id.to_string()), ..CategoryPatch::default() };
                if let Err(revert_err) = self.backend.update_category(category_id, &revert).await {
                    warn!(category_id, error = %revert_err, "category move revert failed");
                }
                return self.fail(e, "kanban_cards", "Could not move category");
            }
        }
        self.state.send_if_modified(|s| {
            let Some(old_board) = s.boards.get_mut(old_board_id) else {
                return false;
            };
            let Some(index) = old_board.categories.iter().position(|c| c.id == category_id) else {
                return false;
            };
            let Some(new_board_id) = moved_to else {
                patch.apply(&mut old_board.categories[index]);
                return true;
            };
            let mut category = old_board.categories.remove(index);
            patch.apply(&mut category);
            if let Some(new_board) = s.boards.get_mut(new_board_id) {
                new_board.categories.push(category);
            }
            true
        });
        self.notifier.success("Category updated");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn delete_category(&self, category_id: &str, board_id: &str) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.delete_category(category_id).await {
            return self.fail(e, "kanban_categories", "Could not delete category");
        }
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(board_id) else {
                return false;
            };
            let before = board.categories.len();
            board.categories.retain(|c| c.id != category_id);
            board.categories.len() != before
        });
        self.notifier.success("Category deleted");
        Ok(())
    }

    // =========================================================================
    // CARDS
    // =========================================================================

    /// Append a card to a category at position max+1.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] if the board cannot be loaded, otherwise the
    /// backend failure.
    pub async fn create_card(&self, input: NewCard) -> Result<String, SyncError> {
        self.session.require()?;
        let Some(board) = self.fetch_board(&input.board_id, false).await? else {
            return self.fail(SyncError::not_found("board", &input.board_id), "kanban_create_card", "Could not create card");
        };
        let position = board.category(&input.category_id).map_or(1, Category::next_card_position);
        let card = Card {
            id: uuid::Uuid::new_v4().to_string(),
            board_id: input.board_id,
            category_id: input.category_id,
            title: input.title,
            description: Some(input.description.unwrap_or_default()),
            priority: Some(input.priority.unwrap_or(Priority::Medium)),
            due_date: input.due_date,
            tags: input.tags,
            created_by: input.created_by,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            position,
        };
        if let Err(e) = self.backend.insert_card(&card).await {
            return self.fail(e, "kanban_create_card", "Could not create card");
        }
        let id = card.id.clone();
        let title = card.title.clone();
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(&card.board_id) else {
                return false;
            };
            if board.find_card(&card.id).is_some() {
                return false;
            }
            let Some(category) = board.category_mut(&card.category_id) else {
                return false;
            };
            category.cards.push(card);
            true
        });
        self.notifier.success(&format!("Created card \"{title}\""));
        Ok(id)
    }

    /// Update a card optimistically, including moves across categories and
    /// boards. A move without an explicit position lands at max+1 of the
    /// target category. On failure the card returns to its original slot.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn update_card(&self, card_id: &str, category_id: &str, board_id: &str, patch: CardPatch) -> Result<(), SyncError> {
        self.session.require()?;
        let mut patch = patch;
        let mut snapshot = None;
        self.state.send_if_modified(|s| {
            let Some(taken) = take_snapshot(&s.boards, card_id, category_id, board_id) else {
                return false;
            };
            let target_board = patch.board_id.clone().unwrap_or_else(|| board_id.to_string());
            if patch.moves_from(board_id, category_id) {
                let target_category = patch.category_id.clone().unwrap_or_else(|| category_id.to_string());
                if patch.position.is_none() {
                    patch.position = s
                        .boards
                        .get(&target_board)
                        .and_then(|b| b.category(&target_category))
                        .map(Category::next_card_position);
                }
                if let Some(category) = s.boards.get_mut(board_id).and_then(|b| b.category_mut(category_id)) {
                    category.cards.remove(taken.index);
                }
                let mut moved = taken.card.clone();
                patch.apply(&mut moved);
                if let Some(category) = s.boards.get_mut(&target_board).and_then(|b| b.category_mut(&target_category)) {
                    category.cards.push(moved);
                }
            } else if let Some(card) = s
                .boards
                .get_mut(board_id)
                .and_then(|b| b.category_mut(category_id))
                .and_then(|c| c.cards.get_mut(taken.index))
            {
                patch.apply(card);
            }
            s.pending.register(card_id, target_board);
            snapshot = Some(taken);
            true
        });

        match self.backend.update_card(card_id, &patch).await {
            Ok(()) => {
                self.notifier.success("Card updated");
                Ok(())
            }
            Err(e) => {
                if let Some(snapshot) = snapshot {
                    self.state.send_modify(|s| restore_card(s, snapshot));
                }
                self.fail(e, "kanban_update_card", "Could not update card")
            }
        }
    }

    /// Delete a card; the local copy is removed once the backend accepted it.
    ///
    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn delete_card(&self, card_id: &str, category_id: &str, board_id: &str) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.delete_card(card_id).await {
            return self.fail(e, "kanban_delete_card", "Could not delete card");
        }
        self.state.send_modify(|s| {
            s.pending.forget(card_id);
            if let Some(category) = s.boards.get_mut(board_id).and_then(|b| b.category_mut(category_id)) {
                category.cards.retain(|c| c.id != card_id);
            }
        });
        self.notifier.success("Card deleted");
        Ok(())
    }

    // =========================================================================
    // MEMBERS
    // =========================================================================

    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn add_member(&self, board_id: &str, user_id: &str) -> Result<Member, SyncError> {
        self.session.require()?;
        let member = match self.backend.add_member(board_id, user_id).await {
            Ok(member) => member,
            Err(e) => return self.fail(e, "kanban_add_member", "Could not add member"),
        };
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(board_id) else {
                return false;
            };
            if board.members.iter().any(|m| m.id == member.id) {
                return false;
            }
            board.members.push(member.clone());
            true
        });
        self.notifier.success("Member added");
        Ok(member)
    }

    /// # Errors
    ///
    /// [`SyncError::Unauthenticated`] or the backend failure.
    pub async fn remove_member(&self, board_id: &str, user_id: &str) -> Result<(), SyncError> {
        self.session.require()?;
        if let Err(e) = self.backend.remove_member(board_id, user_id).await {
            return self.fail(e, "kanban_remove_member", "Could not remove member");
        }
        self.state.send_if_modified(|s| {
            let Some(board) = s.boards.get_mut(board_id) else {
                return false;
            };
            let before = board.members.len();
            board.members.retain(|m| m.id != user_id);
            board.members.len() != before
        });
        self.notifier.success("Member removed");
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn board_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOARD_ID_LEN)
        .map(char::from)
        .collect()
}

/// Compose boards from their source rows. Rows are placed in position order
/// (ties keep query order); cards whose category is unknown are dropped.
pub(crate) fn assemble(
    boards: Vec<BoardRow>,
    mut categories: Vec<CategoryRow>,
    mut cards: Vec<Card>,
    members: Vec<BoardMemberRow>,
) -> HashMap<String, Board> {
    let mut map: HashMap<String, Board> = boards.into_iter().map(|row| (row.id.clone(), Board::from_row(row))).collect();

    categories.sort_by_key(|c| c.position);
    for row in categories {
        if let Some(board) = map.get_mut(&row.board_id) {
            board.categories.push(Category::from_row(row));
        }
    }

    cards.sort_by_key(|c| c.position);
    for card in cards {
        match map.get_mut(&card.board_id).and_then(|b| b.category_mut(&card.category_id)) {
            Some(category) => category.cards.push(card),
            None => debug!(card_id = %card.id, "dropping card with unknown category"),
        }
    }

    for row in members {
        if let Some(board) = map.get_mut(&row.board_id) {
            board.members.push(row.member());
        }
    }
    map
}

fn take_snapshot(boards: &HashMap<String, Board>, card_id: &str, category_id: &str, board_id: &str) -> Option<CardSnapshot> {
    let category = boards.get(board_id)?.category(category_id)?;
    let index = category.cards.iter().position(|c| c.id == card_id)?;
    Some(CardSnapshot {
        card: category.cards[index].clone(),
        board_id: board_id.to_string(),
        category_id: category_id.to_string(),
        index,
    })
}

/// Put a card back exactly where the snapshot found it.
fn restore_card(state: &mut KanbanState, snapshot: CardSnapshot) {
    state.pending.forget(&snapshot.card.id);
    for board in state.boards.values_mut() {
        for category in &mut board.categories {
            category.cards.retain(|c| c.id != snapshot.card.id);
        }
    }
    if let Some(category) = state
        .boards
        .get_mut(&snapshot.board_id)
        .and_then(|b| b.category_mut(&snapshot.category_id))
    {
        let index = snapshot.index.min(category.cards.len());
        category.cards.insert(index, snapshot.card);
    }
}

pub(crate) fn remove_board(state: &mut KanbanState, board_id: &str) {
    state.boards.remove(board_id);
    state.pending.retain(|_, at| at != board_id);
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

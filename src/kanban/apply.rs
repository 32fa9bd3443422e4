//! Realtime change handlers for the kanban cache.
//!
//! Events for boards that are not cached are ignored; the next fetch picks
//! them up. Inserts and moves go through [`insert_at_position`].

use tracing::{debug, trace};

use super::store::{KanbanState, KanbanStore, remove_board};
use super::types::{Board, BoardMemberRow, BoardRow, Card, Category, CategoryRow, insert_at_position};
use crate::realtime::event::{RecordId, RowChange};

impl KanbanStore {
    pub fn apply_card_change(&self, change: RowChange<Card>) {
        self.state.send_if_modified(|s| match change {
            RowChange::Insert(card) => place_card(s, card),
            RowChange::Update(card) => {
                if s.pending.reconcile(&card.id).is_some() {
                    trace!(card_id = %card.id, "own card update echoed");
                    return false;
                }
                place_card(s, card)
            }
            RowChange::Delete(RecordId { id }) => {
                s.pending.forget(&id);
                remove_card(s, &id).is_some()
            }
        });
    }

    pub fn apply_category_change(&self, change: RowChange<CategoryRow>) {
        self.state.send_if_modified(|s| match change {
            RowChange::Insert(row) | RowChange::Update(row) => place_category(s, row),
            RowChange::Delete(RecordId { id }) => {
                let mut removed = false;
                for board in s.boards.values_mut() {
                    let before = board.categories.len();
                    board.categories.retain(|c| c.id != id);
                    removed |= board.categories.len() != before;
                }
                removed
            }
        });
    }

    pub fn apply_board_change(&self, change: RowChange<BoardRow>) {
        let org_id = self.scope.current().map(|scope| scope.org_id);
        self.state.send_if_modified(|s| match change {
            RowChange::Insert(row) => {
                if org_id.as_deref() != Some(row.org_id.as_str()) || s.boards.contains_key(&row.id) {
                    return false;
                }
                s.boards.insert(row.id.clone(), Board::from_row(row));
                true
            }
            RowChange::Update(row) => {
                let Some(board) = s.boards.get_mut(&row.id) else {
                    return false;
                };
                board.apply_row(row);
                true
            }
            RowChange::Delete(RecordId { id }) => {
                if !s.boards.contains_key(&id) {
                    return false;
                }
                debug!(board_id = %id, "board deleted remotely");
                remove_board(s, &id);
                true
            }
        });
    }

    pub fn apply_member_change(&self, change: RowChange<BoardMemberRow, BoardMemberRow>) {
        self.state.send_if_modified(|s| match change {
            RowChange::Insert(row) | RowChange::Update(row) => {
                let Some(board) = s.boards.get_mut(&row.board_id) else {
                    return false;
                };
                let member = row.member();
                match board.members.iter_mut().find(|m| m.id == member.id) {
                    Some(existing) if *existing == member => false,
                    Some(existing) => {
                        *existing = member;
                        true
                    }
                    None => {
                        board.members.push(member);
                        true
                    }
                }
            }
            RowChange::Delete(row) => {
                let Some(board) = s.boards.get_mut(&row.board_id) else {
                    return false;
                };
                let before = board.members.len();
                board.members.retain(|m| m.id != row.user_id);
                board.members.len() != before
            }
        });
    }
}

fn remove_card(state: &mut KanbanState, card_id: &str) -> Option<Card> {
    state.boards.values_mut().find_map(|board| {
        board.categories.iter_mut().find_map(|category| {
            let index = category.cards.iter().position(|c| c.id == card_id)?;
            Some(category.cards.remove(index))
        })
    })
}

/// Insert or move a confirmed card row. A card that stays in its category
/// is updated in place; otherwise it is placed by `position` in the target.
fn place_card(state: &mut KanbanState, card: Card) -> bool {
    let in_place = state
        .boards
        .get_mut(&card.board_id)
        .and_then(|b| b.category_mut(&card.category_id))
        .and_then(|c| c.cards.iter_mut().find(|existing| existing.id == card.id));
    if let Some(existing) = in_place {
        if *existing == card {
            return false;
        }
        *existing = card;
        return true;
    }

    let removed = remove_card(state, &card.id).is_some();
    let Some(category) = state
        .boards
        .get_mut(&card.board_id)
        .and_then(|b| b.category_mut(&card.category_id))
    else {
        return removed;
    };
    let position = card.position;
    insert_at_position(&mut category.cards, position, card);
    true
}

/// Insert, update or move a category row between cached boards.
fn place_category(state: &mut KanbanState, row: CategoryRow) -> bool {
    let in_place = state
        .boards
        .get_mut(&row.board_id)
        .and_then(|b| b.category_mut(&row.id));
    if let Some(existing) = in_place {
        existing.apply_row(row);
        return true;
    }

    let mut category = None;
    for board in state.boards.values_mut() {
        if let Some(index) = board.categories.iter().position(|c| c.id == row.id) {
            category = Some(board.categories.remove(index));
            break;
        }
    }
    let Some(board) = state.boards.get_mut(&row.board_id) else {
        return category.is_some();
    };
    let mut category = category.unwrap_or_else(|| Category::from_row(row.clone()));
    for card in &mut category.cards {
        card.board_id.clone_from(&row.board_id);
    }
    let position = row.position;
    category.apply_row(row);
    insert_at_position(&mut board.categories, position, category);
    true
}

#[cfg(test)]
#[path = "apply_test.rs"]
mod tests;

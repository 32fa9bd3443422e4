//! Kanban caches: boards composed from boards, categories, cards and members.
//!
//! DESIGN
//! ======
//! [`KanbanStore`] holds every loaded board in one `watch` cell together
//! with the pending-card registry, so an optimistic card move and its
//! registration happen in a single closure. Boards are assembled client-side
//! from four queries (see [`store::assemble`]).
//!
//! Card updates are optimistic: the local move or edit lands first, the id
//! is registered, and the realtime echo of that update consumes the
//! registration without touching the cache. A failed write puts the card
//! back at its original category and index. Every other mutation applies
//! locally only after the backend accepted it.
//!
//! Realtime handlers live in [`apply`] and reuse the same placement rule:
//! a row whose `position` falls inside the current list is inserted at that
//! index, anything else is appended.

pub mod apply;
pub mod store;
pub mod types;

pub use store::{KanbanState, KanbanStore};

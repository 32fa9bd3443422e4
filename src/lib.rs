//! Client-side realtime cache synchronization for organisation-scoped chat
//! and kanban data.
//!
//! [`client::SyncClient`] is the entry point: it owns the chat and kanban
//! stores and the realtime manager that keeps them current.

pub mod backend;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod kanban;
pub mod notify;
pub mod pending;
pub mod realtime;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use client::SyncClient;
pub use error::{ErrorCode, SyncError};

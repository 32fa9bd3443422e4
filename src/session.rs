//! Session identity and organisation scope tracking.
//!
//! DESIGN
//! ======
//! The surrounding application re-derives the session on every page load and
//! pushes it in through [`SessionHandle`]. Stores only ask two questions of
//! it: "is anyone signed in" (mutations are refused otherwise) and "which
//! bearer token do backend calls carry".
//!
//! [`ScopeController`] tracks the (organisation, user) pair that bounds which
//! cached data is valid. Every scope change bumps a generation counter;
//! async work captures the generation before suspending and drops its result
//! if the counter moved in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::error::SyncError;

/// Authenticated user session supplied by the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

/// Shared, swappable view of the current session.
#[derive(Clone, Debug, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session: Option<Session>) -> Self {
        Self { inner: Arc::new(RwLock::new(session)) }
    }

    pub fn set(&self, session: Option<Session>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Return the session or refuse with [`SyncError::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// Fails when no session is present.
    pub fn require(&self) -> Result<Session, SyncError> {
        self.current().ok_or(SyncError::Unauthenticated)
    }
}

/// The (organisation, user) pair that bounds cache validity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    pub org_id: String,
    pub user_id: String,
}

impl Scope {
    #[must_use]
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { org_id: org_id.into(), user_id: user_id.into() }
    }
}

/// Result of [`ScopeController::enter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeEntry {
    /// Scope was already current; caches stay valid.
    Unchanged(u64),
    /// Scope switched; caller must drop everything cached for the old scope.
    Changed(u64),
}

impl ScopeEntry {
    #[must_use]
    pub fn generation(self) -> u64 {
        match self {
            Self::Unchanged(g) | Self::Changed(g) => g,
        }
    }
}

#[derive(Debug, Default)]
struct ScopeSlot {
    current: Option<Scope>,
    generation: u64,
}

/// Tracks the current scope and a generation counter for stale-result checks.
#[derive(Debug, Default)]
pub struct ScopeController {
    slot: Mutex<ScopeSlot>,
}

impl ScopeController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `scope` current, bumping the generation if it differs.
    pub fn enter(&self, scope: &Scope) -> ScopeEntry {
        let mut slot = self.lock();
        if slot.current.as_ref() == Some(scope) {
            return ScopeEntry::Unchanged(slot.generation);
        }
        slot.current = Some(scope.clone());
        slot.generation += 1;
        ScopeEntry::Changed(slot.generation)
    }

    /// Forget the current scope (sign-out / full reset).
    pub fn reset(&self) -> u64 {
        let mut slot = self.lock();
        slot.current = None;
        slot.generation += 1;
        slot.generation
    }

    #[must_use]
    pub fn current(&self) -> Option<Scope> {
        self.lock().current.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// True if no scope change happened since `generation` was captured.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

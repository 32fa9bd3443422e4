//! Optimistic mutation tracker.
//!
//! A registry of entity ids whose local write has not yet been echoed back by
//! the realtime channel. Each registration is consumed exactly once, by the
//! first matching echo ([`PendingSet::reconcile`]) or by a rollback
//! ([`PendingSet::forget`]). Registering the same id twice (two quick local
//! updates to one card) requires two echoes to clear it.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry<L> {
    location: L,
    outstanding: usize,
}

/// Pending ids, each tagged with where the optimistic copy lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSet<L = ()> {
    entries: HashMap<String, Entry<L>>,
}

impl<L> Default for PendingSet<L> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<L: Clone> PendingSet<L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an optimistic write for `id`. A newer location replaces the old one.
    pub fn register(&mut self, id: impl Into<String>, location: L) {
        let entry = self
            .entries
            .entry(id.into())
            .or_insert_with(|| Entry { location: location.clone(), outstanding: 0 });
        entry.location = location;
        entry.outstanding += 1;
    }

    /// Consume one registration for `id`; returns its location if one existed.
    pub fn reconcile(&mut self, id: &str) -> Option<L> {
        let entry = self.entries.get_mut(id)?;
        entry.outstanding -= 1;
        if entry.outstanding == 0 {
            return self.entries.remove(id).map(|e| e.location);
        }
        Some(entry.location.clone())
    }

    /// Drop every registration for `id` (rollback or deletion).
    pub fn forget(&mut self, id: &str) -> Option<L> {
        self.entries.remove(id).map(|e| e.location)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn location(&self, id: &str) -> Option<&L> {
        self.entries.get(id).map(|e| &e.location)
    }

    /// Keep only the ids whose location satisfies `keep`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &L) -> bool,
    {
        self.entries.retain(|id, e| keep(id, &e.location));
    }

    /// Ids currently registered at `location`.
    pub fn ids_at<'a>(&'a self, location: &'a L) -> impl Iterator<Item = &'a str> + 'a
    where
        L: PartialEq,
    {
        self.entries
            .iter()
            .filter(move |(_, e)| &e.location == location)
            .map(|(id, _)| id.as_str())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;

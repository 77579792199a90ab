//! Connection registry
//!
//! Owns every admitted session and partitions them into viewers (everyone who
//! receives broadcasts) and messengers (the named subset allowed to send).
//! The name table maps each messenger to its unique display name.

use std::collections::{HashMap, HashSet};

use crate::error::AppError;
use crate::session::{Role, Session};
use crate::types::SessionId;

/// Session registry
///
/// Invariants, checked by [`Registry::check_invariants`]:
/// every messenger is a viewer, every named session is a messenger, and
/// names are non-empty and pairwise distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    /// Session metadata: SessionId -> Session
    sessions: HashMap<SessionId, Session>,
    /// Broadcast recipients, in admission order
    viewers: Vec<SessionId>,
    /// Named senders, in admission order
    messengers: Vec<SessionId>,
    /// Name table: SessionId -> name
    names: HashMap<SessionId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a passive viewer
    pub fn admit_viewer(&mut self, mut session: Session) {
        session.identify(Role::Viewer);
        if !self.viewers.contains(&session.id) {
            self.viewers.push(session.id);
        }
        self.sessions.insert(session.id, session);
    }

    /// Admit a named messenger
    ///
    /// Returns false and leaves the registry untouched if the name is empty
    /// or already taken, or the session is already admitted.
    pub fn admit_messenger(&mut self, mut session: Session, name: &str) -> bool {
        if name.is_empty() || self.is_taken(name) || self.sessions.contains_key(&session.id) {
            return false;
        }

        session.identify(Role::Messenger);
        self.names.insert(session.id, name.to_string());
        self.messengers.push(session.id);
        self.viewers.push(session.id);
        self.sessions.insert(session.id, session);
        true
    }

    /// Remove a session from every container
    ///
    /// Returns the removed session, or None if it wasn't registered.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.names.remove(&id);
        self.messengers.retain(|m| *m != id);
        self.viewers.retain(|v| *v != id);
        self.sessions.remove(&id)
    }

    pub fn name_of(&self, id: SessionId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.names.values().any(|n| n == name)
    }

    /// Names of all messengers, in admission order
    pub fn all_names(&self) -> Vec<String> {
        self.messengers
            .iter()
            .filter_map(|id| self.names.get(id).cloned())
            .collect()
    }

    /// Every session registered under `name`
    ///
    /// At most one entry while the invariants hold.
    pub fn sessions_named(&self, name: &str) -> Vec<SessionId> {
        self.messengers
            .iter()
            .filter(|id| self.names.get(*id).is_some_and(|n| n == name))
            .copied()
            .collect()
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn viewers(&self) -> &[SessionId] {
        &self.viewers
    }

    pub fn messengers(&self) -> &[SessionId] {
        &self.messengers
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Verify the structural invariants
    pub fn check_invariants(&self) -> Result<(), AppError> {
        if let Some(id) = self.messengers.iter().find(|m| !self.viewers.contains(m)) {
            return Err(AppError::InvariantViolation(format!(
                "messenger {} is not a viewer",
                id
            )));
        }
        if let Some(id) = self.names.keys().find(|id| !self.messengers.contains(id)) {
            return Err(AppError::InvariantViolation(format!(
                "named session {} is not a messenger",
                id
            )));
        }
        if let Some(id) = self.viewers.iter().find(|v| !self.sessions.contains_key(*v)) {
            return Err(AppError::InvariantViolation(format!(
                "viewer {} has no session",
                id
            )));
        }

        let mut seen = HashSet::new();
        for name in self.names.values() {
            if name.is_empty() {
                return Err(AppError::InvariantViolation("empty name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(AppError::InvariantViolation(format!(
                    "name '{}' registered twice",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionId::new(), "127.0.0.1:6000".parse().unwrap())
    }

    #[test]
    fn test_admit_viewer() {
        let mut registry = Registry::new();
        let viewer = session();
        let id = viewer.id;
        registry.admit_viewer(viewer);

        assert_eq!(registry.viewers(), &[id]);
        assert!(registry.messengers().is_empty());
        assert_eq!(registry.name_of(id), None);
        assert_eq!(registry.session(id).unwrap().role, Role::Viewer);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_admit_messenger_is_also_viewer() {
        let mut registry = Registry::new();
        let bob = session();
        let id = bob.id;

        assert!(registry.admit_messenger(bob, "bob"));
        assert_eq!(registry.viewers(), &[id]);
        assert_eq!(registry.messengers(), &[id]);
        assert_eq!(registry.name_of(id), Some("bob"));
        assert!(registry.is_taken("bob"));
        assert_eq!(registry.session(id).unwrap().role, Role::Messenger);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_name_rejected_unchanged() {
        let mut registry = Registry::new();
        registry.admit_viewer(session());
        assert!(registry.admit_messenger(session(), "bob"));

        let before = registry.clone();
        let second = session();
        let second_id = second.id;
        assert!(!registry.admit_messenger(second, "bob"));

        assert_eq!(registry, before);
        assert!(!registry.contains(second_id));
        assert_eq!(registry.all_names(), vec!["bob"]);
        assert_eq!(registry.sessions_named("bob").len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = Registry::new();
        assert!(!registry.admit_messenger(session(), ""));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_viewer_round_trip() {
        let mut registry = Registry::new();
        assert!(registry.admit_messenger(session(), "alice"));
        registry.admit_viewer(session());

        let before = registry.clone();
        let viewer = session();
        let id = viewer.id;
        registry.admit_viewer(viewer);
        assert!(registry.remove(id).is_some());

        assert_eq!(registry, before);
    }

    #[test]
    fn test_remove_releases_name() {
        let mut registry = Registry::new();
        let alice = session();
        let id = alice.id;
        registry.admit_messenger(alice, "alice");

        assert!(registry.remove(id).is_some());
        assert!(!registry.is_taken("alice"));
        assert!(registry.viewers().is_empty());
        assert!(registry.messengers().is_empty());

        // Idempotent
        assert!(registry.remove(id).is_none());

        // Name can be reused
        assert!(registry.admit_messenger(session(), "alice"));
    }

    #[test]
    fn test_all_names_in_admission_order() {
        let mut registry = Registry::new();
        registry.admit_messenger(session(), "carol");
        registry.admit_viewer(session());
        registry.admit_messenger(session(), "alice");
        registry.admit_messenger(session(), "bob");

        assert_eq!(registry.all_names(), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_invariants_hold_across_operations() {
        let mut registry = Registry::new();
        let mut ids = Vec::new();
        for name in ["a", "b", "a", "", "c", "b"] {
            let s = session();
            ids.push(s.id);
            registry.admit_messenger(s, name);
            registry.check_invariants().unwrap();
            registry.admit_viewer(session());
            registry.check_invariants().unwrap();
        }
        assert_eq!(registry.all_names(), vec!["a", "b", "c"]);

        for id in ids {
            registry.remove(id);
            registry.check_invariants().unwrap();
        }
        assert!(registry.messengers().is_empty());
    }
}

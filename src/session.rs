//! Session objects and the registry that owns them.
//!
//! A session is one independent consumer of the ring log: it has its own
//! cursor and its own filter set. The registry is a plain map; the manager
//! wraps it in a mutex for structural changes. Concurrent operations against
//! the same session id are last-writer-wins on the cursor, which callers are
//! documented not to do.

use crate::filter::FilterSet;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Length of generated session ids, in hex characters.
const SESSION_ID_LEN: usize = 8;

pub struct Session {
    pub id: String,
    pub name: String,
    /// Replaced wholesale by `set_filters`; shared so readers can snapshot
    /// it without holding the registry lock.
    pub filters: Arc<FilterSet>,
    /// Sequence number of the last event position already delivered
    /// (inclusive). Only moves forward.
    pub cursor: u64,
    pub created_at: SystemTime,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    /// Counter feeding default `session-<n>` names.
    next_name: u64,
}

fn generate_id<R: Rng>(rng: &mut R) -> String {
    format!("{:08x}", rng.random::<u32>())
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session whose cursor starts at `cursor` (the manager passes
    /// the current sequence counter, so new sessions never see backlog).
    pub fn create(&mut self, name: Option<String>, cursor: u64) -> String {
        let mut rng = rand::rng();
        let mut id = generate_id(&mut rng);
        while self.sessions.contains_key(&id) {
            id = generate_id(&mut rng);
        }
        debug_assert_eq!(id.len(), SESSION_ID_LEN);

        self.next_name += 1;
        let name = name.unwrap_or_else(|| format!("session-{}", self.next_name));
        self.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                name,
                filters: Arc::new(FilterSet::default()),
                cursor,
                created_at: SystemTime::now(),
            },
        );
        id
    }

    pub fn destroy(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Replace a session's filter set. The caller compiles the set first so
    /// an invalid pattern never disturbs the existing filters.
    pub fn set_filters(&mut self, id: &str, filters: FilterSet) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.filters = Arc::new(filters);
                true
            }
            None => false,
        }
    }

    /// Jump a session's cursor forward to `cursor`, discarding visibility
    /// into everything buffered before it.
    pub fn clear(&mut self, id: &str, cursor: u64) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.cursor = cursor;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterSpec, FilterSet};

    #[test]
    fn test_create_generates_fixed_width_id() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(Some("test".into()), 0);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        let session = reg.get(&id).unwrap();
        assert_eq!(session.name, "test");
        assert_eq!(session.cursor, 0);
    }

    #[test]
    fn test_default_names_are_sequential() {
        let mut reg = SessionRegistry::new();
        let a = reg.create(None, 0);
        let b = reg.create(None, 0);
        assert_eq!(reg.get(&a).unwrap().name, "session-1");
        assert_eq!(reg.get(&b).unwrap().name, "session-2");
    }

    #[test]
    fn test_cursor_starts_at_creation_watermark() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(None, 42);
        assert_eq!(reg.get(&id).unwrap().cursor, 42);
    }

    #[test]
    fn test_destroy() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(None, 0);
        assert!(reg.destroy(&id));
        assert!(reg.get(&id).is_none());
        assert!(!reg.destroy(&id));
        assert!(!reg.destroy("nonexistent"));
    }

    #[test]
    fn test_set_filters_replaces_wholesale() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(None, 0);
        let fs = FilterSet::compile(FilterSpec {
            include: vec!["ERROR".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(reg.set_filters(&id, fs));
        assert_eq!(reg.get(&id).unwrap().filters.spec().include, vec!["ERROR"]);
        assert!(!reg.set_filters("nonexistent", FilterSet::default()));
    }

    #[test]
    fn test_clear_moves_cursor_forward() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(None, 0);
        assert!(reg.clear(&id, 17));
        assert_eq!(reg.get(&id).unwrap().cursor, 17);
        assert!(!reg.clear("nonexistent", 17));
    }
}

use std::collections::HashSet;

/// A subscription target. The three upstream collections get one listener
/// each; every known section additionally gets a roster listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerKey {
    Sections,
    Subjects,
    Curriculums,
    Roster(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Changed,
    Removed,
    /// Whole-path snapshot semantics; used for roster paths, where the
    /// mirror diffs against current state rather than tracking child deltas.
    Value,
}

/// One change-feed delivery. `id` is the record id within the collection;
/// for roster events it is the owning section id.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub listener: ListenerKey,
    pub kind: EventKind,
    pub id: String,
}

impl ChangeEvent {
    pub fn section(kind: EventKind, id: &str) -> Self {
        Self {
            listener: ListenerKey::Sections,
            kind,
            id: id.to_string(),
        }
    }

    pub fn subject(kind: EventKind, code: &str) -> Self {
        Self {
            listener: ListenerKey::Subjects,
            kind,
            id: code.to_string(),
        }
    }

    pub fn curriculum(kind: EventKind, id: &str) -> Self {
        Self {
            listener: ListenerKey::Curriculums,
            kind,
            id: id.to_string(),
        }
    }

    pub fn roster(section_id: &str) -> Self {
        Self {
            listener: ListenerKey::Roster(section_id.to_string()),
            kind: EventKind::Value,
            id: section_id.to_string(),
        }
    }
}

/// Explicit listener lifecycle: unregistered -> register() -> active ->
/// deregister() -> unregistered. No other states. An event delivered for a
/// key that is not active is dropped, which is the only cancellation
/// primitive the feed offers — in-flight events queued before a
/// deregistration must not write.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    active: HashSet<ListenerKey>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the listener was already active (no-op).
    pub fn register(&mut self, key: ListenerKey) -> bool {
        self.active.insert(key)
    }

    /// Returns false if the listener was not active.
    pub fn deregister(&mut self, key: &ListenerKey) -> bool {
        self.active.remove(key)
    }

    pub fn is_active(&self, key: &ListenerKey) -> bool {
        self.active.contains(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn roster_count(&self) -> usize {
        self.roster_ids().len()
    }

    pub fn roster_ids(&self) -> Vec<String> {
        self.active
            .iter()
            .filter_map(|k| match k {
                ListenerKey::Roster(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn collection_count(&self) -> usize {
        self.len() - self.roster_count()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut reg = ListenerRegistry::new();
        assert!(reg.register(ListenerKey::Sections));
        assert!(!reg.register(ListenerKey::Sections));
        assert_eq!(reg.len(), 1);
        assert!(reg.deregister(&ListenerKey::Sections));
        assert!(!reg.deregister(&ListenerKey::Sections));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn roster_listeners_counted_separately() {
        let mut reg = ListenerRegistry::new();
        reg.register(ListenerKey::Sections);
        reg.register(ListenerKey::Subjects);
        reg.register(ListenerKey::Roster("sec-1".into()));
        reg.register(ListenerKey::Roster("sec-2".into()));
        assert_eq!(reg.collection_count(), 2);
        assert_eq!(reg.roster_count(), 2);
        assert!(reg.is_active(&ListenerKey::Roster("sec-1".into())));
        assert!(!reg.is_active(&ListenerKey::Roster("sec-3".into())));
    }
}

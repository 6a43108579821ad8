//! Thread-safe in-memory storage for the currently active flag definitions.
use std::sync::{Arc, RwLock};

use crate::definitions::Definitions;

/// `DefinitionStore` holds the current [`Definitions`] snapshot and allows concurrent access for
/// readers (flag evaluation) and the single writer (the poller).
///
/// Snapshots are immutable and only ever replaced whole, so a reader holding an older `Arc` keeps
/// seeing a consistent set of flags.
#[derive(Default)]
pub struct DefinitionStore {
    definitions: RwLock<Option<Arc<Definitions>>>,
}

impl DefinitionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        DefinitionStore::default()
    }

    /// Get the current snapshot. Returns `None` if definitions haven't been fetched yet.
    pub fn get_definitions(&self) -> Option<Arc<Definitions>> {
        // The lock is poisoned only if a writer panicked while swapping the pointer; the value
        // inside is still a complete snapshot.
        let definitions = match self.definitions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        definitions.clone()
    }

    /// Install a new snapshot, returning the previous one.
    pub fn set_definitions(&self, definitions: Definitions) -> Option<Arc<Definitions>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Some(Arc::new(definitions));

        let mut slot = match self.definitions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, new_value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::DefinitionStore;
    use crate::definitions::{Definitions, FlagDefinition};

    fn flag(key: &str) -> FlagDefinition {
        serde_json::from_value(json!({
            "key": key,
            "context": "distinct_id",
            "ruleset": { "variants": [], "rollout": [] }
        }))
        .unwrap()
    }

    #[test]
    fn can_set_definitions_from_another_thread() {
        let store = Arc::new(DefinitionStore::new());

        assert!(store.get_definitions().is_none());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_definitions(Definitions::default());
            })
            .join();
        }

        assert!(store.get_definitions().is_some());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let store = DefinitionStore::new();
        store.set_definitions([flag("old")].into_iter().collect());

        let held = store.get_definitions().unwrap();
        let previous = store.set_definitions([flag("new")].into_iter().collect());

        assert!(Arc::ptr_eq(&held, &previous.unwrap()));
        assert!(held.get("old").is_some());
        assert!(held.get("new").is_none());

        let current = store.get_definitions().unwrap();
        assert!(current.get("new").is_some());
        assert!(current.get("old").is_none());
    }
}

use crate::error::CacheError;
use crate::group_store::GroupStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Infix between the version prefix and an entity kind in entity-index keys.
const ENTITY_INDEX_INFIX: &str = "_entity::";

/// A cache key tracked for entity-triggered invalidation, together with the
/// group it was written under.
///
/// The group has to travel with the key: a grouped entry lives under a
/// token-bearing final key, and deleting it later goes through
/// [`GroupStore::delete`] with the same group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedKey {
    pub key: String,
    pub group: Option<String>,
}

/// Mapping from entity kind to every cache key produced while serving calls
/// associated with it.
///
/// The mapping itself lives in the shared backend (one entry per kind, no
/// expiry), so it survives process restarts and is visible to every replica.
/// `register` is read-modify-write: an in-process mutex serializes writers in
/// one process, but concurrent processes can still lose a racing addition.
/// That is accepted — an entry that escapes tracking still expires via its
/// own TTL.
///
/// The registry invalidates by *kind*, not by instance: any mutation of any
/// instance of a registered kind drops every cached entry ever tagged with
/// that kind.
pub struct InvalidationRegistry {
    store: GroupStore,
    write_guard: Mutex<()>,
}

impl InvalidationRegistry {
    /// Creates a registry persisting through `store`'s backend.
    pub fn new(store: GroupStore) -> Self {
        Self {
            store,
            write_guard: Mutex::new(()),
        }
    }

    fn index_key(&self, kind: &str) -> String {
        format!("{}{}{}", self.store.version_prefix(), ENTITY_INDEX_INFIX, kind)
    }

    /// Reads the tracked key-set for `kind`. Unknown kinds yield an empty
    /// set.
    pub fn tracked(&self, kind: &str) -> Result<Vec<TrackedKey>, CacheError> {
        match self.store.backend().get(&self.index_key(kind))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Records `key` under every kind in `kinds`, skipping kinds that already
    /// track it.
    pub fn register(
        &self,
        kinds: &[String],
        key: &str,
        group: Option<&str>,
    ) -> Result<(), CacheError> {
        if kinds.is_empty() {
            return Ok(());
        }

        let tracked = TrackedKey {
            key: key.to_string(),
            group: group.map(str::to_string),
        };

        let _guard = self.write_guard.lock();
        for kind in kinds {
            let mut keys = self.tracked(kind)?;
            if keys.contains(&tracked) {
                continue;
            }
            keys.push(tracked.clone());
            let payload = serde_json::to_vec(&keys)?;
            self.store
                .backend()
                .set(&self.index_key(kind), payload, None)?;
            debug!(kind = %kind, key = %tracked.key, "registered for entity invalidation");
        }
        Ok(())
    }

    /// Deletes every cache key tracked under `kind`; returns how many were
    /// deleted.
    ///
    /// The registry entry itself stays in place — its keys are now absent,
    /// so a repeated invalidation is a harmless no-op. An unknown kind is a
    /// no-op as well.
    pub fn invalidate(&self, kind: &str) -> Result<usize, CacheError> {
        let keys = self.tracked(kind)?;
        for tracked in &keys {
            self.store.delete(&tracked.key, tracked.group.as_deref())?;
        }
        if !keys.is_empty() {
            debug!(kind = %kind, count = keys.len(), "entity invalidation");
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::group_store::MINT_DELAY;
    use std::sync::Arc;
    use std::time::Duration;

    fn fixture() -> (GroupStore, InvalidationRegistry) {
        let store = GroupStore::new(Arc::new(MemoryBackend::new()), "", MINT_DELAY);
        let registry = InvalidationRegistry::new(store.clone());
        (store, registry)
    }

    #[test]
    fn test_register_and_invalidate() {
        let (store, registry) = fixture();
        let kinds = vec!["User".to_string()];

        store
            .set("profile:1", &"a", Duration::from_secs(60), None)
            .unwrap();
        store
            .set("profile:2", &"b", Duration::from_secs(60), None)
            .unwrap();
        registry.register(&kinds, "profile:1", None).unwrap();
        registry.register(&kinds, "profile:2", None).unwrap();

        assert_eq!(registry.invalidate("User").unwrap(), 2);

        let one: Option<String> = store.get("profile:1", None).unwrap();
        let two: Option<String> = store.get("profile:2", None).unwrap();
        assert_eq!(one, None);
        assert_eq!(two, None);
    }

    #[test]
    fn test_register_deduplicates() {
        let (_, registry) = fixture();
        let kinds = vec!["User".to_string()];
        registry.register(&kinds, "k", None).unwrap();
        registry.register(&kinds, "k", None).unwrap();
        assert_eq!(registry.tracked("User").unwrap().len(), 1);
    }

    #[test]
    fn test_same_key_under_distinct_groups_is_tracked_twice() {
        let (_, registry) = fixture();
        let kinds = vec!["User".to_string()];
        registry.register(&kinds, "k", Some("a")).unwrap();
        registry.register(&kinds, "k", Some("b")).unwrap();
        assert_eq!(registry.tracked("User").unwrap().len(), 2);
    }

    #[test]
    fn test_invalidate_respects_groups() {
        let (store, registry) = fixture();
        let kinds = vec!["User".to_string()];

        store
            .set("k", &"grouped", Duration::from_secs(60), Some("grp"))
            .unwrap();
        registry.register(&kinds, "k", Some("grp")).unwrap();

        registry.invalidate("User").unwrap();
        let miss: Option<String> = store.get("k", Some("grp")).unwrap();
        assert_eq!(miss, None);
    }

    #[test]
    fn test_invalidate_unknown_kind_is_noop() {
        let (_, registry) = fixture();
        assert_eq!(registry.invalidate("Never").unwrap(), 0);
    }

    #[test]
    fn test_registry_entry_survives_invalidation() {
        let (store, registry) = fixture();
        let kinds = vec!["User".to_string()];
        store.set("k", &1, Duration::from_secs(60), None).unwrap();
        registry.register(&kinds, "k", None).unwrap();

        registry.invalidate("User").unwrap();
        // keys are gone but the tracking entry remains
        assert_eq!(registry.tracked("User").unwrap().len(), 1);
        assert_eq!(registry.invalidate("User").unwrap(), 1);
    }

    #[test]
    fn test_registry_survives_process_restart() {
        let backend = Arc::new(MemoryBackend::new());
        let kinds = vec!["User".to_string()];
        {
            let store = GroupStore::new(
                Arc::clone(&backend) as Arc<dyn crate::CacheBackend>,
                "",
                MINT_DELAY,
            );
            let registry = InvalidationRegistry::new(store);
            registry.register(&kinds, "k", None).unwrap();
        }
        // a new registry over the same backend sees the tracked keys
        let store = GroupStore::new(backend as Arc<dyn crate::CacheBackend>, "", MINT_DELAY);
        let registry = InvalidationRegistry::new(store);
        assert_eq!(registry.tracked("User").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_kinds_register_is_noop() {
        let (_, registry) = fixture();
        registry.register(&[], "k", None).unwrap();
        assert_eq!(registry.tracked("").unwrap().len(), 0);
    }
}

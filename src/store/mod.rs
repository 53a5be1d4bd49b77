//! Entity cache plus the persisted settings it sorts and filters with.
//!
//! The cache is in-memory and ordered by first insertion; an id index keeps
//! lookups O(1). Persisted slots (followed users, opened gists, sort type and
//! direction) go through a [`StorageBackend`].

pub mod backend;
pub mod sort;

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::model::EntityNode;

pub use backend::{JsonFileStorage, MemoryStorage, StorageBackend, StorageKey};
pub use sort::{sort_entities, SortDirection, SortType};

#[derive(Debug, Default)]
struct EntityCache {
    entities: Vec<EntityNode>,
    index: HashMap<String, usize>,
}

impl EntityCache {
    /// A read-only listing never downgrades a writable classification: an
    /// owned gist that is also starred stays writable in the cache.
    fn upsert(&mut self, mut entity: EntityNode) {
        match self.index.get(entity.id()) {
            Some(&pos) => {
                let cached = self.entities[pos].group;
                if cached.is_writable() && !entity.group.is_writable() {
                    entity.group = cached;
                }
                self.entities[pos] = entity;
            }
            None => {
                self.index.insert(entity.id().to_string(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    fn remove(&mut self, id: &str) -> Option<EntityNode> {
        let pos = self.index.remove(id)?;
        let removed = self.entities.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }
}

/// The session's gist cache and settings.
///
/// Constructed once per session and shared by reference (usually behind an
/// `Arc`) between the synchronizer and the command layer.
pub struct Store<B: StorageBackend = MemoryStorage> {
    cache: Mutex<EntityCache>,
    backend: B,
}

impl Store<MemoryStorage> {
    /// A store whose settings live only for this process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }
}

impl<B: StorageBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            cache: Mutex::new(EntityCache::default()),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ── Entity cache ────────────────────────────────────────────────────────

    /// Replace entries in place by id, appending unknown ones.
    pub fn upsert<I>(&self, entities: I)
    where
        I: IntoIterator<Item = EntityNode>,
    {
        let mut cache = self.cache.lock().unwrap();
        for entity in entities {
            cache.upsert(entity);
        }
    }

    pub fn remove(&self, id: &str) -> Option<EntityNode> {
        self.cache.lock().unwrap().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<EntityNode> {
        let cache = self.cache.lock().unwrap();
        cache.index.get(id).map(|&pos| cache.entities[pos].clone())
    }

    /// Snapshot of the cache in insertion order.
    pub fn entities(&self) -> Vec<EntityNode> {
        self.cache.lock().unwrap().entities.clone()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Sorting ─────────────────────────────────────────────────────────────

    /// Sort `list` (or the cache when `None`) and remember the order as the
    /// default for future listings.
    pub fn sort_gists(
        &self,
        sort_type: SortType,
        direction: SortDirection,
        list: Option<Vec<EntityNode>>,
    ) -> Result<Vec<EntityNode>> {
        let mut list = list.unwrap_or_else(|| self.entities());
        sort_entities(&mut list, sort_type, direction);
        self.set_sort_order(sort_type, direction)?;
        Ok(list)
    }

    /// Sort with the persisted order without changing it.
    pub fn apply_saved_order(&self, list: &mut [EntityNode]) -> Result<()> {
        let (sort_type, direction) = self.sort_order()?;
        sort_entities(list, sort_type, direction);
        Ok(())
    }

    pub fn sort_order(&self) -> Result<(SortType, SortDirection)> {
        let sort_type = self.get_from_global_state(StorageKey::SortType)?.parse()?;
        let direction = self.get_from_global_state(StorageKey::SortDirection)?.parse()?;
        Ok((sort_type, direction))
    }

    pub fn set_sort_order(&self, sort_type: SortType, direction: SortDirection) -> Result<()> {
        self.set_from_global_state(StorageKey::SortType, sort_type.as_str())?;
        self.set_from_global_state(StorageKey::SortDirection, direction.as_str())
    }

    // ── Persisted lists ─────────────────────────────────────────────────────

    fn require_list(key: StorageKey) -> Result<()> {
        if key.is_list() {
            Ok(())
        } else {
            Err(SyncError::configuration(format!("{} is not a list slot", key)))
        }
    }

    fn require_scalar(key: StorageKey) -> Result<()> {
        if key.is_list() {
            Err(SyncError::configuration(format!("{} is not a value slot", key)))
        } else {
            Ok(())
        }
    }

    pub fn read_from_global_storage(&self, key: StorageKey) -> Result<Vec<String>> {
        Self::require_list(key)?;
        match self.backend.get(key.as_str())? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_list(&self, key: StorageKey, list: Vec<String>) -> Result<()> {
        self.backend.set(key.as_str(), Value::from(list))
    }

    /// Append `value` unless an identical entry is already present.
    pub fn add_to_global_storage(&self, key: StorageKey, value: &str) -> Result<()> {
        let mut list = self.read_from_global_storage(key)?;
        if list.iter().any(|v| v == value) {
            return Ok(());
        }
        list.push(value.to_string());
        self.write_list(key, list)
    }

    /// Drop every exact match of `value`; absent values are a no-op.
    pub fn remove_from_global_storage(&self, key: StorageKey, value: &str) -> Result<()> {
        let mut list = self.read_from_global_storage(key)?;
        let before = list.len();
        list.retain(|v| v != value);
        if list.len() == before {
            return Ok(());
        }
        self.write_list(key, list)
    }

    /// Reset every persisted slot. The entity cache is left alone; callers
    /// refresh the tree to rebuild it.
    pub fn clear_global_storage(&self) -> Result<()> {
        for key in StorageKey::ALL {
            self.backend.delete(key.as_str())?;
        }
        Ok(())
    }

    pub fn purge_global_storage(&self) -> Result<()> {
        tracing::info!("purging persisted gist tree state");
        self.clear_global_storage()
    }

    // ── Persisted values ────────────────────────────────────────────────────

    /// Read a value slot, falling back to `name` / `ascending`.
    pub fn get_from_global_state(&self, key: StorageKey) -> Result<String> {
        Self::require_scalar(key)?;
        let stored = match self.backend.get(key.as_str())? {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(SyncError::configuration(format!(
                    "{} holds a non-string value: {}",
                    key, other
                )))
            }
            None => None,
        };
        Ok(stored.unwrap_or_else(|| match key {
            StorageKey::SortDirection => SortDirection::default().as_str().to_string(),
            _ => SortType::default().as_str().to_string(),
        }))
    }

    /// Write a value slot after validating it against the slot's type.
    pub fn set_from_global_state(&self, key: StorageKey, value: &str) -> Result<()> {
        Self::require_scalar(key)?;
        match key {
            StorageKey::SortType => {
                value.parse::<SortType>()?;
            }
            _ => {
                value.parse::<SortDirection>()?;
            }
        }
        self.backend.set(key.as_str(), Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gist, GroupKind};

    fn entity(id: &str, description: &str) -> EntityNode {
        EntityNode {
            gist: Gist::new(id, description, "octocat"),
            group: GroupKind::MyGists,
        }
    }

    fn ids(list: &[EntityNode]) -> Vec<String> {
        list.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn upsert_existing_keeps_length_and_index() {
        let store = Store::in_memory();
        store.upsert(vec![entity("a", "A"), entity("b", "B"), entity("c", "C")]);
        store.upsert(vec![entity("b", "B renamed")]);
        assert_eq!(store.len(), 3);
        let entities = store.entities();
        assert_eq!(entities[1].id(), "b");
        assert_eq!(entities[1].gist.description.as_deref(), Some("B renamed"));
    }

    #[test]
    fn read_only_listing_keeps_writable_classification() {
        let store = Store::in_memory();
        let mut owned = entity("a", "A");
        owned.group = GroupKind::MyGists;
        store.upsert([owned.clone()]);

        let mut starred = owned.clone();
        starred.group = GroupKind::Starred;
        starred.gist.description = Some("A starred".into());
        store.upsert([starred]);

        let cached = store.get("a").unwrap();
        assert_eq!(cached.group, GroupKind::MyGists);
        assert!(!cached.read_only());
        assert_eq!(cached.gist.description.as_deref(), Some("A starred"));
    }

    #[test]
    fn writable_listing_upgrades_read_only_classification() {
        let store = Store::in_memory();
        let mut starred = entity("a", "A");
        starred.group = GroupKind::Starred;
        store.upsert([starred.clone()]);
        let mut owned = starred;
        owned.group = GroupKind::MyGists;
        store.upsert([owned]);
        assert_eq!(store.get("a").unwrap().group, GroupKind::MyGists);
    }

    #[test]
    fn upsert_unknown_appends() {
        let store = Store::in_memory();
        store.upsert(vec![entity("a", "A")]);
        store.upsert(vec![entity("z", "Z")]);
        assert_eq!(ids(&store.entities()), vec!["a", "z"]);
    }

    #[test]
    fn remove_reindexes_following_entries() {
        let store = Store::in_memory();
        store.upsert(vec![entity("a", "A"), entity("b", "B"), entity("c", "C")]);
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.get("c").unwrap().id(), "c");
        store.upsert(vec![entity("c", "C2")]);
        assert_eq!(ids(&store.entities()), vec!["b", "c"]);
        assert_eq!(store.get("c").unwrap().gist.description.as_deref(), Some("C2"));
    }

    #[test]
    fn sort_gists_defaults_to_cache_and_persists_order() {
        let store = Store::in_memory();
        store.upsert(vec![entity("1", "beta"), entity("2", "Alpha"), entity("3", "gamma")]);
        let sorted = store
            .sort_gists(SortType::Name, SortDirection::Descending, None)
            .unwrap();
        assert_eq!(ids(&sorted), vec!["3", "1", "2"]);
        assert_eq!(
            store.sort_order().unwrap(),
            (SortType::Name, SortDirection::Descending)
        );
        // The cache itself keeps insertion order.
        assert_eq!(ids(&store.entities()), vec!["1", "2", "3"]);
    }

    #[test]
    fn sort_gists_name_ascending_then_descending_reverses() {
        let store = Store::in_memory();
        let input = vec![entity("1", "beta"), entity("2", "alpha"), entity("3", "gamma")];
        let asc = store
            .sort_gists(SortType::Name, SortDirection::Ascending, Some(input.clone()))
            .unwrap();
        let desc = store
            .sort_gists(SortType::Name, SortDirection::Descending, Some(input))
            .unwrap();
        let mut reversed = ids(&asc);
        reversed.reverse();
        assert_eq!(ids(&desc), reversed);
    }

    #[test]
    fn sort_gists_is_idempotent() {
        let store = Store::in_memory();
        let input = vec![entity("1", "beta"), entity("2", "alpha"), entity("3", "gamma")];
        let once = store
            .sort_gists(SortType::Name, SortDirection::Ascending, Some(input))
            .unwrap();
        let twice = store
            .sort_gists(SortType::Name, SortDirection::Ascending, Some(once.clone()))
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_order_defaults_to_name_ascending() {
        let store = Store::in_memory();
        assert_eq!(
            store.sort_order().unwrap(),
            (SortType::Name, SortDirection::Ascending)
        );
    }

    #[test]
    fn add_twice_keeps_one_entry() {
        let store = Store::in_memory();
        store.add_to_global_storage(StorageKey::FollowedUsers, "octocat").unwrap();
        store.add_to_global_storage(StorageKey::FollowedUsers, "octocat").unwrap();
        assert_eq!(
            store.read_from_global_storage(StorageKey::FollowedUsers).unwrap(),
            vec!["octocat".to_string()]
        );
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = Store::in_memory();
        for login in ["zed", "amy", "kim"] {
            store.add_to_global_storage(StorageKey::FollowedUsers, login).unwrap();
        }
        assert_eq!(
            store.read_from_global_storage(StorageKey::FollowedUsers).unwrap(),
            vec!["zed", "amy", "kim"]
        );
    }

    #[test]
    fn remove_absent_entry_is_noop() {
        let store = Store::in_memory();
        store.add_to_global_storage(StorageKey::OpenedGists, "g1").unwrap();
        store.remove_from_global_storage(StorageKey::OpenedGists, "g2").unwrap();
        assert_eq!(
            store.read_from_global_storage(StorageKey::OpenedGists).unwrap(),
            vec!["g1"]
        );
        store.remove_from_global_storage(StorageKey::OpenedGists, "g1").unwrap();
        assert!(store.read_from_global_storage(StorageKey::OpenedGists).unwrap().is_empty());
    }

    #[test]
    fn read_unset_list_is_empty() {
        let store = Store::in_memory();
        assert!(store.read_from_global_storage(StorageKey::FollowedUsers).unwrap().is_empty());
    }

    #[test]
    fn list_ops_on_value_slot_are_configuration_errors() {
        let store = Store::in_memory();
        let err = store
            .add_to_global_storage(StorageKey::SortType, "name")
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(store.get_from_global_state(StorageKey::FollowedUsers).is_err());
    }

    #[test]
    fn set_from_global_state_validates_values() {
        let store = Store::in_memory();
        store.set_from_global_state(StorageKey::SortType, "updateTime").unwrap();
        assert_eq!(store.get_from_global_state(StorageKey::SortType).unwrap(), "updateTime");
        assert!(store.set_from_global_state(StorageKey::SortType, "size").is_err());
        assert!(store
            .set_from_global_state(StorageKey::SortDirection, "sideways")
            .is_err());
    }

    #[test]
    fn clear_resets_slots_but_not_cache() {
        let store = Store::in_memory();
        store.upsert(vec![entity("a", "A")]);
        store.add_to_global_storage(StorageKey::FollowedUsers, "octocat").unwrap();
        store.set_sort_order(SortType::UpdateTime, SortDirection::Descending).unwrap();

        store.purge_global_storage().unwrap();

        assert!(store.read_from_global_storage(StorageKey::FollowedUsers).unwrap().is_empty());
        assert_eq!(
            store.sort_order().unwrap(),
            (SortType::Name, SortDirection::Ascending)
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_backed_store_persists_lists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        {
            let store = Store::new(JsonFileStorage::open(&path).unwrap());
            store.add_to_global_storage(StorageKey::OpenedGists, "g9").unwrap();
        }
        let store = Store::new(JsonFileStorage::open(&path).unwrap());
        assert_eq!(
            store.read_from_global_storage(StorageKey::OpenedGists).unwrap(),
            vec!["g9"]
        );
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::store::SequenceStore;
use crate::error::Result;
use crate::model::ActionSequence;

/// Cached registry of action sequences backed by a [`SequenceStore`].
///
/// Every mutation marks the cache dirty and is forwarded to the store. `update_cache` reloads
/// from the store only when the cache is dirty; the cache starts dirty.
pub struct ActionSequenceRepository {
    store: Arc<dyn SequenceStore>,
    cache: RwLock<BTreeMap<String, Arc<ActionSequence>>>,
    dirty: AtomicBool,
}

impl ActionSequenceRepository {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(true),
        }
    }

    /// Store `sequence`, overwriting one with the same name.
    /// Store failures are returned to the caller and not retried.
    pub fn save(&self, sequence: ActionSequence) -> Result<()> {
        let name = sequence.name().to_string();
        self.store.save(&sequence)?;
        let previous = self.cache.write().insert(name.clone(), Arc::new(sequence));
        if previous.is_some() {
            warn!(
                target: "randomizer::repository",
                sequence = %name,
                "ActionSequence already exists and has been overwritten"
            );
        }
        self.mark_dirty();
        info!(target: "randomizer::repository", sequence = %name, "ActionSequence saved");
        Ok(())
    }

    /// Remove `sequence` from the cache and the store. Unknown sequences are a logged no-op.
    pub fn delete(&self, sequence: &ActionSequence) -> Result<()> {
        if self.cache.write().remove(sequence.name()).is_none() {
            warn!(
                target: "randomizer::repository",
                sequence = %sequence.name(),
                "Attempted to delete a non-existent ActionSequence"
            );
            return Ok(());
        }
        self.mark_dirty();
        self.store.delete(sequence)?;
        info!(target: "randomizer::repository", sequence = %sequence.name(), "ActionSequence deleted");
        Ok(())
    }

    /// Add `sequence` unless one with the same name exists (logged no-op).
    pub fn add(&self, sequence: ActionSequence) -> Result<()> {
        let name = sequence.name().to_string();
        {
            let mut cache = self.cache.write();
            if cache.contains_key(&name) {
                warn!(
                    target: "randomizer::repository",
                    sequence = %name,
                    "ActionSequence already exists in storage"
                );
                return Ok(());
            }
            self.store.save(&sequence)?;
            cache.insert(name.clone(), Arc::new(sequence));
        }
        self.mark_dirty();
        info!(target: "randomizer::repository", sequence = %name, "ActionSequence added");
        Ok(())
    }

    /// Remove the sequence named `name` (logged no-op when missing).
    pub fn remove(&self, name: &str) -> Result<()> {
        let Some(removed) = self.cache.write().remove(name) else {
            warn!(
                target: "randomizer::repository",
                sequence = %name,
                "No ActionSequence with this name found in storage to remove"
            );
            return Ok(());
        };
        self.mark_dirty();
        self.store.delete(&removed)?;
        info!(target: "randomizer::repository", sequence = %name, "ActionSequence removed");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ActionSequence>> {
        self.cache.read().get(name).cloned()
    }

    /// All cached sequences, ordered by name.
    pub fn sequences(&self) -> Vec<Arc<ActionSequence>> {
        self.cache.read().values().cloned().collect()
    }

    pub fn active_sequences(&self) -> Vec<Arc<ActionSequence>> {
        self.cache
            .read()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Reload from the store if the cache is dirty. Returns whether a reload happened.
    /// On a store error the cache is left as is and stays dirty.
    pub fn update_cache(&self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            debug!(target: "randomizer::repository", "Cache is already up to date");
            return Ok(false);
        }
        let loaded = match self.store.load_all() {
            Ok(loaded) => loaded,
            Err(e) => {
                self.mark_dirty();
                return Err(e);
            }
        };
        let mut cache = self.cache.write();
        cache.clear();
        for sequence in loaded {
            cache.insert(sequence.name().to_string(), Arc::new(sequence));
        }
        info!(target: "randomizer::repository", count = cache.len(), "Cache updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_DESCRIPTION;
    use crate::repository::MemorySequenceStore;

    fn repo() -> (Arc<MemorySequenceStore>, ActionSequenceRepository) {
        let store = Arc::new(MemorySequenceStore::new());
        let repo = ActionSequenceRepository::new(store.clone());
        (store, repo)
    }

    #[test]
    fn save_twice_keeps_one_entry() {
        let (store, repo) = repo();
        repo.save(ActionSequence::new("Peek", Vec::new())).unwrap();
        repo.save(ActionSequence::new("Peek", Vec::new()).with_description("second"))
            .unwrap();

        assert_eq!(repo.sequences().len(), 1);
        assert_eq!(repo.get("Peek").unwrap().description(), "second");
        assert_eq!(store.len(), 1);

        assert!(repo.update_cache().unwrap());
        assert_eq!(repo.sequences().len(), 1);
        assert_eq!(repo.get("Peek").unwrap().description(), "second");
    }

    #[test]
    fn update_cache_only_when_dirty() {
        let store = Arc::new(MemorySequenceStore::with_sequences([
            ActionSequence::new("A", Vec::new()),
            ActionSequence::new("B", Vec::new()).with_active(false),
        ]));
        let repo = ActionSequenceRepository::new(store.clone());
        assert!(repo.sequences().is_empty());
        assert!(repo.update_cache().unwrap());
        assert!(!repo.update_cache().unwrap());
        assert_eq!(repo.sequences().len(), 2);
        assert_eq!(repo.active_sequences().len(), 1);

        store.save(&ActionSequence::new("C", Vec::new())).unwrap();
        assert!(!repo.update_cache().unwrap());
        repo.mark_dirty();
        assert!(repo.update_cache().unwrap());
        assert_eq!(repo.sequences().len(), 3);
    }

    #[test]
    fn missing_entries_are_noops() {
        let (store, repo) = repo();
        repo.update_cache().unwrap();
        repo.delete(&ActionSequence::new("Ghost", Vec::new())).unwrap();
        repo.remove("Ghost").unwrap();
        assert!(!repo.is_dirty());

        repo.add(ActionSequence::new("Peek", Vec::new())).unwrap();
        repo.add(ActionSequence::new("Peek", Vec::new()).with_description("dup"))
            .unwrap();
        assert_eq!(repo.get("Peek").unwrap().description(), DEFAULT_DESCRIPTION);
        assert!(repo.is_dirty());

        repo.remove("Peek").unwrap();
        assert!(repo.get("Peek").is_none());
        assert!(store.is_empty());
    }
}

//! Sequence persistence.
//!
//! The repository only talks to a [`SequenceStore`]; how sequences are kept is up to the store.
//! - `JsonSequenceStore`: one pretty-printed JSON file per sequence in a directory.
//! - `MemorySequenceStore`: process-local map, used by tests and dry runs.
//!
//! `watch_store` hooks a directory up to `notify` so edits made outside the process mark the
//! repository cache dirty; the next `update_cache` picks them up.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::sequences::ActionSequenceRepository;
use crate::config::SequenceDef;
use crate::error::{RandomizerError, Result};
use crate::model::ActionSequence;

/// Persistence collaborator of [`ActionSequenceRepository`].
pub trait SequenceStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<ActionSequence>>;
    fn save(&self, sequence: &ActionSequence) -> Result<()>;
    /// Deleting a sequence the store does not hold is not an error.
    fn delete(&self, sequence: &ActionSequence) -> Result<()>;
}

/// Directory of `<name>.json` files, one [`SequenceDef`] each.
#[derive(Debug, Clone)]
pub struct JsonSequenceStore {
    dir: PathBuf,
}

impl JsonSequenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(name)))
    }

    /// Name stored in an existing file at `path`, if it can be read.
    fn stored_name(path: &Path) -> Option<String> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str::<SequenceDef>(&text).ok().map(|def| def.name)
    }
}

/// Injective file stem: ASCII letters, digits, `-`, `_` and spaces are kept, every other byte
/// is written as `%XX`.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b' ') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl SequenceStore for JsonSequenceStore {
    fn load_all(&self) -> Result<Vec<ActionSequence>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target: "randomizer::store", dir = %self.dir.display(), "Sequence directory missing; nothing to load");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json") && p.is_file())
            .collect();
        paths.sort();

        let mut sequences = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(RandomizerError::from)
                .and_then(|text| Ok(serde_json::from_str::<SequenceDef>(&text)?));
            match parsed {
                Ok(def) => {
                    trace!(target: "randomizer::store", path = %path.display(), sequence = %def.name, "Loaded sequence");
                    sequences.push(ActionSequence::from(&def));
                }
                Err(e) => {
                    warn!(
                        target: "randomizer::store",
                        path = %path.display(), error = %e,
                        "Skipping unreadable sequence file"
                    );
                }
            }
        }
        Ok(sequences)
    }

    fn save(&self, sequence: &ActionSequence) -> Result<()> {
        let fail = |e: &dyn std::fmt::Display| RandomizerError::persistence(sequence.name(), e.to_string());
        fs::create_dir_all(&self.dir).map_err(|e| fail(&e))?;
        let json = serde_json::to_string_pretty(&SequenceDef::from(sequence)).map_err(|e| fail(&e))?;
        let path = self.path_for(sequence.name());
        // Case-insensitive file systems can still map two names onto one file.
        if let Some(existing) = Self::stored_name(&path).filter(|n| n != sequence.name()) {
            return Err(fail(&format!(
                "{} already holds sequence '{existing}'",
                path.display()
            )));
        }
        fs::write(&path, json).map_err(|e| fail(&e))?;
        debug!(target: "randomizer::store", path = %path.display(), "Sequence written");
        Ok(())
    }

    fn delete(&self, sequence: &ActionSequence) -> Result<()> {
        let path = self.path_for(sequence.name());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RandomizerError::persistence(sequence.name(), e.to_string())),
        }
    }
}

/// In-memory store. Hands out deep copies.
#[derive(Debug, Default)]
pub struct MemorySequenceStore {
    sequences: Mutex<BTreeMap<String, ActionSequence>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `sequences`.
    pub fn with_sequences(sequences: impl IntoIterator<Item = ActionSequence>) -> Self {
        Self {
            sequences: Mutex::new(
                sequences
                    .into_iter()
                    .map(|s| (s.name().to_string(), s))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.lock().is_empty()
    }
}

impl SequenceStore for MemorySequenceStore {
    fn load_all(&self) -> Result<Vec<ActionSequence>> {
        Ok(self.sequences.lock().values().cloned().collect())
    }

    fn save(&self, sequence: &ActionSequence) -> Result<()> {
        self.sequences
            .lock()
            .insert(sequence.name().to_string(), sequence.clone());
        Ok(())
    }

    fn delete(&self, sequence: &ActionSequence) -> Result<()> {
        self.sequences.lock().remove(sequence.name());
        Ok(())
    }
}

/// Keeps a directory watch alive; dropping it stops watching.
pub struct StoreWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for StoreWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWatcher")
            .field("_watcher", &"<watcher>")
            .finish()
    }
}

/// Mark `repository` dirty whenever a file in `dir` is created, modified or removed.
pub fn watch_store(
    dir: impl AsRef<Path>,
    repository: Arc<ActionSequenceRepository>,
) -> anyhow::Result<StoreWatcher> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                trace!(target: "randomizer::store", paths = ?event.paths, "Sequence directory changed");
                repository.mark_dirty();
            }
        }
        Err(e) => warn!(target: "randomizer::store", error = %e, "Watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(target: "randomizer::store", dir = %dir.display(), "Watching sequence directory");

    Ok(StoreWatcher { _watcher: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Interval};

    fn sample(name: &str) -> ActionSequence {
        ActionSequence::new(
            name,
            vec![Action::new("Left", "A").with_interval(Interval::new(100, 200))],
        )
        .with_description("strafe left")
    }

    #[test]
    fn json_store_saves_loads_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSequenceStore::new(dir.path().join("sequences"));
        assert!(store.load_all().unwrap().is_empty());

        store.save(&sample("Strafe/Left")).unwrap();
        store.save(&sample("Peek")).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        let strafe = loaded.iter().find(|s| s.name() == "Strafe/Left").unwrap();
        assert_eq!(strafe.description(), "strafe left");
        assert_eq!(strafe.actions()[0].interval(), Interval::new(100, 200));

        store.delete(strafe).unwrap();
        store.delete(strafe).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn json_store_keeps_similar_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonSequenceStore::new(dir.path()));
        let repo = ActionSequenceRepository::new(store.clone());
        repo.save(sample("a/b")).unwrap();
        repo.save(sample("a_b")).unwrap();
        repo.save(sample("a%2Fb")).unwrap();

        repo.mark_dirty();
        repo.update_cache().unwrap();
        let names: Vec<_> = repo.sequences().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a%2Fb", "a/b", "a_b"]);

        store.delete(&sample("a/b")).unwrap();
        let left: Vec<_> = store.load_all().unwrap().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(left.len(), 2);
        assert!(!left.contains(&"a/b".to_string()));
    }

    #[test]
    fn json_store_refuses_to_overwrite_another_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSequenceStore::new(dir.path());
        let def = SequenceDef::from(&sample("Other"));
        fs::write(
            dir.path().join("Peek.json"),
            serde_json::to_string(&def).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.save(&sample("Peek")),
            Err(RandomizerError::Persistence { .. })
        ));
        assert_eq!(store.load_all().unwrap()[0].name(), "Other");
    }

    #[test]
    fn file_stems_escape_separators() {
        assert_eq!(file_stem("Strafe Left"), "Strafe Left");
        assert_eq!(file_stem("a/b"), "a%2Fb");
        assert_eq!(file_stem("a%b"), "a%25b");
        assert_eq!(file_stem("é"), "%C3%A9");
    }

    #[test]
    fn json_store_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = JsonSequenceStore::new(dir.path());
        store.save(&sample("Peek")).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name(), "Peek");
    }

    #[test]
    fn memory_store_returns_copies() {
        let store = MemorySequenceStore::with_sequences([sample("Peek")]);
        let first = store.load_all().unwrap();
        first[0].interrupt();
        let second = store.load_all().unwrap();
        assert!(!second[0].is_interrupted());
        assert!(!second[0].actions()[0].is_interrupted());
        assert_eq!(store.len(), 1);
    }
}

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{RandomizerError, Result};
use crate::model::Action;

/// Registry of known actions with an enabled flag each.
///
/// Insertion order is kept. Actions are identified by name, and every read returns copies with
/// a fresh runtime state, so callers never share mutable state with the registry.
#[derive(Debug, Default)]
pub struct ActionRepository {
    entries: RwLock<Vec<(Action, bool)>>,
}

impl ActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action as enabled. An action with the same name is replaced in place.
    pub fn register(&self, action: Action) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(a, _)| a.name() == action.name()) {
            Some(entry) => {
                debug!(target: "randomizer::repository", action = %action.name(), "Replacing registered action");
                *entry = (action, true);
            }
            None => entries.push((action, true)),
        }
    }

    pub fn unregister(&self, name: &str) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(a, _)| a.name() != name);
        if entries.len() == before {
            warn!(target: "randomizer::repository", action = %name, "No action registered under this name");
        }
    }

    pub fn has_action_with_name(&self, name: &str) -> bool {
        self.entries.read().iter().any(|(a, _)| a.name() == name)
    }

    pub fn enable(&self, name: &str) {
        self.set_enabled(name, true);
    }

    pub fn disable(&self, name: &str) {
        self.set_enabled(name, false);
    }

    /// Unknown actions count as enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .read()
            .iter()
            .find(|(a, _)| a.name() == name)
            .is_none_or(|(_, enabled)| *enabled)
    }

    /// Copies of all actions with their enabled flag, in registration order.
    pub fn actions(&self) -> Vec<(Action, bool)> {
        self.entries.read().clone()
    }

    /// Copy of the action registered under `name`.
    pub fn get_by_name(&self, name: &str) -> Result<Action> {
        self.entries
            .read()
            .iter()
            .find(|(a, _)| a.name() == name)
            .map(|(a, _)| a.clone())
            .ok_or_else(|| RandomizerError::ActionNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn set_enabled(&self, name: &str, enabled: bool) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(a, _)| a.name() == name) {
            Some((_, flag)) => *flag = enabled,
            None => {
                warn!(target: "randomizer::repository", action = %name, enabled, "Cannot toggle unknown action")
            }
        }
    }
}

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use super::action::Action;
use crate::input::InputInjector;

pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Named, ordered group of actions executed as one unit.
///
/// Equality and hashing use the name only. Cloning is deep: the clone owns fresh copies of
/// every action, so dispatching one never touches the other.
#[derive(Debug)]
pub struct ActionSequence {
    name: String,
    description: String,
    active: AtomicBool,
    interrupted: AtomicBool,
    actions: Vec<Arc<Action>>,
}

impl ActionSequence {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            active: AtomicBool::new(true),
            interrupted: AtomicBool::new(false),
            actions: actions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_active(self, active: bool) -> Self {
        self.active.store(active, Ordering::Release);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn set_actions(&mut self, actions: Vec<Action>) {
        self.actions = actions.into_iter().map(Arc::new).collect();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Soft-interrupt the sequence and every action in it.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.actions.iter().for_each(|a| a.interrupt());
        info!(target: "randomizer::sequence", sequence = %self.name, "ActionSequence has been interrupted");
    }

    /// Hard-interrupt the sequence, releasing every held input immediately.
    pub fn instant_interrupt(&self, injector: &dyn InputInjector) {
        self.interrupted.store(true, Ordering::Release);
        self.actions.iter().for_each(|a| a.instant_interrupt(injector));
        info!(
            target: "randomizer::sequence",
            sequence = %self.name,
            "ActionSequence has been immediately interrupted"
        );
    }

    /// Clear the interrupted flag and normalize every action.
    pub fn reset_interrupted(&self) {
        self.interrupted.store(false, Ordering::Release);
        self.actions.iter().for_each(|a| a.normalize());
        info!(
            target: "randomizer::sequence",
            sequence = %self.name,
            "ActionSequence interrupted state has been reset"
        );
    }

    /// Mark the sequence interrupted without touching its actions.
    pub(crate) fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Clear the sequence flag only; actions keep their (possibly resumable) state.
    pub(crate) fn clear_interrupted(&self) {
        self.interrupted.store(false, Ordering::Release);
    }
}

impl Clone for ActionSequence {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            active: AtomicBool::new(self.is_active()),
            interrupted: AtomicBool::new(false),
            actions: self
                .actions
                .iter()
                .map(|a| Arc::new(Action::clone(a)))
                .collect(),
        }
    }
}

impl PartialEq for ActionSequence {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ActionSequence {}

impl Hash for ActionSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ActionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionSequence{{name='{}', actions=[", self.name)?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{action}")?;
        }
        f.write_str("]}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::injector::testing::{Injected, RecordingInjector};
    use crate::model::{InputCode, Interval};

    fn sample() -> ActionSequence {
        ActionSequence::new(
            "Strafe",
            vec![
                Action::new("Left", "A").with_interval(Interval::new(10, 20)),
                Action::pause(),
            ],
        )
    }

    #[test]
    fn defaults() {
        let seq = sample();
        assert_eq!(seq.description(), DEFAULT_DESCRIPTION);
        assert!(seq.is_active());
        assert!(!seq.is_interrupted());
        assert_eq!(seq.actions().len(), 2);
    }

    #[test]
    fn interrupt_propagates_and_reset_normalizes() {
        let seq = sample();
        seq.interrupt();
        assert!(seq.is_interrupted());
        assert!(seq.actions().iter().all(|a| a.is_interrupted()));

        seq.reset_interrupted();
        assert!(!seq.is_interrupted());
        assert!(seq.actions().iter().all(|a| !a.is_interrupted() && !a.is_executing()));
    }

    #[test]
    fn instant_interrupt_releases_keys() {
        let seq = sample();
        let injector = RecordingInjector::default();
        seq.instant_interrupt(&injector);
        assert_eq!(injector.calls(), vec![Injected::End(InputCode::Key("A".into()))]);
    }

    #[test]
    fn clone_is_deep_and_equality_uses_name() {
        let seq = sample();
        let copy = seq.clone();
        assert_eq!(seq, copy);
        assert!(!Arc::ptr_eq(&seq.actions()[0], &copy.actions()[0]));
        copy.actions()[0].interrupt();
        assert!(!seq.actions()[0].is_interrupted());

        let other = ActionSequence::new("Other", Vec::new());
        assert_ne!(seq, other);
    }

    #[test]
    fn display_lists_actions() {
        let text = sample().to_string();
        assert!(text.starts_with("ActionSequence{name='Strafe'"));
        assert!(text.contains("Left [A]"));
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::events::EventHandlers;
use crate::model::{Action, ActionEnv, ActionOutcome, ActionSequence};
use crate::repository::ActionRepository;

/// How a call to [`ActionSequenceDispatcher::dispatch_sequence`] ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every action ran; `on_sequence_finished` fired.
    Finished,
    /// Stopped at the first interruption; no finish event.
    Interrupted,
    /// Not dispatched at all (inactive sequence or nothing to resume).
    Rejected,
}

/// Runs one action sequence at a time, action by action.
///
/// The current sequence and the running set are only held behind short, non-awaiting locks so
/// that hook callbacks reading them never wait on a dispatch in progress.
pub struct ActionSequenceDispatcher {
    env: ActionEnv,
    actions: Option<Arc<ActionRepository>>,
    events: EventHandlers,
    current: RwLock<Option<Arc<ActionSequence>>>,
    running: RwLock<Vec<Arc<Action>>>,
}

impl ActionSequenceDispatcher {
    /// `actions` is consulted for enabled flags; disabled actions are skipped.
    pub fn new(env: ActionEnv, actions: Option<Arc<ActionRepository>>) -> Self {
        Self {
            env,
            actions,
            events: EventHandlers::default(),
            current: RwLock::new(None),
            running: RwLock::new(Vec::new()),
        }
    }

    pub fn env(&self) -> &ActionEnv {
        &self.env
    }

    pub fn events(&self) -> &EventHandlers {
        &self.events
    }

    pub fn on_action_started(&self, handler: impl Fn(&Arc<Action>) + Send + Sync + 'static) {
        self.events.on_action_started(handler);
    }

    pub fn on_action_finished(&self, handler: impl Fn(&Arc<Action>) + Send + Sync + 'static) {
        self.events.on_action_finished(handler);
    }

    pub fn on_sequence_started(
        &self,
        handler: impl Fn(&Arc<ActionSequence>) + Send + Sync + 'static,
    ) {
        self.events.on_sequence_started(handler);
    }

    pub fn on_sequence_finished(
        &self,
        handler: impl Fn(&Arc<ActionSequence>) + Send + Sync + 'static,
    ) {
        self.events.on_sequence_finished(handler);
    }

    pub fn current_sequence(&self) -> Option<Arc<ActionSequence>> {
        self.current.read().clone()
    }

    pub fn running_actions(&self) -> Vec<Arc<Action>> {
        self.running.read().clone()
    }

    /// Run `sequence` to completion or to its first interruption.
    ///
    /// Any sequence still current is hard-interrupted first. Errors from an action mark the
    /// sequence interrupted and are returned after the bookkeeping has been cleaned up.
    pub async fn dispatch_sequence(
        &self,
        sequence: Arc<ActionSequence>,
    ) -> anyhow::Result<SequenceOutcome> {
        if !sequence.is_active() {
            debug!(target: "randomizer::dispatcher", sequence = %sequence.name(), "Sequence inactive; not dispatching");
            return Ok(SequenceOutcome::Rejected);
        }

        self.discard_all_running_actions();
        sequence.reset_interrupted();
        *self.current.write() = Some(sequence.clone());

        self.events.sequence_started(&sequence);

        let result = self.run_actions(&sequence, 0).await;
        self.finish(&sequence);
        result
    }

    /// Resume `sequence` mid-action: replay the action at `index` for `remaining`, then run the
    /// actions after it.
    pub async fn resume_sequence(
        &self,
        sequence: Arc<ActionSequence>,
        index: usize,
        remaining: Duration,
    ) -> anyhow::Result<SequenceOutcome> {
        if !sequence.is_active() {
            return Ok(SequenceOutcome::Rejected);
        }
        let Some(action) = sequence.actions().get(index).cloned() else {
            return Ok(SequenceOutcome::Rejected);
        };

        let displaced = self
            .current_sequence()
            .is_some_and(|current| !Arc::ptr_eq(&current, &sequence));
        if displaced {
            self.discard_all_running_actions();
        }
        *self.current.write() = Some(sequence.clone());
        info!(
            target: "randomizer::dispatcher",
            sequence = %sequence.name(), action = %action.name(),
            remaining_ms = remaining.as_millis() as u64,
            "Resuming sequence"
        );

        let remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
        let result = match self.redispatch(&action, remaining_ms).await {
            Ok(Some(ActionOutcome::Completed)) => self.run_actions(&sequence, index + 1).await,
            Ok(Some(ActionOutcome::Interrupted)) => Ok(SequenceOutcome::Interrupted),
            Ok(None) => Ok(SequenceOutcome::Rejected),
            Err(e) => Err(e),
        };
        self.finish(&sequence);
        result
    }

    /// Replay a soft-interrupted action for exactly `remaining_ms`.
    ///
    /// Returns `None` without touching the action when the current sequence is interrupted or
    /// the action is already executing.
    pub async fn redispatch(
        &self,
        action: &Arc<Action>,
        remaining_ms: u64,
    ) -> anyhow::Result<Option<ActionOutcome>> {
        let current = self.current_sequence();
        if current.as_ref().is_some_and(|s| s.is_interrupted()) {
            info!(target: "randomizer::dispatcher", action = %action.name(), "Skipping redispatch because sequence is interrupted");
            return Ok(None);
        }
        if action.is_executing() {
            info!(target: "randomizer::dispatcher", action = %action.name(), "Action is already executing, not redispatching");
            return Ok(None);
        }

        let execution = action.begin();
        self.running.write().push(action.clone());
        let result = action.run(&self.env, remaining_ms, &execution).await;
        drop(execution);

        match result {
            Ok(ActionOutcome::Completed) => {
                self.complete(action);
                Ok(Some(ActionOutcome::Completed))
            }
            Ok(ActionOutcome::Interrupted) => {
                info!(target: "randomizer::dispatcher", action = %action.name(), "Interrupted action processing during redispatch");
                if let Some(sequence) = &current {
                    sequence.mark_interrupted();
                }
                Ok(Some(ActionOutcome::Interrupted))
            }
            Err(e) => {
                error!(target: "randomizer::dispatcher", action = %action.name(), error = %e, "Error redispatching action");
                self.remove_running(action);
                if let Some(sequence) = &current {
                    sequence.interrupt();
                }
                Err(e).with_context(|| format!("Failed to redispatch action '{}'", action.name()))
            }
        }
    }

    /// Emergency stop: hard-interrupt the current sequence and every running action.
    pub fn discard_all_running_actions(&self) {
        let current = self.current.write().take();
        if let Some(sequence) = current {
            info!(target: "randomizer::dispatcher", sequence = %sequence.name(), "Interrupting current sequence");
            sequence.instant_interrupt(self.env.injector.as_ref());
        }

        let running = std::mem::take(&mut *self.running.write());
        if running.is_empty() {
            debug!(target: "randomizer::dispatcher", "No individual running actions to discard");
            return;
        }
        info!(target: "randomizer::dispatcher", count = running.len(), "Discarding running actions");
        for action in running {
            action.instant_interrupt(self.env.injector.as_ref());
        }
    }

    async fn run_actions(
        &self,
        sequence: &Arc<ActionSequence>,
        from: usize,
    ) -> anyhow::Result<SequenceOutcome> {
        for action in sequence.actions().iter().skip(from) {
            if self.env.focus_lost() {
                info!(target: "randomizer::dispatcher", sequence = %sequence.name(), "Interrupted sequence processing due to loss of focus");
                sequence.interrupt();
                break;
            }
            if sequence.is_interrupted() {
                break;
            }
            if action.is_interrupted() {
                info!(target: "randomizer::dispatcher", action = %action.name(), "Skipped action because it was interrupted before executing");
                continue;
            }
            if let Some(repo) = &self.actions {
                if !repo.is_enabled(action.name()) {
                    debug!(target: "randomizer::dispatcher", action = %action.name(), "Skipped disabled action");
                    continue;
                }
            }

            match self.dispatch(action).await {
                Ok(ActionOutcome::Completed) => {}
                Ok(ActionOutcome::Interrupted) => {
                    sequence.mark_interrupted();
                    break;
                }
                Err(e) => {
                    error!(
                        target: "randomizer::dispatcher",
                        sequence = %sequence.name(), action = %action.name(), error = %e,
                        "Error dispatching action"
                    );
                    sequence.interrupt();
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to dispatch action '{}' of sequence '{}'",
                            action.name(),
                            sequence.name()
                        )
                    });
                }
            }
        }

        if sequence.is_interrupted() {
            info!(target: "randomizer::dispatcher", sequence = %sequence.name(), "Sequence was not fully dispatched due to interruption");
            return Ok(SequenceOutcome::Interrupted);
        }

        sequence.actions().iter().for_each(|a| a.normalize());
        self.events.sequence_finished(sequence);
        info!(target: "randomizer::dispatcher", sequence = %sequence.name(), "ActionSequence successfully dispatched");
        Ok(SequenceOutcome::Finished)
    }

    async fn dispatch(&self, action: &Arc<Action>) -> crate::error::Result<ActionOutcome> {
        self.events.action_started(action);

        let execution = action.begin();
        self.running.write().push(action.clone());
        let delay = action.roll_delay();
        let result = action.run(&self.env, delay, &execution).await;
        drop(execution);

        match result {
            Ok(ActionOutcome::Completed) => {
                self.complete(action);
                Ok(ActionOutcome::Completed)
            }
            Ok(ActionOutcome::Interrupted) => {
                info!(target: "randomizer::dispatcher", action = %action.name(), "Interrupted action processing");
                Ok(ActionOutcome::Interrupted)
            }
            Err(e) => {
                self.remove_running(action);
                Err(e)
            }
        }
    }

    fn complete(&self, action: &Arc<Action>) {
        self.remove_running(action);
        self.events.action_finished(action);
        info!(
            target: "randomizer::dispatcher",
            action = %action.name(),
            delay_ms = action.last_delay().unwrap_or_default(),
            "Action successfully dispatched"
        );
    }

    fn remove_running(&self, action: &Arc<Action>) {
        self.running.write().retain(|a| !Arc::ptr_eq(a, action));
    }

    /// Release this sequence's leftovers. A sequence displaced by a newer dispatch leaves the
    /// newer one's state alone.
    fn finish(&self, sequence: &Arc<ActionSequence>) {
        let leftovers: Vec<Arc<Action>> = {
            let mut running = self.running.write();
            let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut *running)
                .into_iter()
                .partition(|a| sequence.actions().iter().any(|b| Arc::ptr_eq(a, b)));
            *running = others;
            mine
        };
        for action in leftovers {
            action.instant_interrupt(self.env.injector.as_ref());
        }

        sequence.clear_interrupted();

        let mut current = self.current.write();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, sequence)) {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ApplicationContext;
    use crate::input::AlwaysFocused;
    use crate::input::injector::testing::{Injected, RecordingInjector};
    use crate::model::{ActionSettings, InputCode, Interval};
    use parking_lot::Mutex;

    fn dispatcher(
        injector: Arc<RecordingInjector>,
        actions: Option<Arc<ActionRepository>>,
    ) -> ActionSequenceDispatcher {
        let env = ActionEnv::new(
            injector,
            Arc::new(AlwaysFocused),
            Arc::new(ApplicationContext::new(false)),
        )
        .with_settings(ActionSettings {
            interrupt_check_interval: Duration::from_millis(5),
            ..ActionSettings::default()
        });
        ActionSequenceDispatcher::new(env, actions)
    }

    #[tokio::test]
    async fn inactive_sequences_are_rejected() {
        let d = dispatcher(Arc::new(RecordingInjector::default()), None);
        let seq = Arc::new(ActionSequence::new("Off", vec![Action::pause()]).with_active(false));
        assert_eq!(d.dispatch_sequence(seq).await.unwrap(), SequenceOutcome::Rejected);
    }

    #[tokio::test]
    async fn disabled_actions_are_skipped() {
        let injector = Arc::new(RecordingInjector::default());
        let repo = Arc::new(ActionRepository::new());
        repo.register(Action::new("Jump", "SPACE"));
        repo.register(Action::new("Left", "A"));
        repo.disable("Jump");
        let d = dispatcher(injector.clone(), Some(repo));

        let seq = Arc::new(ActionSequence::new(
            "Hop",
            vec![Action::new("Jump", "SPACE"), Action::new("Left", "A")],
        ));
        let finished = Arc::new(Mutex::new(Vec::new()));
        let f = finished.clone();
        d.on_action_finished(move |a| f.lock().push(a.name().to_string()));

        assert_eq!(d.dispatch_sequence(seq).await.unwrap(), SequenceOutcome::Finished);
        assert_eq!(*finished.lock(), vec!["Left"]);
        assert_eq!(
            injector.calls(),
            vec![
                Injected::Start(InputCode::Key("A".into())),
                Injected::End(InputCode::Key("A".into())),
            ]
        );
    }

    #[tokio::test]
    async fn injector_error_interrupts_and_propagates() {
        let injector = Arc::new(RecordingInjector::default());
        injector.fail_end.store(true, std::sync::atomic::Ordering::Relaxed);
        let d = dispatcher(injector, None);
        let seq = Arc::new(ActionSequence::new(
            "Broken",
            vec![
                Action::new("Left", "A").with_interval(Interval::new(5, 6)),
                Action::new("Right", "D"),
            ],
        ));
        let finished = Arc::new(Mutex::new(0));
        let f = finished.clone();
        d.on_sequence_finished(move |_| *f.lock() += 1);

        let err = d.dispatch_sequence(seq.clone()).await.unwrap_err();
        assert!(format!("{err:#}").contains("Left"));
        assert_eq!(*finished.lock(), 0);
        assert!(d.current_sequence().is_none());
        assert!(d.running_actions().is_empty());
        assert!(!seq.is_interrupted());
    }

    #[tokio::test]
    async fn resume_runs_remaining_actions() {
        let injector = Arc::new(RecordingInjector::default());
        let d = dispatcher(injector.clone(), None);
        let seq = Arc::new(ActionSequence::new(
            "Walk",
            vec![
                Action::new("Forward", "W").with_interval(Interval::new(10, 11)),
                Action::new("Left", "A"),
            ],
        ));
        let outcome = d
            .resume_sequence(seq.clone(), 0, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(outcome, SequenceOutcome::Finished);
        assert_eq!(injector.calls().len(), 4);
        assert!(d.current_sequence().is_none());

        assert_eq!(
            d.resume_sequence(seq, 7, Duration::from_millis(1)).await.unwrap(),
            SequenceOutcome::Rejected
        );
    }
}

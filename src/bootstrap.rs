//! Object graph of a running randomizer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::RandomizerConfig;
use crate::error::Result;
use crate::executor::{
    ActionSequenceDispatcher, ActionSequenceExecutor, ApplicationContext, ApplicationState,
    ExecutorHandle, ExecutorSettings,
};
use crate::input::{FocusCheck, HookSink, InputInjector};
use crate::model::{Action, ActionEnv, ActionSettings};
use crate::repository::{ActionRepository, ActionSequenceRepository, SequenceStore};

/// Everything needed to run sequences, built from one [`RandomizerConfig`].
pub struct Randomizer {
    config: RandomizerConfig,
    context: Arc<ApplicationContext>,
    actions: Arc<ActionRepository>,
    sequences: Arc<ActionSequenceRepository>,
    dispatcher: Arc<ActionSequenceDispatcher>,
    executor: ActionSequenceExecutor,
}

impl Randomizer {
    /// Registers `Pause`, `Mouse move` and the configured keybinds, in that order.
    pub fn new(
        config: RandomizerConfig,
        store: Arc<dyn SequenceStore>,
        injector: Arc<dyn InputInjector>,
        focus: Arc<dyn FocusCheck>,
    ) -> Self {
        let context = Arc::new(ApplicationContext::new(config.check_for_focus));

        let actions = Arc::new(ActionRepository::new());
        actions.register(Action::pause());
        actions.register(Action::mouse_move());
        for keybind in &config.keybinds {
            actions.register(Action::from(keybind));
        }
        debug!(target: "randomizer::bootstrap", count = actions.len(), "Actions registered");

        let env = ActionEnv::new(injector, focus, context.clone()).with_settings(ActionSettings {
            interrupt_check_interval: Duration::from_millis(config.interrupt_check_interval_ms),
            max_mouse_move_distance: config.max_mouse_move_distance,
        });
        let dispatcher = Arc::new(ActionSequenceDispatcher::new(env, Some(actions.clone())));
        let sequences = Arc::new(ActionSequenceRepository::new(store));
        let executor = ActionSequenceExecutor::new(
            sequences.clone(),
            dispatcher.clone(),
            executor_settings(&config),
        );

        Self {
            config,
            context,
            actions,
            sequences,
            dispatcher,
            executor,
        }
    }

    pub fn config(&self) -> &RandomizerConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ApplicationContext> {
        &self.context
    }

    pub fn actions(&self) -> &Arc<ActionRepository> {
        &self.actions
    }

    pub fn sequences(&self) -> &Arc<ActionSequenceRepository> {
        &self.sequences
    }

    pub fn dispatcher(&self) -> &Arc<ActionSequenceDispatcher> {
        &self.dispatcher
    }

    pub fn executor(&self) -> &ActionSequenceExecutor {
        &self.executor
    }

    pub fn hook_sink(&self) -> HookSink {
        self.executor.hook_sink()
    }

    /// Start the scheduler and enter the first application state.
    ///
    /// With focus checking the randomizer waits for the target window (`Awaiting`), otherwise it
    /// runs right away.
    pub fn start(&self) -> Result<ExecutorHandle> {
        let handle = self.executor.start()?;
        let state = if self.context.check_for_focus() {
            ApplicationState::Awaiting
        } else {
            ApplicationState::Running
        };
        self.context.set_state(state);
        info!(target: "randomizer::bootstrap", %state, "Randomizer started");
        Ok(handle)
    }

    /// Stop the scheduler, release every held input and go back to `Idling`.
    pub fn stop(&self) {
        self.context.set_state(ApplicationState::Idling);
        self.executor.stop();
        self.executor.discard_all_running_actions();
        info!(target: "randomizer::bootstrap", "Randomizer stopped");
    }
}

fn executor_settings(config: &RandomizerConfig) -> ExecutorSettings {
    ExecutorSettings {
        interrupt_check_interval: Duration::from_millis(config.interrupt_check_interval_ms),
        focus_check_interval: Duration::from_millis(config.focus_check_interval_ms),
        min_wait: Duration::from_millis(config.min_wait_ms),
        max_wait: Duration::from_millis(config.max_wait_ms.max(config.min_wait_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeybindDef;
    use crate::input::AlwaysFocused;
    use crate::input::injector::testing::RecordingInjector;
    use crate::model::{MOUSE_MOVE_ACTION_NAME, PAUSE_ACTION_NAME};
    use crate::repository::MemorySequenceStore;

    #[test]
    fn registers_default_actions_before_keybinds() {
        let config = RandomizerConfig {
            keybinds: vec![KeybindDef {
                name: "Jump".to_string(),
                key: "SPACE".to_string(),
            }],
            ..RandomizerConfig::default()
        };
        let randomizer = Randomizer::new(
            config,
            Arc::new(MemorySequenceStore::new()),
            Arc::new(RecordingInjector::default()),
            Arc::new(AlwaysFocused),
        );

        let names: Vec<_> = randomizer
            .actions()
            .actions()
            .iter()
            .map(|(a, _)| a.name().to_string())
            .collect();
        assert_eq!(names, vec![PAUSE_ACTION_NAME, MOUSE_MOVE_ACTION_NAME, "Jump"]);
        assert_eq!(randomizer.context().state(), ApplicationState::Idling);
    }

    #[test]
    fn max_wait_never_below_min_wait() {
        let settings = executor_settings(&RandomizerConfig {
            min_wait_ms: 5000,
            max_wait_ms: 1000,
            ..RandomizerConfig::default()
        });
        assert_eq!(settings.max_wait, Duration::from_secs(5));
    }
}

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::random_range;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::interval::Interval;
use super::key::{ActionKey, InputCode, MouseButton};
use crate::error::Result;
use crate::executor::ApplicationContext;
use crate::input::{FocusCheck, InputInjector};

pub const PAUSE_ACTION_NAME: &str = "Pause";
pub const MOUSE_MOVE_ACTION_NAME: &str = "Mouse move";

/// What an action does when it starts and ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Hold a keyboard key for the drawn delay. Payload is the canonical key name.
    KeyPress(String),
    /// Hold a mouse button for the drawn delay.
    MousePress(MouseButton),
    /// Scroll the wheel by the given notches, then wait.
    MouseWheel(i32),
    /// Move the pointer by a random delta, then wait.
    MouseMove,
    /// Only wait.
    Pause,
}

impl ActionKind {
    /// Derive the kind from a key. Key-less or unresolvable keys become [`ActionKind::Pause`].
    pub fn from_key(key: &ActionKey) -> Self {
        match key.input_code() {
            Some(InputCode::Key(name)) => Self::KeyPress(name),
            Some(InputCode::Mouse(button)) => Self::MousePress(button),
            Some(InputCode::Wheel(notches)) => Self::MouseWheel(notches),
            None => Self::Pause,
        }
    }

    /// Input held between start and end, if any.
    pub fn input_code(&self) -> Option<InputCode> {
        match self {
            Self::KeyPress(name) => Some(InputCode::Key(name.clone())),
            Self::MousePress(button) => Some(InputCode::Mouse(*button)),
            Self::MouseWheel(notches) => Some(InputCode::Wheel(*notches)),
            Self::MouseMove | Self::Pause => None,
        }
    }
}

/// How one execution of an action ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Interrupted,
}

/// Observable lifecycle phase of an action.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionPhase {
    Idle,
    Executing,
    Completed,
    /// Soft-interrupted with wait time left; can be resumed for the remainder.
    Paused,
    Interrupted,
}

/// Tuning knobs actions read while executing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActionSettings {
    pub interrupt_check_interval: Duration,
    pub max_mouse_move_distance: u32,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            interrupt_check_interval: Duration::from_millis(50),
            max_mouse_move_distance: 5000,
        }
    }
}

/// Everything an action needs to run: injector, focus check, application context and settings.
#[derive(Clone)]
pub struct ActionEnv {
    pub injector: Arc<dyn InputInjector>,
    pub focus: Arc<dyn FocusCheck>,
    pub context: Arc<ApplicationContext>,
    pub settings: ActionSettings,
}

impl ActionEnv {
    pub fn new(
        injector: Arc<dyn InputInjector>,
        focus: Arc<dyn FocusCheck>,
        context: Arc<ApplicationContext>,
    ) -> Self {
        Self {
            injector,
            focus,
            context,
            settings: ActionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ActionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Focus checking is enabled and the target window does not hold focus.
    pub fn focus_lost(&self) -> bool {
        self.context.check_for_focus() && !self.focus.is_target_window_focused()
    }
}

/// A single simulated input with its own randomized timing.
///
/// Runtime flags are written by the scheduler and read by the hook delivery thread, so they are
/// atomics with acquire/release ordering. Cloning yields an identical definition with a fresh,
/// idle runtime state.
#[derive(Debug)]
pub struct Action {
    name: String,
    key: ActionKey,
    kind: ActionKind,
    interval: Mutex<Interval>,
    interrupted: AtomicBool,
    executing: AtomicBool,
    expected_ending: Mutex<Option<Instant>>,
    last_delay: AtomicI64,
    cancel: Mutex<CancellationToken>,
}

/// Marks an action as executing for as long as it lives.
pub(crate) struct Execution<'a> {
    action: &'a Action,
    token: CancellationToken,
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        self.action.executing.store(false, Ordering::Release);
        trace!(target: "randomizer::action", action = %self.action.name, "executing cleared");
    }
}

impl Action {
    /// Action bound to `key`; the kind is derived from the key.
    pub fn new(name: impl Into<String>, key: impl Into<ActionKey>) -> Self {
        let key = key.into();
        let kind = ActionKind::from_key(&key);
        Self::with_kind(name, key, kind)
    }

    pub fn with_kind(name: impl Into<String>, key: ActionKey, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            key,
            kind,
            interval: Mutex::new(Interval::default()),
            interrupted: AtomicBool::new(false),
            executing: AtomicBool::new(false),
            expected_ending: Mutex::new(None),
            last_delay: AtomicI64::new(-1),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// The built-in "Pause" action.
    pub fn pause() -> Self {
        Self::with_kind(PAUSE_ACTION_NAME, ActionKey::empty(), ActionKind::Pause)
    }

    /// The built-in "Mouse move" action.
    pub fn mouse_move() -> Self {
        Self::with_kind(MOUSE_MOVE_ACTION_NAME, ActionKey::empty(), ActionKind::MouseMove)
    }

    pub fn with_interval(self, interval: Interval) -> Self {
        *self.interval.lock() = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn interval(&self) -> Interval {
        *self.interval.lock()
    }

    pub fn set_interval(&self, interval: Interval) {
        *self.interval.lock() = interval;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub fn expected_ending(&self) -> Option<Instant> {
        *self.expected_ending.lock()
    }

    /// Delay drawn for the latest execution, if any.
    pub fn last_delay(&self) -> Option<u64> {
        u64::try_from(self.last_delay.load(Ordering::Acquire)).ok()
    }

    /// The expected ending is set and lies in the past.
    pub fn has_ended(&self) -> bool {
        self.expected_ending().is_some_and(|end| end < Instant::now())
    }

    /// Wait time left until the expected ending. Zero when unset or already past.
    pub fn remaining(&self) -> Duration {
        self.expected_ending()
            .map(|end| end.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    pub fn phase(&self) -> ActionPhase {
        if self.is_executing() {
            ActionPhase::Executing
        } else if self.is_interrupted() {
            if self.remaining().is_zero() {
                ActionPhase::Interrupted
            } else {
                ActionPhase::Paused
            }
        } else if self.has_ended() {
            ActionPhase::Completed
        } else {
            ActionPhase::Idle
        }
    }

    /// Draw a delay for the next execution. Empty intervals mean no delay.
    pub fn roll_delay(&self) -> u64 {
        let interval = self.interval();
        if interval.is_empty() { 0 } else { interval.sample() }
    }

    /// Run once with a freshly drawn delay.
    pub async fn execute(&self, env: &ActionEnv) -> Result<ActionOutcome> {
        let delay = self.roll_delay();
        self.execute_with_delay(env, delay).await
    }

    /// Press, wait `delay_ms` (interruptibly), release.
    pub async fn execute_with_delay(&self, env: &ActionEnv, delay_ms: u64) -> Result<ActionOutcome> {
        let execution = self.begin();
        self.run(env, delay_ms, &execution).await
    }

    /// Enter the executing state. Must happen before the action is published as running.
    pub(crate) fn begin(&self) -> Execution<'_> {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        *self.expected_ending.lock() = None;
        self.interrupted.store(false, Ordering::Release);
        self.executing.store(true, Ordering::Release);
        Execution {
            action: self,
            token,
        }
    }

    pub(crate) async fn run(
        &self,
        env: &ActionEnv,
        delay_ms: u64,
        execution: &Execution<'_>,
    ) -> Result<ActionOutcome> {
        self.last_delay
            .store(i64::try_from(delay_ms).unwrap_or(i64::MAX), Ordering::Release);
        debug!(target: "randomizer::action", action = %self.name, delay_ms, "executing");

        self.perform_start(env)?;

        if !self.interruptible_delay(env, delay_ms, &execution.token).await {
            info!(
                target: "randomizer::action",
                action = %self.name, key = %self.key,
                "Action interrupted, skipping action end"
            );
            return Ok(ActionOutcome::Interrupted);
        }

        self.perform_end(env)?;
        Ok(ActionOutcome::Completed)
    }

    /// Soft interruption: observed by the waiting loop, which then returns without releasing.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.executing.store(false, Ordering::Release);
        self.cancel.lock().cancel();
    }

    /// Hard interruption: interrupt and release the held input right away.
    pub fn instant_interrupt(&self, injector: &dyn InputInjector) {
        self.interrupt();
        if let Some(code) = self.kind.input_code() {
            if let Err(e) = injector.perform_end(&code) {
                error!(
                    target: "randomizer::action",
                    action = %self.name, error = %e,
                    "Failed to release input on instant interrupt"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_expected_ending(&self, at: Option<Instant>) {
        *self.expected_ending.lock() = at;
    }

    /// Back to a non-interrupted, non-executing state. The expected ending is kept.
    pub fn normalize(&self) {
        self.interrupted.store(false, Ordering::Release);
        self.executing.store(false, Ordering::Release);
    }

    async fn interruptible_delay(
        &self,
        env: &ActionEnv,
        delay_ms: u64,
        token: &CancellationToken,
    ) -> bool {
        if self.interval().is_empty() {
            return !self.is_interrupted();
        }

        let started = Instant::now();
        let deadline = started + Duration::from_millis(delay_ms);
        *self.expected_ending.lock() = Some(deadline);

        loop {
            if self.is_interrupted() || token.is_cancelled() {
                info!(target: "randomizer::action", action = %self.name, "Delay interrupted");
                return false;
            }
            if env.focus_lost() {
                info!(target: "randomizer::action", action = %self.name, "Focus lost, interrupting action");
                self.interrupt();
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let step = (deadline - now).min(env.settings.interrupt_check_interval);
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(step) => {}
            }
        }

        info!(
            target: "randomizer::action",
            action = %self.name,
            ran_ms = started.elapsed().as_millis() as u64,
            "action wait finished"
        );
        true
    }

    fn perform_start(&self, env: &ActionEnv) -> Result<()> {
        match &self.kind {
            ActionKind::MouseMove => {
                let max = i32::try_from(env.settings.max_mouse_move_distance).unwrap_or(i32::MAX);
                let dx = random_range(-max..=max);
                let dy = random_range(-max..=max);
                // Pointer errors never fail the action.
                if let Err(e) = env.injector.move_pointer(dx, dy) {
                    error!(target: "randomizer::action", dx, dy, error = %e, "Error during smooth mouse move");
                }
                Ok(())
            }
            ActionKind::Pause => Ok(()),
            kind => match kind.input_code() {
                Some(code) => env.injector.perform_start(&code),
                None => Ok(()),
            },
        }
    }

    fn perform_end(&self, env: &ActionEnv) -> Result<()> {
        match self.kind.input_code() {
            Some(code) => env.injector.perform_end(&code),
            None => Ok(()),
        }
    }
}

impl Clone for Action {
    fn clone(&self) -> Self {
        Self::with_kind(self.name.clone(), self.key.clone(), self.kind.clone())
            .with_interval(self.interval())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interval = self.interval();
        write!(
            f,
            "{} [{}] ({}-{} ms)",
            self.name,
            self.key,
            interval.min(),
            interval.max()
        )
    }
}

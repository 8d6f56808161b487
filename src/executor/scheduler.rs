//! Background scheduler.
//!
//! One dedicated thread runs a current-thread Tokio runtime and the scheduling loop:
//! 1. Wait a random inter-sequence delay, probing focus every `focus_check_interval`.
//! 2. When the delay elapsed (or a user release interrupted an action) and the application is
//!    running, either resume the paused sequence or pick a random active one and dispatch it.
//! 3. Re-roll the delay from `[min_wait, max_wait)` and loop.
//!
//! Hook callbacks, state listeners and `stop()` run on other threads. They only flip flags,
//! take short locks and cancel tokens.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::random_range;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::context::{ApplicationContext, ApplicationState};
use super::dispatcher::{ActionSequenceDispatcher, SequenceOutcome};
use crate::error::{RandomizerError, Result};
use crate::input::{FocusCheck, HookSink, InputInjector, ReleaseListener};
use crate::model::{Action, ActionKey, ActionSequence};
use crate::repository::ActionSequenceRepository;

/// Timing of the scheduling loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub interrupt_check_interval: Duration,
    pub focus_check_interval: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interrupt_check_interval: Duration::from_millis(50),
            focus_check_interval: Duration::from_millis(500),
            min_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Returned by [`ActionSequenceExecutor::start`].
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    thread: Thread,
}

impl ExecutorHandle {
    pub fn thread(&self) -> &Thread {
        &self.thread
    }
}

struct Shared {
    sequences: Arc<ActionSequenceRepository>,
    dispatcher: Arc<ActionSequenceDispatcher>,
    context: Arc<ApplicationContext>,
    focus: Arc<dyn FocusCheck>,
    injector: Arc<dyn InputInjector>,
    interrupt_check_interval: Duration,
    focus_check_interval: Duration,
    min_wait_ms: AtomicU64,
    max_wait_ms: AtomicU64,
    running: AtomicBool,
    released: AtomicBool,
    current: RwLock<Option<Arc<ActionSequence>>>,
    last_focus_check: Mutex<Option<Instant>>,
    cancel: Mutex<CancellationToken>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Picks, times and dispatches sequences on a background thread.
pub struct ActionSequenceExecutor {
    shared: Arc<Shared>,
}

impl ActionSequenceExecutor {
    /// Focus check, context and injector are taken from the dispatcher's environment.
    pub fn new(
        sequences: Arc<ActionSequenceRepository>,
        dispatcher: Arc<ActionSequenceDispatcher>,
        settings: ExecutorSettings,
    ) -> Self {
        let env = dispatcher.env().clone();
        let shared = Arc::new(Shared {
            sequences,
            context: env.context.clone(),
            focus: env.focus.clone(),
            injector: env.injector.clone(),
            dispatcher,
            interrupt_check_interval: settings.interrupt_check_interval.max(Duration::from_millis(1)),
            focus_check_interval: settings.focus_check_interval,
            min_wait_ms: AtomicU64::new(duration_ms(settings.min_wait)),
            max_wait_ms: AtomicU64::new(duration_ms(settings.max_wait)),
            running: AtomicBool::new(false),
            released: AtomicBool::new(false),
            current: RwLock::new(None),
            last_focus_check: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            thread: Mutex::new(None),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.context.on_state_changed(move |state| {
            if *state == ApplicationState::Running {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                shared.released.store(false, Ordering::Release);
                shared.interrupt_current("Application state change detected");
            }
        });

        Self { shared }
    }

    /// Spawn the scheduler thread.
    pub fn start(&self) -> Result<ExecutorHandle> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            warn!(target: "randomizer::executor", "Executor is already running");
            return Err(RandomizerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *self.shared.cancel.lock() = token.clone();
        self.shared.released.store(false, Ordering::Release);
        *self.shared.last_focus_check.lock() = None;

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("randomizer-executor".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(target: "randomizer::executor", error = %e, "Failed to build executor runtime");
                        shared.running.store(false, Ordering::Release);
                        return;
                    }
                };
                runtime.block_on(async {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = Scheduler::new(shared.clone()).run() => {}
                    }
                });
                debug!(target: "randomizer::executor", "Executor loop ended");
            });

        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(RandomizerError::Runtime(e.to_string()));
            }
        };
        let handle = ExecutorHandle {
            thread: join.thread().clone(),
        };
        *self.shared.thread.lock() = Some(join);
        info!(target: "randomizer::executor", "Executor thread started");
        Ok(handle)
    }

    /// Stop the scheduler promptly, even mid-wait, and hard-interrupt whatever is running.
    /// Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.cancel.lock().cancel();
        self.shared.interrupt_current("Executor stopped");

        let join = self.shared.thread.lock().take();
        if let Some(join) = join {
            if join.thread().id() == thread::current().id() {
                trace!(target: "randomizer::executor", "stop() called on the executor thread; not joining");
            } else if join.join().is_err() {
                error!(target: "randomizer::executor", "Executor thread panicked");
            }
        }

        // The loop may have picked a sequence between the first interrupt and its cancellation.
        self.shared.interrupt_current("Executor stopped");
        self.shared.dispatcher.discard_all_running_actions();
        self.shared.released.store(false, Ordering::Release);
        *self.shared.last_focus_check.lock() = None;
        info!(target: "randomizer::executor", "Executor thread stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Lower bound of the inter-sequence wait, in seconds.
    pub fn set_min_wait(&self, seconds: u64) {
        self.shared
            .min_wait_ms
            .store(seconds.saturating_mul(1000), Ordering::Release);
    }

    /// Upper bound of the inter-sequence wait, in seconds.
    pub fn set_max_wait(&self, seconds: u64) {
        self.shared
            .max_wait_ms
            .store(seconds.saturating_mul(1000), Ordering::Release);
    }

    pub fn discard_all_running_actions(&self) {
        self.shared.dispatcher.discard_all_running_actions();
    }

    pub fn current_sequence(&self) -> Option<Arc<ActionSequence>> {
        self.shared.current.read().clone()
    }

    pub fn state(&self) -> ApplicationState {
        self.shared.context.state()
    }

    pub fn context(&self) -> &Arc<ApplicationContext> {
        &self.shared.context
    }

    pub fn dispatcher(&self) -> &Arc<ActionSequenceDispatcher> {
        &self.shared.dispatcher
    }

    /// Sink to hand to input hook providers; key and mouse releases interrupt the executing
    /// action when they match its key.
    pub fn hook_sink(&self) -> HookSink {
        HookSink::new(self.shared.clone())
    }

    /// Drive `Running`/`Awaiting` transitions from the focus check (rate-limited).
    pub fn poll_focus(&self) {
        self.shared.handle_application_state();
    }
}

impl Drop for ActionSequenceExecutor {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl Shared {
    fn interrupt_current(&self, reason: &str) {
        let current = self.current.write().take();
        if let Some(sequence) = current {
            sequence.instant_interrupt(self.injector.as_ref());
            warn!(
                target: "randomizer::executor",
                sequence = %sequence.name(),
                "{reason}; action sequence and its actions have been interrupted"
            );
        }
    }

    fn handle_application_state(&self) {
        {
            let mut last = self.last_focus_check.lock();
            if last.is_some_and(|t| t.elapsed() < self.focus_check_interval) {
                return;
            }
            *last = Some(Instant::now());
        }

        let state = self.context.state();
        let check_for_focus = self.context.check_for_focus();

        if state == ApplicationState::Awaiting && !check_for_focus {
            self.context.set_state(ApplicationState::Idling);
            info!(target: "randomizer::executor", "Focus no longer required; state set to IDLING");
            return;
        }
        if !check_for_focus {
            return;
        }

        let focused = self.focus.is_target_window_focused();
        match state {
            ApplicationState::Awaiting if focused => {
                self.context.set_state(ApplicationState::Running);
            }
            ApplicationState::Running if !focused => {
                self.interrupt_current("Focus lost");
                self.context.set_state(ApplicationState::Awaiting);
            }
            _ => {}
        }
    }

    fn process_release(&self, input: &str, matches: impl Fn(&ActionKey) -> bool) {
        let Some(sequence) = self.current.read().clone() else {
            return;
        };
        if !sequence.is_active() {
            return;
        }
        // An action whose expected ending has passed is finishing on its own; matching it would
        // make the action interrupt itself with its own release.
        let executing = sequence
            .actions()
            .iter()
            .find(|a| !a.is_interrupted() && a.is_executing() && !a.has_ended());
        let Some(action) = executing else {
            return;
        };
        if matches(action.key()) {
            self.released.store(true, Ordering::Release);
            action.interrupt();
            info!(
                target: "randomizer::executor",
                %input, action = %action.name(),
                "Interruption detected"
            );
        }
    }
}

impl ReleaseListener for Shared {
    fn on_key_released(&self, key: &str) {
        self.process_release(key, |k| k.matches_key(key));
    }

    fn on_mouse_released(&self, button: u8) {
        self.process_release(&format!("MOUSE{button}"), |k| k.matches_mouse_button(button));
    }
}

/// Loop-local state of the scheduler thread.
struct Scheduler {
    shared: Arc<Shared>,
    last_cycle: Instant,
    wait: Duration,
    paused: Option<Arc<ActionSequence>>,
}

impl Scheduler {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            last_cycle: Instant::now(),
            wait: Duration::ZERO,
            paused: None,
        }
    }

    async fn run(mut self) {
        info!(target: "randomizer::executor", "Executor loop started");
        self.shared.handle_application_state();

        loop {
            let released = self.shared.released.load(Ordering::Acquire);
            if !released && self.last_cycle.elapsed() < self.wait {
                self.shared.handle_application_state();
                tokio::time::sleep(self.shared.interrupt_check_interval).await;
                continue;
            }

            let dispatched = if self.shared.context.is_running() && self.has_sequences() {
                if self.process_paused_sequence().await {
                    continue;
                }
                self.choose_and_dispatch_random_sequence().await
            } else {
                if released {
                    self.shared.released.store(false, Ordering::Release);
                    self.paused = None;
                }
                false
            };
            self.update_wait_time();
            if !dispatched {
                tokio::time::sleep(self.shared.interrupt_check_interval).await;
            }
        }
    }

    fn has_sequences(&self) -> bool {
        if let Err(e) = self.shared.sequences.update_cache() {
            error!(target: "randomizer::executor", error = %e, "Failed to refresh sequence cache");
        }
        !self.shared.sequences.sequences().is_empty()
    }

    /// Handle a pending user release. Returns `true` when the loop should start over without
    /// picking a new sequence.
    async fn process_paused_sequence(&mut self) -> bool {
        if !self.shared.released.swap(false, Ordering::AcqRel) {
            return false;
        }
        let Some(sequence) = self.paused.take() else {
            return true;
        };
        if !sequence.is_active() || sequence.is_interrupted() {
            info!(target: "randomizer::executor", sequence = %sequence.name(), "Paused sequence can no longer be resumed");
            return true;
        }

        if let Some((index, action)) = find_resumable(&sequence) {
            action.normalize();
            let remaining = action.remaining();
            if !remaining.is_zero() && self.shared.running.load(Ordering::Acquire) {
                debug!(
                    target: "randomizer::executor",
                    action = %action.name(),
                    remaining_ms = remaining.as_millis() as u64,
                    "Continuing action (redispatched)"
                );
                *self.shared.current.write() = Some(sequence.clone());
                let result = self
                    .shared
                    .dispatcher
                    .resume_sequence(sequence.clone(), index, remaining)
                    .await;
                self.after_dispatch(&sequence, result);
                return true;
            }
        }

        let elapsed = self.last_cycle.elapsed();
        if elapsed < self.wait {
            trace!(
                target: "randomizer::executor",
                remaining_ms = (self.wait - elapsed).as_millis() as u64,
                "Nothing to resume; restarting cool-down"
            );
            self.last_cycle = Instant::now();
            return true;
        }
        false
    }

    /// Returns whether a sequence was handed to the dispatcher.
    async fn choose_and_dispatch_random_sequence(&mut self) -> bool {
        self.paused = None;
        if !self.shared.running.load(Ordering::Acquire) {
            return false;
        }
        self.shared.dispatcher.discard_all_running_actions();

        let sequences = self.shared.sequences.active_sequences();
        if sequences.is_empty() {
            warn!(target: "randomizer::executor", "No active ActionSequences found.");
            return false;
        }
        let sequence = sequences[random_range(0..sequences.len())].clone();
        sequence.reset_interrupted();

        *self.shared.current.write() = Some(sequence.clone());
        let result = self
            .shared
            .dispatcher
            .dispatch_sequence(sequence.clone())
            .await;
        self.after_dispatch(&sequence, result);
        true
    }

    fn after_dispatch(
        &mut self,
        sequence: &Arc<ActionSequence>,
        result: anyhow::Result<SequenceOutcome>,
    ) {
        match result {
            Ok(SequenceOutcome::Finished) => {
                info!(target: "randomizer::executor", sequence = %sequence.name(), "Sequence was successfully dispatched");
            }
            Ok(SequenceOutcome::Interrupted) => {
                info!(target: "randomizer::executor", sequence = %sequence.name(), "Sequence was interrupted during dispatch");
                if self.shared.released.load(Ordering::Acquire) {
                    self.paused = Some(sequence.clone());
                }
            }
            Ok(SequenceOutcome::Rejected) => {
                debug!(target: "randomizer::executor", sequence = %sequence.name(), "Sequence was not dispatched");
            }
            Err(e) => {
                error!(target: "randomizer::executor", sequence = %sequence.name(), error = %format!("{e:#}"), "Error dispatching sequence");
                sequence.instant_interrupt(self.shared.injector.as_ref());
                self.shared.dispatcher.discard_all_running_actions();
            }
        }
        *self.shared.current.write() = None;
    }

    fn update_wait_time(&mut self) {
        let min = self.shared.min_wait_ms.load(Ordering::Acquire);
        let max = self.shared.max_wait_ms.load(Ordering::Acquire);
        let wait_ms = if max > min { random_range(min..max) } else { min };
        self.wait = Duration::from_millis(wait_ms);
        self.last_cycle = Instant::now();
        trace!(target: "randomizer::executor", wait_ms, "Next sequence wait rolled");
    }
}

/// First action that was soft-interrupted with wait time left.
fn find_resumable(sequence: &ActionSequence) -> Option<(usize, Arc<Action>)> {
    sequence
        .actions()
        .iter()
        .enumerate()
        .find(|(_, a)| {
            a.is_interrupted()
                && !a.is_executing()
                && !a.interval().is_empty()
                && !a.remaining().is_zero()
        })
        .map(|(i, a)| (i, a.clone()))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SharedFocus;
    use crate::input::injector::testing::RecordingInjector;
    use crate::model::{ActionEnv, ActionSettings, Interval};
    use crate::repository::MemorySequenceStore;

    fn executor(focus: Arc<SharedFocus>, check_for_focus: bool) -> ActionSequenceExecutor {
        let context = Arc::new(ApplicationContext::new(check_for_focus));
        let env = ActionEnv::new(Arc::new(RecordingInjector::default()), focus, context)
            .with_settings(ActionSettings {
                interrupt_check_interval: Duration::from_millis(5),
                ..ActionSettings::default()
            });
        let dispatcher = Arc::new(ActionSequenceDispatcher::new(env, None));
        let sequences = Arc::new(ActionSequenceRepository::new(Arc::new(
            MemorySequenceStore::new(),
        )));
        ActionSequenceExecutor::new(
            sequences,
            dispatcher,
            ExecutorSettings {
                interrupt_check_interval: Duration::from_millis(5),
                focus_check_interval: Duration::ZERO,
                min_wait: Duration::from_secs(60),
                max_wait: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn release_matches_only_the_executing_action() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        let seq = Arc::new(ActionSequence::new(
            "Walk",
            vec![
                Action::new("Forward", "W").with_interval(Interval::new(100, 200)),
                Action::new("Left", "A").with_interval(Interval::new(100, 200)),
            ],
        ));
        *exec.shared.current.write() = Some(seq.clone());
        let forward = seq.actions()[0].clone();
        let _execution = forward.begin();

        let sink = exec.hook_sink();
        sink.key_released("A");
        assert!(!forward.is_interrupted());
        sink.key_released("w");
        assert!(forward.is_interrupted());
        assert!(exec.shared.released.load(Ordering::Acquire));
    }

    #[test]
    fn ended_actions_never_interrupt_themselves() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        let seq = Arc::new(ActionSequence::new(
            "Shoot",
            vec![Action::new("Fire", "MOUSE1").with_interval(Interval::new(100, 200))],
        ));
        *exec.shared.current.write() = Some(seq.clone());
        let fire = seq.actions()[0].clone();
        let _execution = fire.begin();
        fire.set_expected_ending(Some(Instant::now() - Duration::from_millis(5)));

        exec.hook_sink().mouse_released(1);
        assert!(!fire.is_interrupted());
        assert!(!exec.shared.released.load(Ordering::Acquire));
    }

    #[test]
    fn awaiting_without_focus_check_falls_back_to_idling() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        exec.context().set_state(ApplicationState::Awaiting);
        exec.poll_focus();
        assert_eq!(exec.state(), ApplicationState::Idling);
    }

    #[test]
    fn leaving_running_interrupts_current_sequence() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        let seq = Arc::new(ActionSequence::new("Walk", vec![Action::new("Forward", "W")]));
        exec.context().set_state(ApplicationState::Running);
        *exec.shared.current.write() = Some(seq.clone());

        exec.context().set_state(ApplicationState::Idling);
        assert!(seq.is_interrupted());
        assert!(exec.current_sequence().is_none());
    }

    #[tokio::test]
    async fn release_without_remaining_wait_restarts_the_cool_down() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        exec.context().set_state(ApplicationState::Running);
        exec.shared.running.store(true, Ordering::Release);
        let seq = Arc::new(ActionSequence::new(
            "Walk",
            vec![Action::new("Forward", "W").with_interval(Interval::new(100, 200))],
        ));
        // Interrupted before its wait started: nothing left to replay.
        seq.actions()[0].interrupt();

        let mut scheduler = Scheduler::new(exec.shared.clone());
        scheduler.wait = Duration::from_secs(60);
        scheduler.last_cycle = Instant::now() - Duration::from_secs(1);
        scheduler.paused = Some(seq.clone());
        exec.shared.released.store(true, Ordering::Release);

        assert!(scheduler.process_paused_sequence().await);
        assert!(scheduler.last_cycle.elapsed() < Duration::from_millis(500));
        assert!(!exec.shared.released.load(Ordering::Acquire));
        assert!(scheduler.paused.is_none());
        assert!(exec.current_sequence().is_none());
        assert!(exec.dispatcher().running_actions().is_empty());
        assert!(seq.actions()[0].last_delay().is_none());
    }

    #[tokio::test]
    async fn release_after_the_wait_elapsed_allows_a_new_pick() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        let seq = Arc::new(ActionSequence::new("Walk", vec![Action::new("Forward", "W")]));

        let mut scheduler = Scheduler::new(exec.shared.clone());
        scheduler.wait = Duration::from_millis(10);
        scheduler.last_cycle = Instant::now() - Duration::from_secs(1);
        scheduler.paused = Some(seq);
        exec.shared.released.store(true, Ordering::Release);

        assert!(!scheduler.process_paused_sequence().await);
    }

    #[test]
    fn wait_setters_take_seconds() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        exec.set_min_wait(2);
        exec.set_max_wait(3);
        let mut scheduler = Scheduler::new(exec.shared.clone());
        for _ in 0..50 {
            scheduler.update_wait_time();
            assert!(scheduler.wait >= Duration::from_secs(2), "{:?}", scheduler.wait);
            assert!(scheduler.wait < Duration::from_secs(3), "{:?}", scheduler.wait);
        }

        exec.set_max_wait(1);
        scheduler.update_wait_time();
        assert_eq!(scheduler.wait, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn no_pick_once_stopping() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        exec.context().set_state(ApplicationState::Running);
        exec.shared
            .sequences
            .add(ActionSequence::new("Walk", vec![Action::new("Forward", "W")]))
            .unwrap();
        assert_eq!(exec.shared.sequences.active_sequences().len(), 1);

        let mut scheduler = Scheduler::new(exec.shared.clone());
        assert!(!scheduler.choose_and_dispatch_random_sequence().await);
        assert!(exec.current_sequence().is_none());
        assert!(exec.dispatcher().current_sequence().is_none());
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let exec = executor(Arc::new(SharedFocus::new(true)), false);
        exec.stop();
        exec.stop();
        assert!(!exec.is_running());
    }
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::events::{Handler, call_all};

/// Coarse state of the automation as seen by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum ApplicationState {
    /// Stopped by the user; nothing is dispatched.
    #[default]
    Idling,
    /// Sequences are picked and dispatched.
    Running,
    /// Waiting for the target window to regain focus.
    Awaiting,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idling => "IDLING",
            Self::Running => "RUNNING",
            Self::Awaiting => "AWAITING",
        };
        f.write_str(s)
    }
}

/// Shared application state plus the focus-checking switch.
///
/// Listeners run on whichever thread changes the state, after the change is visible, and only
/// when the state actually changed.
#[derive(Default)]
pub struct ApplicationContext {
    state: Mutex<ApplicationState>,
    check_for_focus: AtomicBool,
    listeners: RwLock<Vec<Handler<ApplicationState>>>,
}

impl ApplicationContext {
    pub fn new(check_for_focus: bool) -> Self {
        Self {
            check_for_focus: AtomicBool::new(check_for_focus),
            ..Self::default()
        }
    }

    pub fn state(&self) -> ApplicationState {
        *self.state.lock()
    }

    /// Set the state. Returns whether it changed.
    pub fn set_state(&self, state: ApplicationState) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous == state {
            return false;
        }
        info!(target: "randomizer::context", from = %previous, to = %state, "Application state changed");
        call_all(&self.listeners.read(), &state);
        true
    }

    pub fn is_running(&self) -> bool {
        self.state() == ApplicationState::Running
    }

    pub fn check_for_focus(&self) -> bool {
        self.check_for_focus.load(Ordering::Acquire)
    }

    pub fn set_check_for_focus(&self, enabled: bool) {
        self.check_for_focus.store(enabled, Ordering::Release);
    }

    /// Register a listener invoked with the new state on every transition.
    pub fn on_state_changed(&self, handler: impl Fn(&ApplicationState) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_fire_only_on_change() {
        let ctx = ApplicationContext::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        ctx.on_state_changed(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(ctx.set_state(ApplicationState::Running));
        assert!(!ctx.set_state(ApplicationState::Running));
        assert!(ctx.set_state(ApplicationState::Awaiting));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.state(), ApplicationState::Awaiting);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let ctx = ApplicationContext::default();
        ctx.on_state_changed(|_| panic!("listener bug"));
        assert!(ctx.set_state(ApplicationState::Running));
        assert!(ctx.is_running());
    }

    #[test]
    fn focus_switch() {
        let ctx = ApplicationContext::new(true);
        assert!(ctx.check_for_focus());
        ctx.set_check_for_focus(false);
        assert!(!ctx.check_for_focus());
    }
}

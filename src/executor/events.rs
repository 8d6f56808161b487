//! Lifecycle event handlers.
//!
//! Handlers run synchronously on the dispatching thread. A panicking handler is logged and
//! skipped; it never unwinds into the dispatcher. Hosts that need events on another thread
//! should forward them through a channel from inside the handler.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::model::{Action, ActionSequence};

pub(crate) type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

pub(crate) fn call_all<T>(handlers: &[Handler<T>], value: &T) {
    for handler in handlers {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(value))) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(target: "randomizer::events", %message, "Event handler panicked");
        }
    }
}

/// Registered lifecycle listeners of a dispatcher.
#[derive(Default)]
pub struct EventHandlers {
    action_started: RwLock<Vec<Handler<Arc<Action>>>>,
    action_finished: RwLock<Vec<Handler<Arc<Action>>>>,
    sequence_started: RwLock<Vec<Handler<Arc<ActionSequence>>>>,
    sequence_finished: RwLock<Vec<Handler<Arc<ActionSequence>>>>,
}

impl EventHandlers {
    pub fn on_action_started(&self, handler: impl Fn(&Arc<Action>) + Send + Sync + 'static) {
        self.action_started.write().push(Box::new(handler));
    }

    pub fn on_action_finished(&self, handler: impl Fn(&Arc<Action>) + Send + Sync + 'static) {
        self.action_finished.write().push(Box::new(handler));
    }

    pub fn on_sequence_started(
        &self,
        handler: impl Fn(&Arc<ActionSequence>) + Send + Sync + 'static,
    ) {
        self.sequence_started.write().push(Box::new(handler));
    }

    pub fn on_sequence_finished(
        &self,
        handler: impl Fn(&Arc<ActionSequence>) + Send + Sync + 'static,
    ) {
        self.sequence_finished.write().push(Box::new(handler));
    }

    pub(crate) fn action_started(&self, action: &Arc<Action>) {
        call_all(&self.action_started.read(), action);
    }

    pub(crate) fn action_finished(&self, action: &Arc<Action>) {
        call_all(&self.action_finished.read(), action);
    }

    pub(crate) fn sequence_started(&self, sequence: &Arc<ActionSequence>) {
        call_all(&self.sequence_started.read(), sequence);
    }

    pub(crate) fn sequence_finished(&self, sequence: &Arc<ActionSequence>) {
        call_all(&self.sequence_finished.read(), sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn panics_do_not_stop_later_handlers() {
        let handlers = EventHandlers::default();
        let seen = Arc::new(AtomicUsize::new(0));
        handlers.on_sequence_started(|_| panic!("first handler fails"));
        let s = seen.clone();
        handlers.on_sequence_started(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        handlers.sequence_started(&Arc::new(ActionSequence::new("s", Vec::new())));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

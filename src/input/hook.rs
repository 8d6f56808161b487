//! Native input hook boundary.
//!
//! A hook provider observes real user input on its own thread and reports key and mouse
//! releases. Releases are turned into interruption signals by whoever listens on the
//! [`HookSink`] (the sequence executor). Delivery is asynchronous and callbacks must return
//! quickly: listeners only flip flags, they never wait on the scheduler.
//!
//! Adding a new provider:
//! 1. Implement [`InputHook`] for your type.
//! 2. Call [`HookSink`] methods from the provider's delivery thread or task.
//! 3. Hand it to [`register_hooks`]; a failed registration only disables input-based
//!    interruption, the scheduler keeps running.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{error, info, trace};

use super::focus::SharedFocus;

/// One event reported by a hook provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookEvent {
    /// A keyboard key was released. `key` is the (possibly localized) key name.
    KeyReleased { key: String },
    /// A mouse button was released (1 = left, 2 = right, 3 = middle, 4/5 = side).
    MouseReleased { button: u8 },
    /// The target window gained or lost focus.
    Focus { focused: bool },
}

/// Receiver of release callbacks.
pub trait ReleaseListener: Send + Sync {
    fn on_key_released(&self, key: &str);
    fn on_mouse_released(&self, button: u8);
}

/// Cheap, cloneable handle hook providers report into.
#[derive(Clone)]
pub struct HookSink {
    listener: Arc<dyn ReleaseListener>,
    focus: Option<Arc<SharedFocus>>,
}

impl HookSink {
    pub fn new(listener: Arc<dyn ReleaseListener>) -> Self {
        Self {
            listener,
            focus: None,
        }
    }

    /// Route [`HookEvent::Focus`] events into a shared focus flag.
    pub fn with_focus(mut self, focus: Arc<SharedFocus>) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn key_released(&self, key: &str) {
        self.listener.on_key_released(key);
    }

    pub fn mouse_released(&self, button: u8) {
        self.listener.on_mouse_released(button);
    }

    pub fn deliver(&self, event: &HookEvent) {
        trace!(target: "randomizer::hook", ?event, "hook event");
        match event {
            HookEvent::KeyReleased { key } => self.key_released(key),
            HookEvent::MouseReleased { button } => self.mouse_released(*button),
            HookEvent::Focus { focused } => match &self.focus {
                Some(focus) => focus.set_focused(*focused),
                None => trace!(target: "randomizer::hook", "no focus flag attached; dropping focus event"),
            },
        }
    }
}

/// Trait implemented by all hook providers.
pub trait InputHook: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start delivering events into `sink`. Called once.
    fn register(&self, sink: HookSink) -> anyhow::Result<()>;
}

impl<T: InputHook + ?Sized> InputHook for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn register(&self, sink: HookSink) -> anyhow::Result<()> {
        (**self).register(sink)
    }
}

/// Register every hook, logging failures. Returns how many registrations succeeded.
pub fn register_hooks(hooks: &[Box<dyn InputHook>], sink: &HookSink) -> usize {
    hooks
        .iter()
        .filter(|hook| {
            info!(target: "randomizer::hook", hook = %hook.name(), "Registering input hook");
            match hook.register(sink.clone()) {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        target: "randomizer::hook",
                        hook = %hook.name(), error = %err,
                        "Hook registration failed; input-based interruption is disabled for it"
                    );
                    false
                }
            }
        })
        .count()
}

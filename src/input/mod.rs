//! Input boundary of the randomizer.
//!
//! Submodules:
//! - `injector`: synthesizes key, button, wheel and pointer input (Enigo, with dry-run).
//! - `focus`: checks whether the target window holds focus.
//! - `hook`: native hook boundary delivering key/mouse releases.
//! - `stdin_hook`: NDJSON hook bridge over standard input.

pub mod focus;
pub mod hook;
pub mod injector;
pub mod stdin_hook;

pub use focus::{AlwaysFocused, FocusCheck, SharedFocus, WindowTitleFocus};
pub use hook::{HookEvent, HookSink, InputHook, ReleaseListener, register_hooks};
pub use injector::{EnigoInjector, InputInjector, PointerSettings};
pub use stdin_hook::StdinHook;

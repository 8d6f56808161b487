//! Domain model: intervals, keys, actions and sequences.

pub mod action;
pub mod interval;
pub mod key;
pub mod sequence;

pub use action::{
    Action, ActionEnv, ActionKind, ActionOutcome, ActionPhase, ActionSettings,
    MOUSE_MOVE_ACTION_NAME, PAUSE_ACTION_NAME,
};
pub use interval::Interval;
pub use key::{ActionKey, ActionType, InputCode, MouseButton, canonical_key_name};
pub use sequence::{ActionSequence, DEFAULT_DESCRIPTION};

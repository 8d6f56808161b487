use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use tracing::warn;

use crate::model::{
    Action, ActionKey, ActionKind, ActionSequence, DEFAULT_DESCRIPTION, Interval,
};

/// Root configuration for the randomizer.
///
/// Deserialized from a JSON file; every field is optional and falls back to its default.
/// Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct RandomizerConfig {
    /// Poll granularity of interruptible waits (default: 50).
    #[validate(minimum = 1)]
    pub interrupt_check_interval_ms: u64,

    /// Minimum time between two focus checks of the scheduler (default: 500).
    pub focus_check_interval_ms: u64,

    /// Lower bound of the wait between two sequences (default: 30000).
    pub min_wait_ms: u64,

    /// Upper bound of the wait between two sequences (default: 120000).
    /// Clamped to `min_wait_ms` when smaller.
    pub max_wait_ms: u64,

    /// Number of intermediate steps of a smooth pointer move (default: 50).
    #[validate(minimum = 1)]
    pub mouse_move_steps: u32,

    /// Largest |dx| and |dy| of a random pointer move in pixels (default: 5000).
    #[validate(maximum = 100_000)]
    pub max_mouse_move_distance: u32,

    /// Sleep between two pointer move steps (default: 10).
    pub mouse_move_smooth_delay_ms: u64,

    /// Only run while the target window holds focus (default: false).
    pub check_for_focus: bool,

    /// Substring of the target window title (default: "Counter-Strike 2").
    #[validate(min_length = 1)]
    pub target_window_title: String,

    /// Key bindings registered as actions on startup.
    #[validate]
    pub keybinds: Vec<KeybindDef>,
}

impl Default for RandomizerConfig {
    fn default() -> Self {
        Self {
            interrupt_check_interval_ms: 50,
            focus_check_interval_ms: 500,
            min_wait_ms: 30_000,
            max_wait_ms: 120_000,
            mouse_move_steps: 50,
            max_mouse_move_distance: 5000,
            mouse_move_smooth_delay_ms: 10,
            check_for_focus: false,
            target_window_title: "Counter-Strike 2".to_string(),
            keybinds: Vec::new(),
        }
    }
}

/// A named key binding, e.g. `{ "name": "Jump", "key": "SPACE" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct KeybindDef {
    /// Action name shown to the user; unique among actions.
    #[validate(min_length = 1)]
    pub name: String,
    /// Logical key: a key name ("W", "CTRL"), "MOUSE1".."MOUSE5", "MWHEELUP" or "MWHEELDOWN".
    #[validate(min_length = 1)]
    pub key: String,
}

impl From<&KeybindDef> for Action {
    fn from(def: &KeybindDef) -> Self {
        Action::new(def.name.clone(), def.key.as_str())
    }
}

/// One persisted action sequence (one JSON file per sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceDef {
    pub name: String,

    #[serde(default = "default_description")]
    pub description: String,

    /// Inactive sequences are never picked by the scheduler (default: true).
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_active() -> bool {
    true
}

/// Persisted action definition.
/// Use `type` to select a variant:
/// - "bind": press a key or button for a random time
/// - "mouse_move": move the pointer by a random delta, then wait
/// - "pause": only wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDef {
    /// A key binding. The behaviour (keyboard, mouse button, wheel) follows from `key`.
    Bind {
        name: String,
        key: String,
        #[serde(default)]
        interval: Interval,
    },

    MouseMove {
        #[serde(default)]
        interval: Interval,
    },

    Pause {
        #[serde(default)]
        interval: Interval,
    },
}

impl From<&ActionDef> for Action {
    fn from(def: &ActionDef) -> Self {
        // Files can hold min > max; re-clamp on the way in.
        let clamp = |i: &Interval| Interval::new(i.min(), i.max());
        match def {
            ActionDef::Bind {
                name,
                key,
                interval,
            } => {
                let action = Action::new(name.clone(), key.as_str());
                if matches!(action.kind(), ActionKind::Pause) {
                    warn!(
                        target: "randomizer::config",
                        action = %name, %key,
                        "Key does not map to any input; action will only wait"
                    );
                }
                action.with_interval(clamp(interval))
            }
            ActionDef::MouseMove { interval } => Action::mouse_move().with_interval(clamp(interval)),
            ActionDef::Pause { interval } => Action::pause().with_interval(clamp(interval)),
        }
    }
}

impl From<&Action> for ActionDef {
    fn from(action: &Action) -> Self {
        let interval = action.interval();
        match action.kind() {
            ActionKind::MouseMove => ActionDef::MouseMove { interval },
            ActionKind::Pause if action.key() == &ActionKey::empty() => {
                ActionDef::Pause { interval }
            }
            _ => ActionDef::Bind {
                name: action.name().to_string(),
                key: action.key().to_string(),
                interval,
            },
        }
    }
}

impl From<&SequenceDef> for ActionSequence {
    fn from(def: &SequenceDef) -> Self {
        ActionSequence::new(def.name.clone(), def.actions.iter().map(Action::from).collect())
            .with_description(def.description.clone())
            .with_active(def.active)
    }
}

impl From<&ActionSequence> for SequenceDef {
    fn from(sequence: &ActionSequence) -> Self {
        SequenceDef {
            name: sequence.name().to_string(),
            description: sequence.description().to_string(),
            active: sequence.is_active(),
            actions: sequence
                .actions()
                .iter()
                .map(|a| ActionDef::from(a.as_ref()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_def_converts_both_ways() {
        let json = r#"{
            "name": "Peek",
            "actions": [
                { "type": "bind", "name": "Left", "key": "A", "interval": { "min": 100, "max": 200 } },
                { "type": "pause", "interval": { "min": 50, "max": 10 } },
                { "type": "mouse_move" }
            ]
        }"#;
        let def: SequenceDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.description, DEFAULT_DESCRIPTION);
        assert!(def.active);

        let seq = ActionSequence::from(&def);
        assert_eq!(seq.actions().len(), 3);
        assert_eq!(seq.actions()[0].kind(), &ActionKind::KeyPress("A".into()));
        assert_eq!(seq.actions()[1].interval(), Interval::new(50, 51));
        assert!(seq.actions()[2].interval().is_empty());

        let back = SequenceDef::from(&seq);
        assert_eq!(back.name, "Peek");
        assert!(matches!(back.actions[1], ActionDef::Pause { .. }));
        assert!(matches!(back.actions[2], ActionDef::MouseMove { .. }));
    }
}

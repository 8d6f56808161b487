use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logical input identifier of an action, e.g. `"CTRL"`, `"W"`, `"MOUSE1"`, `"MWHEELUP"`.
/// Empty for actions that do not touch a key (pause, pointer move).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ActionKey(String);

/// Category derived once from an [`ActionKey`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Mouse,
    MouseWheel,
    Keyboard,
    Custom,
}

/// Mouse buttons addressable as `MOUSE1`..`MOUSE5`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    /// Map a hook button number (1 = left, 2 = right, 3 = middle, 4/5 = side buttons).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Left),
            2 => Some(Self::Right),
            3 => Some(Self::Middle),
            4 => Some(Self::Back),
            5 => Some(Self::Forward),
            _ => None,
        }
    }
}

/// Resolved injector input for a key-bearing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCode {
    /// Canonical upper-case key name, e.g. `"SPACE"` or `"W"`.
    Key(String),
    Mouse(MouseButton),
    /// Wheel notches; negative scrolls up.
    Wheel(i32),
}

impl fmt::Display for InputCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Mouse(b) => write!(f, "{b:?}"),
            Self::Wheel(n) => write!(f, "wheel({n})"),
        }
    }
}

impl ActionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn action_type(&self) -> ActionType {
        let upper = self.0.trim().to_ascii_uppercase();
        if upper.starts_with("MOUSE") {
            ActionType::Mouse
        } else if upper.starts_with("MWHEEL") {
            ActionType::MouseWheel
        } else if !upper.is_empty() {
            ActionType::Keyboard
        } else {
            ActionType::Custom
        }
    }

    /// The injector input this key stands for. `None` for custom (key-less) actions.
    pub fn input_code(&self) -> Option<InputCode> {
        let upper = self.0.trim().to_ascii_uppercase();
        match self.action_type() {
            ActionType::Mouse => upper
                .strip_prefix("MOUSE")
                .and_then(|n| n.parse::<u8>().ok())
                .and_then(MouseButton::from_number)
                .map(InputCode::Mouse),
            ActionType::MouseWheel => match upper.as_str() {
                "MWHEELUP" => Some(InputCode::Wheel(-1)),
                "MWHEELDOWN" => Some(InputCode::Wheel(1)),
                _ => None,
            },
            ActionType::Keyboard => Some(InputCode::Key(canonical_key_name(&upper))),
            ActionType::Custom => None,
        }
    }

    /// Whether a released keyboard key (as reported by a native hook) is this key.
    ///
    /// Case-insensitive. Hooks report modifier names in the machine's locale ("Strg",
    /// "Umschalt", ...), so both sides go through [`canonical_key_name`] first.
    pub fn matches_key(&self, released: &str) -> bool {
        if self.action_type() != ActionType::Keyboard {
            return false;
        }
        let ours = canonical_key_name(self.0.trim());
        let theirs = canonical_key_name(released.trim());
        !theirs.is_empty() && ours.eq_ignore_ascii_case(&theirs)
    }

    /// Whether a released mouse button number is this key (`MOUSE<n>`).
    pub fn matches_mouse_button(&self, button: u8) -> bool {
        self.0.trim().eq_ignore_ascii_case(&format!("MOUSE{button}"))
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Upper-case a key name and fold locale-specific modifier names onto `CTRL`, `ALT`, `SHIFT`.
pub fn canonical_key_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "ctrl" | "control" | "strg" | "ctl" | "lctrl" | "rctrl" | "left control"
        | "right control" | "controle" | "contrôle" => "CTRL",
        "alt" | "option" | "lalt" | "ralt" | "left alt" | "right alt" => "ALT",
        "shift" | "umschalt" | "maj" | "majuscule" | "mayús" | "mayus" | "lshift" | "rshift"
        | "left shift" | "right shift" => "SHIFT",
        "leertaste" | "espace" | "spacebar" => "SPACE",
        "eingabe" | "return" => "ENTER",
        "esc" => "ESCAPE",
        _ => return lower.to_uppercase(),
    };
    canonical.to_string()
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use enigo::Keyboard as _;
use enigo::Mouse as _;
use enigo::{Axis, Button as EButton, Coordinate, Direction, Enigo, Key, Settings};
use parking_lot::Mutex;
use tracing::{info, trace};

use crate::error::{RandomizerError, Result};
use crate::model::{InputCode, MouseButton};

/// Synthesizes the inputs an action stands for.
///
/// Calls are synchronous and expected to return quickly. `perform_end` must be safe to call
/// for an input that is not currently held.
pub trait InputInjector: Send + Sync {
    /// Press a key or button, or scroll the wheel.
    fn perform_start(&self, input: &InputCode) -> Result<()>;

    /// Release a key or button. Wheel input has no end.
    fn perform_end(&self, input: &InputCode) -> Result<()>;

    /// Move the pointer relative to its current position.
    fn move_pointer(&self, dx: i32, dy: i32) -> Result<()>;
}

/// Smooth pointer movement parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PointerSettings {
    pub steps: u32,
    pub step_delay: Duration,
}

impl Default for PointerSettings {
    fn default() -> Self {
        Self {
            steps: 50,
            step_delay: Duration::from_millis(10),
        }
    }
}

/// Injector backed by Enigo, with an optional dry-run mode.
/// In dry-run mode inputs are only logged and nothing is simulated.
pub struct EnigoInjector {
    dry_run: AtomicBool,
    pointer: PointerSettings,
    enigo: Mutex<Option<Enigo>>,
}

impl EnigoInjector {
    /// Create a new injector. Enigo itself is initialized on first use.
    pub fn new(dry_run: bool, pointer: PointerSettings) -> Self {
        Self {
            dry_run: AtomicBool::new(dry_run),
            pointer,
            enigo: Mutex::new(None),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }

    /// Enable or disable dry-run mode dynamically.
    pub fn set_dry_run(&self, dry_run: bool) {
        self.dry_run.store(dry_run, Ordering::Relaxed);
    }

    fn with_enigo<T>(&self, f: impl FnOnce(&mut Enigo) -> Result<T>) -> Result<T> {
        let mut guard = self.enigo.lock();
        if guard.is_none() {
            trace!(target: "randomizer::input", "Initializing Enigo");
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| RandomizerError::injector("enigo", e.to_string()))?;
            *guard = Some(enigo);
        }
        match guard.as_mut() {
            Some(enigo) => f(enigo),
            None => Err(RandomizerError::injector("enigo", "not initialized")),
        }
    }

    fn smooth_move(&self, enigo: &mut Enigo, dx: i32, dy: i32) -> Result<()> {
        let fail = |e: enigo::InputError| RandomizerError::injector("pointer", e.to_string());
        let (start_x, start_y) = enigo.location().map_err(fail)?;
        let (width, height) = enigo.main_display().map_err(fail)?;
        let end_x = clamp_target(start_x, dx, width);
        let end_y = clamp_target(start_y, dy, height);
        trace!(
            target: "randomizer::input",
            start_x, start_y, end_x, end_y,
            "smooth pointer move"
        );

        let steps = self.pointer.steps.max(1);
        let step_x = (f64::from(end_x) - f64::from(start_x)) / f64::from(steps);
        let step_y = (f64::from(end_y) - f64::from(start_y)) / f64::from(steps);
        for step in 1..=steps {
            let x = (f64::from(start_x) + step_x * f64::from(step)).round() as i32;
            let y = (f64::from(start_y) + step_y * f64::from(step)).round() as i32;
            enigo.move_mouse(x, y, Coordinate::Abs).map_err(fail)?;
            thread::sleep(self.pointer.step_delay);
        }
        enigo.move_mouse(end_x, end_y, Coordinate::Abs).map_err(fail)?;
        Ok(())
    }
}

impl InputInjector for EnigoInjector {
    fn perform_start(&self, input: &InputCode) -> Result<()> {
        if self.is_dry_run() {
            info!(target: "randomizer::input", %input, "DRY-RUN perform_start");
            return Ok(());
        }
        trace!(target: "randomizer::input", %input, "perform_start");
        let fail = |e: enigo::InputError| RandomizerError::injector(input.to_string(), e.to_string());
        match input {
            InputCode::Key(name) => {
                let key = map_key(name)?;
                self.with_enigo(|enigo| enigo.key(key, Direction::Press).map_err(fail))
            }
            InputCode::Mouse(button) => {
                let button = map_mouse_button(*button)?;
                self.with_enigo(|enigo| enigo.button(button, Direction::Press).map_err(fail))
            }
            InputCode::Wheel(notches) => {
                let notches = *notches;
                self.with_enigo(|enigo| enigo.scroll(notches, Axis::Vertical).map_err(fail))
            }
        }
    }

    fn perform_end(&self, input: &InputCode) -> Result<()> {
        if self.is_dry_run() {
            info!(target: "randomizer::input", %input, "DRY-RUN perform_end");
            return Ok(());
        }
        trace!(target: "randomizer::input", %input, "perform_end");
        let fail = |e: enigo::InputError| RandomizerError::injector(input.to_string(), e.to_string());
        match input {
            InputCode::Key(name) => {
                let key = map_key(name)?;
                self.with_enigo(|enigo| enigo.key(key, Direction::Release).map_err(fail))
            }
            InputCode::Mouse(button) => {
                let button = map_mouse_button(*button)?;
                self.with_enigo(|enigo| enigo.button(button, Direction::Release).map_err(fail))
            }
            InputCode::Wheel(_) => Ok(()),
        }
    }

    fn move_pointer(&self, dx: i32, dy: i32) -> Result<()> {
        if self.is_dry_run() {
            info!(target: "randomizer::input", dx, dy, "DRY-RUN move_pointer");
            return Ok(());
        }
        self.with_enigo(|enigo| self.smooth_move(enigo, dx, dy))
    }
}

/// Map a canonical key name onto an Enigo key.
pub(crate) fn map_key(name: &str) -> Result<Key> {
    let key = match name {
        "SPACE" => Key::Space,
        "CTRL" => Key::Control,
        "SHIFT" => Key::Shift,
        "ALT" => Key::Alt,
        "TAB" => Key::Tab,
        "ENTER" => Key::Return,
        "ESCAPE" => Key::Escape,
        "BACKSPACE" => Key::Backspace,
        "DEL" | "DELETE" => Key::Delete,
        "HOME" => Key::Home,
        "END" => Key::End,
        "PGUP" | "PAGEUP" => Key::PageUp,
        "PGDN" | "PAGEDOWN" => Key::PageDown,
        "CAPSLOCK" => Key::CapsLock,
        "UP" | "UPARROW" => Key::UpArrow,
        "DOWN" | "DOWNARROW" => Key::DownArrow,
        "LEFT" | "LEFTARROW" => Key::LeftArrow,
        "RIGHT" | "RIGHTARROW" => Key::RightArrow,
        "F1" => Key::F1,
        "F2" => Key::F2,
        "F3" => Key::F3,
        "F4" => Key::F4,
        "F5" => Key::F5,
        "F6" => Key::F6,
        "F7" => Key::F7,
        "F8" => Key::F8,
        "F9" => Key::F9,
        "F10" => Key::F10,
        "F11" => Key::F11,
        "F12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c.to_ascii_lowercase()),
                _ => return Err(RandomizerError::invalid_key(other, "unsupported key name")),
            }
        }
    };
    Ok(key)
}

/// `start + delta`, kept inside `[0, extent)` without overflowing.
fn clamp_target(start: i32, delta: i32, extent: i32) -> i32 {
    start.saturating_add(delta).clamp(0, extent.saturating_sub(1).max(0))
}

fn map_mouse_button(button: MouseButton) -> Result<EButton> {
    match button {
        MouseButton::Left => Ok(EButton::Left),
        MouseButton::Right => Ok(EButton::Right),
        MouseButton::Middle => Ok(EButton::Middle),
        #[cfg(not(target_os = "macos"))]
        MouseButton::Back => Ok(EButton::Back),
        #[cfg(not(target_os = "macos"))]
        MouseButton::Forward => Ok(EButton::Forward),
        #[cfg(target_os = "macos")]
        MouseButton::Back | MouseButton::Forward => Err(RandomizerError::invalid_key(
            format!("{button:?}"),
            "side buttons are not supported on this platform",
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// One injected input, as seen by [`RecordingInjector`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Injected {
        Start(InputCode),
        End(InputCode),
        Move(i32, i32),
    }

    /// Injector that records calls instead of touching the OS.
    #[derive(Default)]
    pub struct RecordingInjector {
        pub calls: Mutex<Vec<Injected>>,
        pub fail_end: AtomicBool,
    }

    impl RecordingInjector {
        pub fn calls(&self) -> Vec<Injected> {
            self.calls.lock().clone()
        }
    }

    impl InputInjector for RecordingInjector {
        fn perform_start(&self, input: &InputCode) -> Result<()> {
            self.calls.lock().push(Injected::Start(input.clone()));
            Ok(())
        }

        fn perform_end(&self, input: &InputCode) -> Result<()> {
            if self.fail_end.load(Ordering::Relaxed) {
                return Err(RandomizerError::injector(input.to_string(), "boom"));
            }
            self.calls.lock().push(Injected::End(input.clone()));
            Ok(())
        }

        fn move_pointer(&self, dx: i32, dy: i32) -> Result<()> {
            self.calls.lock().push(Injected::Move(dx, dy));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_named_and_single_char_keys() {
        assert_eq!(map_key("SPACE").unwrap(), Key::Space);
        assert_eq!(map_key("CTRL").unwrap(), Key::Control);
        assert_eq!(map_key("W").unwrap(), Key::Unicode('w'));
        assert_eq!(map_key("1").unwrap(), Key::Unicode('1'));
        assert!(matches!(
            map_key("HYPER"),
            Err(RandomizerError::InvalidKey { .. })
        ));
    }

    #[test]
    fn pointer_targets_stay_on_screen() {
        assert_eq!(clamp_target(100, 50, 1920), 150);
        assert_eq!(clamp_target(100, -500, 1920), 0);
        assert_eq!(clamp_target(1900, i32::MAX, 1920), 1919);
        assert_eq!(clamp_target(-5, i32::MIN, 1920), 0);
        assert_eq!(clamp_target(10, 10, 0), 0);
    }

    #[test]
    fn dry_run_never_touches_enigo() {
        let injector = EnigoInjector::new(true, PointerSettings::default());
        injector.perform_start(&InputCode::Key("W".into())).unwrap();
        injector.perform_end(&InputCode::Key("W".into())).unwrap();
        injector.move_pointer(10, -10).unwrap();
        assert!(injector.enigo.lock().is_none());
    }
}

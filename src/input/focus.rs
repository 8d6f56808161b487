use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

/// Answers whether the target application window currently holds OS input focus.
/// Polled from the scheduler thread and from running actions; must never block.
pub trait FocusCheck: Send + Sync {
    fn is_target_window_focused(&self) -> bool;
}

/// Focus check for setups that do not track focus.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFocused;

impl FocusCheck for AlwaysFocused {
    fn is_target_window_focused(&self) -> bool {
        true
    }
}

/// Focus flag pushed from outside, e.g. by a hook bridge that watches the foreground window.
#[derive(Debug)]
pub struct SharedFocus {
    focused: AtomicBool,
}

impl SharedFocus {
    pub fn new(focused: bool) -> Self {
        Self {
            focused: AtomicBool::new(focused),
        }
    }

    pub fn set_focused(&self, focused: bool) {
        let previous = self.focused.swap(focused, Ordering::AcqRel);
        if previous != focused {
            debug!(target: "randomizer::focus", focused, "focus flag changed");
        }
    }
}

impl Default for SharedFocus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FocusCheck for SharedFocus {
    fn is_target_window_focused(&self) -> bool {
        self.focused.load(Ordering::Acquire)
    }
}

/// Checks whether the foreground window's title contains a substring.
///
/// On Windows the title comes from `GetForegroundWindow`/`GetWindowTextW`. Other platforms have
/// no lookup: the check reports "not focused" and warns once. Feed focus through
/// [`SharedFocus`] (for instance via the stdin hook bridge) there.
#[derive(Debug)]
pub struct WindowTitleFocus {
    title_contains: String,
    warned: AtomicBool,
}

impl WindowTitleFocus {
    pub fn new(title_contains: impl Into<String>) -> Self {
        Self {
            title_contains: title_contains.into(),
            warned: AtomicBool::new(false),
        }
    }

    pub fn title_contains(&self) -> &str {
        &self.title_contains
    }

    /// Whether `title` belongs to the target window.
    pub fn matches_title(&self, title: &str) -> bool {
        !self.title_contains.is_empty() && title.contains(&self.title_contains)
    }
}

impl FocusCheck for WindowTitleFocus {
    fn is_target_window_focused(&self) -> bool {
        if !FOREGROUND_LOOKUP_SUPPORTED {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!(
                    target: "randomizer::focus",
                    title_contains = %self.title_contains,
                    "foreground window lookup is not supported on this platform; reporting unfocused"
                );
            }
            return false;
        }
        foreground_window_title().is_some_and(|title| self.matches_title(&title))
    }
}

const FOREGROUND_LOOKUP_SUPPORTED: bool = cfg!(windows);

#[cfg(windows)]
#[allow(unsafe_code)]
fn foreground_window_title() -> Option<String> {
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW};

    let mut buffer = [0u16; 512];
    // SAFETY: the window handle is only handed back to user32 and the buffer outlives the call.
    let len = unsafe { GetWindowTextW(GetForegroundWindow(), &mut buffer) };
    let len = usize::try_from(len).ok().filter(|&n| n > 0)?;
    Some(String::from_utf16_lossy(&buffer[..len.min(buffer.len())]))
}

#[cfg(not(windows))]
fn foreground_window_title() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_focus_toggles() {
        let focus = SharedFocus::new(false);
        assert!(!focus.is_target_window_focused());
        focus.set_focused(true);
        assert!(focus.is_target_window_focused());
    }

    #[test]
    fn window_title_focus_matches_substring() {
        let focus = WindowTitleFocus::new("Counter-Strike 2");
        assert_eq!(focus.title_contains(), "Counter-Strike 2");
        assert!(focus.matches_title("Counter-Strike 2 - Direct3D 11"));
        assert!(!focus.matches_title("counter-strike 2"));
        assert!(!focus.matches_title("Notepad"));
        assert!(!WindowTitleFocus::new("").matches_title("Notepad"));
        assert!(AlwaysFocused.is_target_window_focused());
    }

    #[cfg(not(windows))]
    #[test]
    fn window_title_focus_reports_unfocused_without_lookup() {
        let focus = WindowTitleFocus::new("Counter-Strike 2");
        assert!(!focus.is_target_window_focused());
        assert!(!focus.is_target_window_focused());
        assert!(focus.warned.load(Ordering::Relaxed));
    }

    #[cfg(windows)]
    #[test]
    fn window_title_focus_reads_the_foreground_title() {
        let focus = WindowTitleFocus::new("\u{1F6AB} no window is titled like this");
        assert!(!focus.is_target_window_focused());
        assert!(!focus.warned.load(Ordering::Relaxed));
    }
}

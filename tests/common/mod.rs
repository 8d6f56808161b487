#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use randomizer::executor::ApplicationContext;
use randomizer::input::{FocusCheck, InputInjector, SharedFocus};
use randomizer::model::{ActionEnv, ActionSettings, InputCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(InputCode),
    End(InputCode),
    Move(i32, i32),
}

/// Injector recording every call instead of touching the OS.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn starts(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Start(_)))
            .count()
    }
}

impl InputInjector for Recorder {
    fn perform_start(&self, input: &InputCode) -> randomizer::Result<()> {
        self.calls.lock().push(Call::Start(input.clone()));
        Ok(())
    }

    fn perform_end(&self, input: &InputCode) -> randomizer::Result<()> {
        self.calls.lock().push(Call::End(input.clone()));
        Ok(())
    }

    fn move_pointer(&self, dx: i32, dy: i32) -> randomizer::Result<()> {
        self.calls.lock().push(Call::Move(dx, dy));
        Ok(())
    }
}

pub struct Fixture {
    pub injector: Arc<Recorder>,
    pub focus: Arc<SharedFocus>,
    pub context: Arc<ApplicationContext>,
    pub env: ActionEnv,
}

pub fn fixture(check_for_focus: bool) -> Fixture {
    let injector = Arc::new(Recorder::default());
    let focus = Arc::new(SharedFocus::new(true));
    let context = Arc::new(ApplicationContext::new(check_for_focus));
    let check: Arc<dyn FocusCheck> = focus.clone();
    let env = ActionEnv::new(injector.clone(), check, context.clone()).with_settings(
        ActionSettings {
            interrupt_check_interval: Duration::from_millis(5),
            ..ActionSettings::default()
        },
    );
    Fixture {
        injector,
        focus,
        context,
        env,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

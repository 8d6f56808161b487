//! Stdin hook bridge.
//!
//! Reads newline-delimited JSON [`HookEvent`]s from standard input, so a separate native hook
//! helper can drive interruption and focus:
//!     native-hook-helper | randomizer --stdin-hook
//!
//! Behavior:
//! - Each non-empty line is trimmed and parsed as a `HookEvent`.
//! - Malformed lines are logged with `warn!` and ignored; reading continues.
//! - EOF or a read error ends the task; the scheduler keeps running without input interruption.

use anyhow::Context;
use parking_lot::Mutex;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tracing::{info, trace, warn};

use super::hook::{HookEvent, HookSink, InputHook};

/// Hook provider reading NDJSON events from stdin.
#[derive(Debug, Default)]
pub struct StdinHook {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdinHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the reader task if it is running.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl InputHook for StdinHook {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn register(&self, sink: HookSink) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("stdin hook needs a running Tokio runtime")?;

        let mut slot = self.task.lock();
        if slot.is_some() {
            anyhow::bail!("stdin hook is already registered");
        }

        *slot = Some(runtime.spawn(async move {
            info!(target: "randomizer::hook", "StdinHook task started (reading lines)");
            let mut reader = BufReader::new(io::stdin());
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        info!(target: "randomizer::hook", "EOF on stdin; StdinHook exiting");
                        break;
                    }
                    Ok(_) => {
                        let raw = line.trim();
                        if raw.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HookEvent>(raw) {
                            Ok(event) => sink.deliver(&event),
                            Err(e) => {
                                warn!(
                                    target: "randomizer::hook",
                                    error = %e,
                                    line = raw,
                                    "Failed to parse stdin hook event"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            target: "randomizer::hook",
                            error = %e,
                            "Error reading from stdin; terminating hook task"
                        );
                        break;
                    }
                }
            }

            trace!(target: "randomizer::hook", "StdinHook task ended");
        }));
        Ok(())
    }
}

#![deny(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Randomizer: randomized, interruptible input action sequences for a single focused application.
//!
//! A background scheduler waits a random delay, picks an active action sequence at random and
//! plays it action by action through an input injector (Enigo). Real user input releasing the
//! key the bot is holding interrupts the running action; focus loss and stop requests release
//! everything right away.
//!
//! Modules:
//! - `config`: Configuration models, loader, and schema helpers.
//! - `model`: Intervals, keys, actions and sequences.
//! - `repository`: Action and sequence registries, sequence persistence.
//! - `input`: Input injection, focus checks and input hook boundary.
//! - `executor`: Application state, dispatcher and background scheduler.
//! - `bootstrap`: Wiring of the whole object graph from a config.
//!
//! Use `randomizer::prelude::*` to bring commonly used items into scope quickly.

/// Public module: object graph wiring.
pub mod bootstrap;
/// Public module: configuration (models, loader, schema helpers).
pub mod config;
/// Public module: domain errors.
pub mod error;
/// Public module: execution engine (context, dispatcher, scheduler).
pub mod executor;
/// Public module: input injection, focus and hooks.
pub mod input;
/// Public module: domain model.
pub mod model;
/// Public module: registries and persistence.
pub mod repository;

pub use bootstrap::Randomizer;
pub use error::{RandomizerError, Result};

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a plain level name (trace|debug|info|warn|error), case-insensitive.
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(tracing::Level::INFO);
    init_tracing_with_level(level);
}

/// Initialize tracing with an explicit level. Later calls are no-ops.
pub fn init_tracing_with_level(level: tracing::Level) {
    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use randomizer::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    // External crates (namespaced) if callers want direct access
    pub use crate as randomizer;
    pub use enigo;
    pub use rand;

    // Core types
    pub use crate::Randomizer;
    pub use crate::executor::{
        ActionSequenceDispatcher, ActionSequenceExecutor, ApplicationContext, ApplicationState,
    };
    pub use crate::model::{Action, ActionSequence, Interval};
    pub use crate::repository::{ActionRepository, ActionSequenceRepository};

    // Frequently used internal modules
    pub use crate::{config, executor, input, model, repository};
}

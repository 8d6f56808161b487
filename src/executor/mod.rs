#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Execution engine of the randomizer.

This module wires together:
- `context`: application state (`Idling`, `Running`, `Awaiting`), focus requirement and state listeners
- `events`: lifecycle callbacks fired around actions and sequences
- `dispatcher`: runs one sequence action by action, with mid-action resume
- `scheduler`: background loop that waits, picks a random active sequence and dispatches it

Typical usage:
- Build an `ActionSequenceDispatcher` from an `ActionEnv` and an optional `ActionRepository`.
- Build an `ActionSequenceExecutor` on top of it and a sequence repository, then `start()` it.
- Feed input hook releases through `ActionSequenceExecutor::hook_sink`.
- Move the `ApplicationContext` to `Running` to let sequences run.
*/

pub mod context;
pub mod dispatcher;
pub mod events;
pub mod scheduler;

// Re-exports for convenient access from `randomizer::executor::*`
pub use context::{ApplicationContext, ApplicationState};
pub use dispatcher::{ActionSequenceDispatcher, SequenceOutcome};
pub use events::EventHandlers;
pub use scheduler::{ActionSequenceExecutor, ExecutorHandle, ExecutorSettings};

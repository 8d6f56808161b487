//! Registries of actions and action sequences, plus sequence persistence.

pub mod actions;
pub mod sequences;
pub mod store;

pub use actions::ActionRepository;
pub use sequences::ActionSequenceRepository;
pub use store::{
    JsonSequenceStore, MemorySequenceStore, SequenceStore, StoreWatcher, watch_store,
};

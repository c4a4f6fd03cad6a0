mod engine;
mod mirror;

pub use engine::{CompletionSyncEngine, ToggleOutcome};
pub use mirror::{rebuild, reconcile, CompletionMirror, PendingChange, RemoteOutcome};

//! # Holdfast Core Library
//!
//! The commitment-gesture engine behind Holdfast. A press-and-hold on a task
//! either commits it as done for today or, if released early, decays to zero
//! and opens a one-shot camera capture whose photo is uploaded as the penalty.
//! Completion state is mirrored locally and reconciled against a remote store.
//!
//! ## Architecture
//!
//! - **Timers**: a cooperative queue on injected epoch-millisecond time.
//!   Nothing in this crate spawns threads or sleeps
//! - **Gesture**: hold/decay/panic state machine
//! - **Capture**: camera session with a guarded single capture
//! - **Upload**: pushes the captured frame and schedules the popup close
//! - **Completion**: optimistic "done today" mirror with exact rollback
//! - **Storage**: SQLite kv store and TOML configuration
//!
//! ## Key Components
//!
//! - [`HabitCore`]: single-owner driver that routes timers and emits [`Event`]s
//! - [`GestureStateMachine`]: hold and decay timing
//! - [`CaptureSession`]: one photograph per session
//! - [`CompletionSyncEngine`]: optimistic toggle with rollback
//! - [`Config`]: application configuration management

pub mod capture;
pub mod completion;
pub mod driver;
pub mod error;
pub mod events;
pub mod gesture;
pub mod memory;
pub mod panic;
pub mod remote;
pub mod storage;
pub mod task;
pub mod timer;
pub mod upload;

pub use capture::{CaptureConfig, CapturePhase, CaptureSession, FrameCache, MediaDevices};
pub use completion::{CompletionMirror, CompletionSyncEngine, ToggleOutcome};
pub use driver::{Collaborators, CoreSettings, HabitCore};
pub use error::{CaptureError, ConfigError, CoreError, DatabaseError, RemoteError, Result, UploadError};
pub use events::Event;
pub use gesture::{GestureConfig, GesturePhase, GestureStateMachine};
pub use panic::{PanicCoordinator, PanicPopup};
pub use remote::{BlobStore, HabitStore, ImageTransform, RemoteConfig, RestClient};
pub use storage::{Config, Database};
pub use task::{Task, TaskId};
pub use timer::{TimerId, TimerQueue};
pub use upload::{UploadConfig, UploadCoordinator, UploadStatus};

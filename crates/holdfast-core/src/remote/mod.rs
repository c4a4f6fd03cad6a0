//! Narrow interfaces to the remote collaborators.
//!
//! The core is a caller of these operations, never a server. Implementations
//! live in [`rest`] (HTTP) and [`crate::memory`] (in-process).

pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::task::{CompletionRecord, Task, TaskId};

pub use rest::{RemoteConfig, RestClient};

/// Remote relational store holding tasks and their completion records.
#[async_trait]
pub trait HabitStore: Send + Sync {
    /// Ordered task list with `completed_today` derived by the store.
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError>;

    /// Insert a completion dated today. Unconditional: no existence check.
    async fn insert_completion(&self, task_id: &TaskId) -> Result<CompletionRecord, RemoteError>;

    /// Delete every completion dated today. Returns how many were removed.
    async fn delete_today(&self, task_id: &TaskId) -> Result<u64, RemoteError>;
}

/// What a blob store reports back for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub success: bool,
    pub url: Option<String>,
}

/// Remote blob store for captured frames.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: &[u8], bucket: &str) -> Result<StoreReceipt, RemoteError>;
}

/// Opaque "punishment" image generation. Invoked only after a successful
/// upload; the result is a URL to the generated image.
#[async_trait]
pub trait ImageTransform: Send + Sync {
    async fn transform(&self, image_url: &str, context: &str) -> Result<String, RemoteError>;
}

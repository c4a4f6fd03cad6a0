//! In-process collaborators: a habit/blob store, a synthetic camera and a
//! frame cache. Used by the simulator and by tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::capture::{FrameCache, Frame, MediaDevices, MediaStream, StreamConstraints};
use crate::error::{CaptureError, CoreError, RemoteError};
use crate::remote::{BlobStore, HabitStore, ImageTransform, StoreReceipt};
use crate::task::{CompletionRecord, Task, TaskId};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Store ────────────────────────────────────────────────────────────

/// A stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bucket: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Habit store, blob store and image transform backed by process memory.
///
/// Each remote family can be made to fail independently. Every call is
/// counted, failed or not.
#[derive(Debug)]
pub struct MemoryStore {
    today: NaiveDate,
    tasks: Mutex<Vec<Task>>,
    completions: Mutex<Vec<CompletionRecord>>,
    blobs: Mutex<Vec<StoredBlob>>,
    next_record: AtomicUsize,

    fail_fetch: AtomicBool,
    fail_writes: AtomicBool,
    fail_store: AtomicBool,
    reject_store: AtomicBool,
    fail_transform: AtomicBool,

    fetch_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    store_calls: AtomicUsize,
    transform_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_tasks(Vec::new())
    }
}

impl MemoryStore {
    /// Tasks marked `completed_today` get a completion record dated today.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let today = chrono::Local::now().date_naive();
        let completions = tasks
            .iter()
            .filter(|t| t.completed_today)
            .enumerate()
            .map(|(i, t)| CompletionRecord {
                id: format!("seed-{i}"),
                task_id: t.id.clone(),
                completed_on: today,
            })
            .collect();
        Self {
            today,
            tasks: Mutex::new(tasks),
            completions: Mutex::new(completions),
            blobs: Mutex::new(Vec::new()),
            next_record: AtomicUsize::new(1),
            fail_fetch: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_store: AtomicBool::new(false),
            reject_store: AtomicBool::new(false),
            fail_transform: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            store_calls: AtomicUsize::new(0),
            transform_calls: AtomicUsize::new(0),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn add_task(&self, task: Task) {
        lock(&self.tasks).push(task);
    }

    // ── Failure injection ──

    pub fn fail_fetch(&self, on: bool) {
        self.fail_fetch.store(on, Ordering::SeqCst);
    }

    /// Inserts and deletes fail with a transport error.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_store(&self, on: bool) {
        self.fail_store.store(on, Ordering::SeqCst);
    }

    /// Stores answer with `success: false` instead of an error.
    pub fn reject_store(&self, on: bool) {
        self.reject_store.store(on, Ordering::SeqCst);
    }

    pub fn fail_transform(&self, on: bool) {
        self.fail_transform.store(on, Ordering::SeqCst);
    }

    // ── Inspection ──

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn transform_calls(&self) -> usize {
        self.transform_calls.load(Ordering::SeqCst)
    }

    /// Completion records dated today for `task_id`.
    pub fn completions_for(&self, task_id: &TaskId) -> usize {
        lock(&self.completions)
            .iter()
            .filter(|r| &r.task_id == task_id && r.completed_on == self.today)
            .count()
    }

    pub fn blobs(&self) -> Vec<StoredBlob> {
        lock(&self.blobs).clone()
    }

    fn offline(what: &str) -> RemoteError {
        RemoteError::Transport(format!("{what}: simulated outage"))
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::offline("fetch"));
        }
        let completions = lock(&self.completions);
        let tasks = lock(&self.tasks)
            .iter()
            .map(|t| Task {
                completed_today: completions
                    .iter()
                    .any(|r| r.task_id == t.id && r.completed_on == self.today),
                ..t.clone()
            })
            .collect();
        Ok(tasks)
    }

    async fn insert_completion(&self, task_id: &TaskId) -> Result<CompletionRecord, RemoteError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::offline("insert"));
        }
        let n = self.next_record.fetch_add(1, Ordering::SeqCst);
        let record = CompletionRecord {
            id: n.to_string(),
            task_id: task_id.clone(),
            completed_on: self.today,
        };
        lock(&self.completions).push(record.clone());
        Ok(record)
    }

    async fn delete_today(&self, task_id: &TaskId) -> Result<u64, RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::offline("delete"));
        }
        let mut completions = lock(&self.completions);
        let before = completions.len();
        completions.retain(|r| !(&r.task_id == task_id && r.completed_on == self.today));
        Ok((before - completions.len()) as u64)
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn store(&self, bytes: &[u8], bucket: &str) -> Result<StoreReceipt, RemoteError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(Self::offline("store"));
        }
        if self.reject_store.load(Ordering::SeqCst) {
            return Ok(StoreReceipt {
                success: false,
                url: None,
            });
        }
        let mut blobs = lock(&self.blobs);
        let name = format!("panic_{}.jpg", blobs.len() + 1);
        let url = format!("memory://{bucket}/{name}");
        blobs.push(StoredBlob {
            bucket: bucket.to_string(),
            name,
            bytes: bytes.to_vec(),
        });
        Ok(StoreReceipt {
            success: true,
            url: Some(url),
        })
    }
}

#[async_trait]
impl ImageTransform for MemoryStore {
    async fn transform(&self, image_url: &str, context: &str) -> Result<String, RemoteError> {
        let n = self.transform_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_transform.load(Ordering::SeqCst) {
            return Err(Self::offline("transform"));
        }
        tracing::debug!(image_url, context, "synthetic transform");
        Ok(format!("memory://punishments/{n}.jpg"))
    }
}

// ── Camera ───────────────────────────────────────────────────────────

/// Shared count of `stop_tracks` calls that actually stopped something.
#[derive(Debug, Clone, Default)]
pub struct StopCounter(Arc<AtomicUsize>);

impl StopCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Single-track stream producing a gradient frame.
#[derive(Debug)]
pub struct SyntheticStream {
    width: u32,
    height: u32,
    stopped: bool,
    stops: StopCounter,
}

impl SyntheticStream {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_counter(width, height, StopCounter::default())
    }

    fn with_counter(width: u32, height: u32, stops: StopCounter) -> Self {
        Self {
            width,
            height,
            stopped: false,
            stops,
        }
    }

    pub fn stop_counter(&self) -> StopCounter {
        self.stops.clone()
    }
}

impl MediaStream for SyntheticStream {
    fn video_dimensions(&self) -> (u32, u32) {
        if self.stopped {
            (0, 0)
        } else {
            (self.width, self.height)
        }
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.stopped || self.width == 0 || self.height == 0 {
            return None;
        }
        Some(Frame::gradient(self.width, self.height))
    }

    fn stop_tracks(&mut self) -> usize {
        if std::mem::replace(&mut self.stopped, true) {
            return 0;
        }
        self.stops.bump();
        1
    }
}

/// Camera that grants synthetic streams, or refuses them when denied.
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    deny: AtomicBool,
    unavailable: AtomicBool,
    requests: AtomicUsize,
    stops: StopCounter,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            deny: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            stops: StopCounter::default(),
        }
    }

    pub fn deny(&self, on: bool) {
        self.deny.store(on, Ordering::SeqCst);
    }

    pub fn unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stops across every stream this camera granted.
    pub fn stop_counter(&self) -> StopCounter {
        self.stops.clone()
    }
}

#[async_trait]
impl MediaDevices for SyntheticCamera {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("NotAllowedError".into()));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("no matching device".into()));
        }
        tracing::debug!(?constraints, "synthetic stream granted");
        Ok(Box::new(SyntheticStream::with_counter(
            self.width,
            self.height,
            self.stops.clone(),
        )))
    }
}

// ── Frame cache ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryFrameCache {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryFrameCache {
    pub fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl FrameCache for MemoryFrameCache {
    fn put(&self, key: &str, data_url: &str) -> Result<(), CoreError> {
        lock(&self.entries).insert(key.to_string(), data_url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_derives_completed_today_from_records() {
        let store = MemoryStore::with_tasks(vec![Task::new("a", "A"), Task::new("b", "B").completed()]);
        store.insert_completion(&"a".into()).await.unwrap();
        let tasks = store.fetch_tasks().await.unwrap();
        assert!(tasks.iter().all(|t| t.completed_today));

        assert_eq!(store.delete_today(&"b".into()).await.unwrap(), 1);
        let tasks = store.fetch_tasks().await.unwrap();
        assert!(!tasks[1].completed_today);
    }

    #[tokio::test]
    async fn injected_failures_are_counted() {
        let store = MemoryStore::default();
        store.fail_writes(true);
        assert!(store.insert_completion(&"a".into()).await.is_err());
        assert!(store.delete_today(&"a".into()).await.is_err());
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn store_and_reject() {
        let store = MemoryStore::default();
        let receipt = store.store(&[1, 2, 3], "panic_images").await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.url.as_deref(), Some("memory://panic_images/panic_1.jpg"));

        store.reject_store(true);
        let receipt = store.store(&[1], "panic_images").await.unwrap();
        assert!(!receipt.success);
        assert_eq!(store.blobs().len(), 1);
    }

    #[tokio::test]
    async fn camera_denial_and_shared_stop_count() {
        let camera = SyntheticCamera::new(32, 24);
        let mut stream = camera
            .request_stream(&StreamConstraints::default())
            .await
            .unwrap();
        assert_eq!(stream.video_dimensions(), (32, 24));
        assert_eq!(stream.stop_tracks(), 1);
        assert_eq!(stream.stop_tracks(), 0);
        assert_eq!(camera.stop_counter().get(), 1);

        camera.deny(true);
        let err = camera
            .request_stream(&StreamConstraints::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(camera.requests(), 2);
    }
}

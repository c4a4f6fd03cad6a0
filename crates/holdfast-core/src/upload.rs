//! Delivers one captured frame to the blob store and decides when the
//! capture UI closes.
//!
//! ```text
//! Idle -> Uploading -> Success   (close scheduled after close_delay_ms)
//!                   -> Error     (stays open, no retry)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, UploadError};
use crate::remote::StoreReceipt;
use crate::timer::{TimerId, TimerQueue, TimerSlot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
}

fn default_bucket() -> String {
    "panic_images".into()
}
fn default_close_delay_ms() -> u64 {
    2_000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            close_delay_ms: default_close_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Idle,
    Uploading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub location: Option<String>,
}

impl Default for UploadJob {
    fn default() -> Self {
        Self {
            status: UploadStatus::Idle,
            error_message: None,
            location: None,
        }
    }
}

#[derive(Debug)]
pub struct UploadCoordinator {
    config: UploadConfig,
    job: UploadJob,
    close_timer: TimerSlot,
}

impl UploadCoordinator {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            config,
            job: UploadJob::default(),
            close_timer: TimerSlot::new(),
        }
    }

    pub fn job(&self) -> &UploadJob {
        &self.job
    }

    pub fn status(&self) -> UploadStatus {
        self.job.status
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn close_scheduled(&self, timers: &TimerQueue) -> bool {
        self.close_timer.is_armed(timers)
    }

    /// Enter `Uploading`. A job only ever starts once, so a session never
    /// re-uploads after success and never retries after failure.
    pub fn begin(&mut self) -> Result<(), UploadError> {
        if self.job.status != UploadStatus::Idle {
            return Err(UploadError::AlreadyStarted);
        }
        self.job.status = UploadStatus::Uploading;
        self.job.error_message = None;
        Ok(())
    }

    /// Continuation of the `store` call.
    pub fn finish(
        &mut self,
        timers: &mut TimerQueue,
        result: Result<StoreReceipt, RemoteError>,
        now_ms: u64,
    ) -> &UploadJob {
        if self.job.status != UploadStatus::Uploading {
            return &self.job;
        }

        match result {
            Ok(StoreReceipt { success: true, url }) => {
                self.job.status = UploadStatus::Success;
                self.job.location = url;
                self.close_timer
                    .arm_once(timers, now_ms, self.config.close_delay_ms);
                tracing::info!(location = ?self.job.location, "upload complete, closing soon");
            }
            Ok(StoreReceipt { success: false, .. }) => {
                self.fail("Upload was not successful".to_string());
            }
            Err(err) => {
                self.fail(format!("Upload failed: {err}"));
            }
        }
        &self.job
    }

    /// Returns `true` when the close timer fired: the capture UI should close.
    pub fn on_timer(&mut self, id: TimerId) -> bool {
        if !self.close_timer.owns(id) {
            return false;
        }
        self.close_timer.clear_fired(id);
        true
    }

    pub fn dispose(&mut self, timers: &mut TimerQueue) {
        self.close_timer.cancel(timers);
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(%message, "upload failed");
        self.job.status = UploadStatus::Error;
        self.job.error_message = Some(message);
    }
}

impl Default for UploadCoordinator {
    fn default() -> Self {
        Self::new(UploadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(url: &str) -> StoreReceipt {
        StoreReceipt {
            success: true,
            url: Some(url.into()),
        }
    }

    #[test]
    fn success_schedules_close_after_delay() {
        let mut q = TimerQueue::new();
        let mut up = UploadCoordinator::default();
        up.begin().unwrap();
        assert_eq!(up.status(), UploadStatus::Uploading);

        up.finish(&mut q, Ok(receipt("https://cdn/x.jpg")), 10_000);
        assert_eq!(up.status(), UploadStatus::Success);
        assert_eq!(up.job().location.as_deref(), Some("https://cdn/x.jpg"));
        assert!(up.close_scheduled(&q));

        assert!(q.pop_due(11_999).is_none());
        let fired = q.pop_due(12_000).unwrap();
        assert!(up.on_timer(fired.id));
    }

    #[test]
    fn transport_failure_sets_error_without_close() {
        let mut q = TimerQueue::new();
        let mut up = UploadCoordinator::default();
        up.begin().unwrap();
        up.finish(&mut q, Err(RemoteError::Transport("connection reset".into())), 0);
        assert_eq!(up.status(), UploadStatus::Error);
        assert_eq!(
            up.job().error_message.as_deref(),
            Some("Upload failed: transport failure: connection reset")
        );
        assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn unsuccessful_receipt_is_an_error() {
        let mut q = TimerQueue::new();
        let mut up = UploadCoordinator::default();
        up.begin().unwrap();
        up.finish(
            &mut q,
            Ok(StoreReceipt {
                success: false,
                url: None,
            }),
            0,
        );
        assert_eq!(
            up.job().error_message.as_deref(),
            Some("Upload was not successful")
        );
        assert!(!up.close_scheduled(&q));
    }

    #[test]
    fn never_starts_twice() {
        let mut q = TimerQueue::new();
        let mut up = UploadCoordinator::default();
        up.begin().unwrap();
        up.finish(&mut q, Ok(receipt("u")), 0);
        assert_eq!(up.begin(), Err(UploadError::AlreadyStarted));

        let mut failed = UploadCoordinator::default();
        failed.begin().unwrap();
        failed.finish(&mut q, Err(RemoteError::Transport("x".into())), 0);
        assert_eq!(failed.begin(), Err(UploadError::AlreadyStarted));
    }

    #[test]
    fn dispose_cancels_pending_close() {
        let mut q = TimerQueue::new();
        let mut up = UploadCoordinator::default();
        up.begin().unwrap();
        up.finish(&mut q, Ok(receipt("u")), 0);
        up.dispose(&mut q);
        assert_eq!(q.active_count(), 0);
    }
}

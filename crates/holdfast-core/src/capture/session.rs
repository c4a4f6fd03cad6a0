//! One-shot camera capture session.
//!
//! ```text
//! Acquiring -> Live -> Capturing -> Captured
//! Acquiring -> Error
//! Live      -> Error
//! ```
//!
//! No path returns to `Acquiring`. At most one capture ever happens per
//! session: a synchronous [`CaptureGuard`] and the phase are both consulted
//! before a capture begins, and both are committed before the frame is
//! handed off for encoding. The stream is released the moment a frame is
//! taken, on error, and on teardown.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::device::{MediaStream, StreamConstraints};
use super::frame::{encode_mirrored_jpeg, to_data_url, Frame};
use crate::error::{CaptureError, CoreError};
use crate::timer::{TimerId, TimerQueue, TimerSlot};

/// User-facing message when camera access is refused.
pub const PERMISSION_MESSAGE: &str = "Unable to access camera. Please check permissions.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Delay from stream bind to the automatic capture. The caption is shown
    /// for exactly this window: one timer both hides it and takes the photo.
    #[serde(default = "default_auto_capture_ms")]
    pub auto_capture_ms: u64,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_caption")]
    pub caption: String,
}

fn default_auto_capture_ms() -> u64 {
    3_000
}
fn default_ideal_width() -> u32 {
    640
}
fn default_ideal_height() -> u32 {
    480
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_caption() -> String {
    "Look at yourself in the mirror...".into()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            auto_capture_ms: default_auto_capture_ms(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            jpeg_quality: default_jpeg_quality(),
            caption: default_caption(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Acquiring,
    Live,
    Capturing,
    Captured,
    Error,
}

/// Durable client-local slot for captured frames.
pub trait FrameCache: Send + Sync {
    fn put(&self, key: &str, data_url: &str) -> Result<(), CoreError>;
}

/// Synchronous "already captured or capturing" flag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGuard {
    taken: bool,
}

impl CaptureGuard {
    /// Take the guard. Returns `false` if it was already taken.
    pub fn try_take(&mut self) -> bool {
        !std::mem::replace(&mut self.taken, true)
    }

    pub fn release(&mut self) {
        self.taken = false;
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }
}

/// Why a capture attempt did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyCaptured,
    NotLive,
    VideoNotReady,
    NoFrame,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::AlreadyCaptured => "already capturing or captured",
            SkipReason::NotLive => "no live stream",
            SkipReason::VideoNotReady => "video not ready for capture",
            SkipReason::NoFrame => "no frame available",
        };
        f.write_str(s)
    }
}

/// Outcome of the synchronous half of a capture.
#[derive(Debug)]
pub enum CaptureStep {
    Skipped(SkipReason),
    /// Guards are committed and the stream is released; encode this frame.
    Frame(Frame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub jpeg: Vec<u8>,
    /// In-memory preview reference.
    pub data_url: String,
    /// Key in the durable cache, if the write succeeded.
    pub cache_key: Option<String>,
    pub captured_at_ms: u64,
}

pub struct CaptureSession {
    id: Uuid,
    config: CaptureConfig,
    phase: CapturePhase,
    stream: Option<Box<dyn MediaStream>>,
    guard: CaptureGuard,
    auto_timer: TimerSlot,
    caption_visible: bool,
    captured: Option<CapturedImage>,
    error: Option<String>,
    disposed: bool,
    stream_stops: usize,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("stream_open", &self.stream.is_some())
            .field("guard", &self.guard)
            .field("error", &self.error)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl CaptureSession {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            phase: CapturePhase::Acquiring,
            stream: None,
            guard: CaptureGuard::default(),
            auto_timer: TimerSlot::new(),
            caption_visible: false,
            captured: None,
            error: None,
            disposed: false,
            stream_stops: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption_visible.then_some(self.config.caption.as_str())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// How many times the stream was stopped. Never exceeds one.
    pub fn stream_stops(&self) -> usize {
        self.stream_stops
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.auto_timer.owns(id)
    }

    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            ideal_width: self.config.ideal_width,
            ideal_height: self.config.ideal_height,
            ..StreamConstraints::default()
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Continuation of the camera-access request.
    ///
    /// On grant the stream is bound, the caption shown, and the single
    /// auto-capture timer armed. On denial the session ends in `Error` with
    /// no timers scheduled.
    pub fn bind_stream(
        &mut self,
        timers: &mut TimerQueue,
        result: Result<Box<dyn MediaStream>, CaptureError>,
        now_ms: u64,
    ) -> Result<(), CaptureError> {
        if self.disposed || self.phase != CapturePhase::Acquiring {
            // Grant landed after teardown: never keep the device open.
            if let Ok(mut stream) = result {
                stream.stop_tracks();
                tracing::debug!(session = %self.id, "late stream stopped after teardown");
            }
            return Ok(());
        }

        match result {
            Ok(stream) => {
                self.stream = Some(stream);
                self.phase = CapturePhase::Live;
                self.caption_visible = true;
                self.auto_timer
                    .arm_once(timers, now_ms, self.config.auto_capture_ms);
                tracing::info!(session = %self.id, "camera live");
                Ok(())
            }
            Err(err) => {
                self.phase = CapturePhase::Error;
                self.error = Some(match &err {
                    CaptureError::PermissionDenied(_) => PERMISSION_MESSAGE.to_string(),
                    other => other.to_string(),
                });
                tracing::warn!(session = %self.id, error = %err, "camera access failed");
                Err(err)
            }
        }
    }

    /// Route a fired timer. The auto-capture timer hides the caption, then
    /// attempts the capture subject to both guards.
    pub fn on_timer(&mut self, timers: &mut TimerQueue, id: TimerId) -> Option<CaptureStep> {
        if !self.auto_timer.owns(id) {
            return None;
        }
        self.auto_timer.clear_fired(id);
        self.caption_visible = false;
        Some(self.begin_capture(timers))
    }

    /// Synchronous half of a capture.
    ///
    /// Both guards are checked first. On a committed capture both are set,
    /// the stream is stopped and any pending auto-capture timer is cleared
    /// before the frame is returned for encoding. Precondition failures
    /// release the guard and leave the session `Live`.
    pub fn begin_capture(&mut self, timers: &mut TimerQueue) -> CaptureStep {
        if self.guard.is_taken()
            || matches!(self.phase, CapturePhase::Capturing | CapturePhase::Captured)
        {
            tracing::debug!(session = %self.id, "already capturing or captured, skipping");
            return CaptureStep::Skipped(SkipReason::AlreadyCaptured);
        }
        if self.phase != CapturePhase::Live {
            return CaptureStep::Skipped(SkipReason::NotLive);
        }

        self.guard.try_take();
        self.phase = CapturePhase::Capturing;

        let frame = match self.stream.as_mut() {
            None => Err(SkipReason::NotLive),
            Some(stream) => {
                let (w, h) = stream.video_dimensions();
                if w == 0 || h == 0 {
                    Err(SkipReason::VideoNotReady)
                } else {
                    stream
                        .current_frame()
                        .filter(Frame::has_dimensions)
                        .ok_or(SkipReason::NoFrame)
                }
            }
        };

        match frame {
            Ok(frame) => {
                self.release_stream();
                self.auto_timer.cancel(timers);
                self.caption_visible = false;
                tracing::info!(
                    session = %self.id,
                    width = frame.width,
                    height = frame.height,
                    "frame captured"
                );
                CaptureStep::Frame(frame)
            }
            Err(reason) => {
                tracing::warn!(session = %self.id, %reason, "capture aborted");
                self.guard.release();
                self.phase = CapturePhase::Live;
                CaptureStep::Skipped(reason)
            }
        }
    }

    /// Continuation of the encode step. Mirrors the bytes into the durable
    /// cache and the in-memory preview regardless of what happens to the
    /// upload later.
    pub fn finish_capture(
        &mut self,
        encoded: Result<Vec<u8>, CaptureError>,
        cache: Option<&dyn FrameCache>,
        now_ms: u64,
    ) -> Result<&CapturedImage, CaptureError> {
        if self.disposed || self.phase != CapturePhase::Capturing {
            return Err(CaptureError::NotLive);
        }

        let jpeg = match encoded {
            Ok(jpeg) => jpeg,
            Err(err) => {
                self.phase = CapturePhase::Error;
                self.error = Some(err.to_string());
                tracing::error!(session = %self.id, error = %err, "encode failed");
                return Err(err);
            }
        };

        let data_url = to_data_url(&jpeg);
        let key = format!("camera_photo_{now_ms}");
        let cache_key = match cache.map(|c| c.put(&key, &data_url)) {
            Some(Ok(())) => {
                tracing::debug!(session = %self.id, key = %key, len = data_url.len(), "photo cached");
                Some(key)
            }
            Some(Err(err)) => {
                tracing::warn!(session = %self.id, error = %err, "failed to cache photo");
                None
            }
            None => None,
        };

        self.phase = CapturePhase::Captured;
        let image = self.captured.insert(CapturedImage {
            jpeg,
            data_url,
            cache_key,
            captured_at_ms: now_ms,
        });
        Ok(&*image)
    }

    /// Manual capture path: both halves with an inline encode.
    pub fn capture(
        &mut self,
        timers: &mut TimerQueue,
        cache: Option<&dyn FrameCache>,
        now_ms: u64,
    ) -> Result<Option<&CapturedImage>, CaptureError> {
        match self.begin_capture(timers) {
            CaptureStep::Skipped(_) => Ok(None),
            CaptureStep::Frame(frame) => {
                let encoded = encode_mirrored_jpeg(&frame, self.config.jpeg_quality);
                self.finish_capture(encoded, cache, now_ms).map(Some)
            }
        }
    }

    /// The stream ended underneath a live session.
    pub fn fail_stream(&mut self, timers: &mut TimerQueue, reason: &str) {
        if self.phase != CapturePhase::Live {
            return;
        }
        self.auto_timer.cancel(timers);
        self.release_stream();
        self.caption_visible = false;
        self.phase = CapturePhase::Error;
        self.error = Some(reason.to_string());
        tracing::warn!(session = %self.id, reason, "stream ended while live");
    }

    /// Teardown at any phase: clears timers and stops any open stream.
    pub fn dispose(&mut self, timers: &mut TimerQueue) {
        self.auto_timer.cancel(timers);
        self.release_stream();
        self.caption_visible = false;
        self.disposed = true;
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let tracks = stream.stop_tracks();
            self.stream_stops += 1;
            tracing::debug!(session = %self.id, tracks, "camera tracks stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_stream();
    }
}

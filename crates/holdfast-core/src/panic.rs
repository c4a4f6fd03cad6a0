//! Glue between a depleted gesture and the capture/upload pipeline.
//!
//! Every method is synchronous. Work that must cross a suspension point
//! (camera grant, encode, store, transform) is handed back to the driver as
//! a [`FollowUp`], and the driver feeds the result into the matching
//! `finish_*` call. Results for a popup that has since been replaced or
//! closed are dropped, and a late camera stream is stopped on arrival.

use uuid::Uuid;

use crate::capture::{
    CaptureConfig, CapturePhase, CaptureSession, CaptureStep, Frame, FrameCache, MediaStream,
    StreamConstraints,
};
use crate::error::{CaptureError, RemoteError};
use crate::events::{at, Event};
use crate::remote::StoreReceipt;
use crate::task::TaskId;
use crate::timer::{TimerId, TimerQueue};
use crate::upload::{UploadConfig, UploadCoordinator, UploadStatus};

/// One capture popup, scoped to the task whose gesture depleted.
#[derive(Debug)]
pub struct PanicPopup {
    task_id: TaskId,
    title: String,
    capture: CaptureSession,
    /// Created only after a successful capture.
    upload: Option<UploadCoordinator>,
    punishment_url: Option<String>,
}

impl PanicPopup {
    pub fn session_id(&self) -> Uuid {
        self.capture.id()
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn upload(&self) -> Option<&UploadCoordinator> {
        self.upload.as_ref()
    }

    pub fn punishment_url(&self) -> Option<&str> {
        self.punishment_url.as_deref()
    }

    fn dispose(&mut self, timers: &mut TimerQueue) {
        self.capture.dispose(timers);
        if let Some(upload) = self.upload.as_mut() {
            upload.dispose(timers);
        }
    }
}

#[derive(Debug)]
pub struct StreamRequest {
    pub session_id: Uuid,
    pub constraints: StreamConstraints,
}

#[derive(Debug)]
pub struct EncodeRequest {
    pub session_id: Uuid,
    pub frame: Frame,
    pub quality: u8,
}

#[derive(Debug)]
pub struct StoreRequest {
    pub session_id: Uuid,
    pub bytes: Vec<u8>,
    pub bucket: String,
}

#[derive(Debug)]
pub struct TransformRequest {
    pub session_id: Uuid,
    pub image_url: String,
    /// Task title, passed as context text.
    pub context: String,
}

/// Asynchronous work the driver must perform next.
#[derive(Debug)]
pub enum FollowUp {
    Encode(EncodeRequest),
    Store(StoreRequest),
    Transform(TransformRequest),
}

/// Events produced by one synchronous step, plus what to await next.
#[derive(Debug, Default)]
pub struct Step {
    pub events: Vec<Event>,
    pub follow_up: Option<FollowUp>,
}

impl Step {
    fn events(events: Vec<Event>) -> Self {
        Self {
            events,
            follow_up: None,
        }
    }
}

#[derive(Debug)]
pub struct PanicCoordinator {
    capture_config: CaptureConfig,
    upload_config: UploadConfig,
    transform_enabled: bool,
    popup: Option<PanicPopup>,
}

impl PanicCoordinator {
    pub fn new(capture_config: CaptureConfig, upload_config: UploadConfig) -> Self {
        Self {
            capture_config,
            upload_config,
            transform_enabled: false,
            popup: None,
        }
    }

    /// Request a punishment transform after every successful upload.
    pub fn with_transform(mut self, enabled: bool) -> Self {
        self.transform_enabled = enabled;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn popup(&self) -> Option<&PanicPopup> {
        self.popup.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.popup.is_some()
    }

    fn current(&mut self, session_id: Uuid) -> Option<&mut PanicPopup> {
        self.popup
            .as_mut()
            .filter(|p| p.session_id() == session_id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Open a popup for `task_id`. An open popup is disposed first so the
    /// camera only ever has one owner.
    pub fn open(
        &mut self,
        timers: &mut TimerQueue,
        task_id: TaskId,
        title: String,
        now_ms: u64,
    ) -> (Vec<Event>, StreamRequest) {
        let events = self.close(timers, now_ms);
        let capture = CaptureSession::new(self.capture_config.clone());
        let request = StreamRequest {
            session_id: capture.id(),
            constraints: capture.constraints(),
        };
        tracing::info!(task = %task_id, session = %request.session_id, "panic popup opened");
        self.popup = Some(PanicPopup {
            task_id,
            title,
            capture,
            upload: None,
            punishment_url: None,
        });
        (events, request)
    }

    /// Continuation of the camera request.
    pub fn bind_stream(
        &mut self,
        timers: &mut TimerQueue,
        session_id: Uuid,
        result: Result<Box<dyn MediaStream>, CaptureError>,
        now_ms: u64,
    ) -> Vec<Event> {
        let Some(popup) = self.current(session_id) else {
            if let Ok(mut stream) = result {
                let tracks = stream.stop_tracks();
                tracing::debug!(session = %session_id, tracks, "stream granted after close, stopped");
            }
            return Vec::new();
        };

        match popup.capture.bind_stream(timers, result, now_ms) {
            Ok(()) if popup.capture.phase() == CapturePhase::Live => vec![Event::CameraLive {
                session_id,
                caption: popup.capture.caption().unwrap_or_default().to_string(),
                at: at(now_ms),
            }],
            Ok(()) => Vec::new(),
            Err(err) => vec![Event::CameraFailed {
                session_id,
                message: popup
                    .capture
                    .error()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string()),
                at: at(now_ms),
            }],
        }
    }

    /// Route a fired timer to the open popup. `None` if neither its capture
    /// nor its upload owns the timer.
    pub fn on_timer(&mut self, timers: &mut TimerQueue, id: TimerId, now_ms: u64) -> Option<Step> {
        let popup = self.popup.as_mut()?;
        let session_id = popup.session_id();

        if popup.capture.owns_timer(id) {
            let step = popup.capture.on_timer(timers, id)?;
            let mut out = capture_step(session_id, step, popup.capture.config().jpeg_quality, now_ms);
            out.events.insert(
                0,
                Event::CaptionHidden {
                    session_id,
                    at: at(now_ms),
                },
            );
            return Some(out);
        }

        let close = popup.upload.as_mut().is_some_and(|u| u.on_timer(id));
        if close {
            return Some(Step::events(self.close(timers, now_ms)));
        }
        None
    }

    /// Manual capture path. Subject to the same guards as the auto timer.
    pub fn capture_now(&mut self, timers: &mut TimerQueue, now_ms: u64) -> Step {
        let Some(popup) = self.popup.as_mut() else {
            return Step::default();
        };
        let session_id = popup.session_id();
        let quality = popup.capture.config().jpeg_quality;
        let step = popup.capture.begin_capture(timers);
        capture_step(session_id, step, quality, now_ms)
    }

    /// Continuation of the encode step: cache the photo, then start the one
    /// upload this session gets.
    pub fn finish_encode(
        &mut self,
        session_id: Uuid,
        encoded: Result<Vec<u8>, CaptureError>,
        cache: Option<&dyn FrameCache>,
        now_ms: u64,
    ) -> Step {
        let bucket = self.upload_config.bucket.clone();
        let upload_config = self.upload_config.clone();
        let Some(popup) = self.current(session_id) else {
            tracing::debug!(session = %session_id, "encode finished after close, dropped");
            return Step::default();
        };

        let (bytes, cache_key) = match popup.capture.finish_capture(encoded, cache, now_ms) {
            Ok(image) => (image.jpeg.clone(), image.cache_key.clone()),
            Err(err) => {
                let message = popup
                    .capture
                    .error()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Step::events(vec![Event::CameraFailed {
                    session_id,
                    message,
                    at: at(now_ms),
                }]);
            }
        };

        let mut events = vec![Event::PhotoCaptured {
            session_id,
            bytes: bytes.len(),
            cache_key: cache_key.unwrap_or_default(),
            at: at(now_ms),
        }];

        let upload = popup.upload.get_or_insert_with(|| UploadCoordinator::new(upload_config));
        if let Err(err) = upload.begin() {
            tracing::warn!(session = %session_id, error = %err, "upload not started");
            return Step::events(events);
        }
        events.push(Event::UploadStarted {
            session_id,
            at: at(now_ms),
        });
        Step {
            events,
            follow_up: Some(FollowUp::Store(StoreRequest {
                session_id,
                bytes,
                bucket,
            })),
        }
    }

    /// Continuation of the blob store call.
    pub fn finish_store(
        &mut self,
        timers: &mut TimerQueue,
        session_id: Uuid,
        result: Result<StoreReceipt, RemoteError>,
        now_ms: u64,
    ) -> Step {
        let transform_enabled = self.transform_enabled;
        let Some(popup) = self.current(session_id) else {
            tracing::debug!(session = %session_id, "upload finished after close, dropped");
            return Step::default();
        };
        let Some(upload) = popup.upload.as_mut() else {
            return Step::default();
        };

        let job = upload.finish(timers, result, now_ms).clone();
        match job.status {
            UploadStatus::Success => {
                let url = job.location.unwrap_or_default();
                let follow_up = (transform_enabled && !url.is_empty()).then(|| {
                    FollowUp::Transform(TransformRequest {
                        session_id,
                        image_url: url.clone(),
                        context: popup.title.clone(),
                    })
                });
                Step {
                    events: vec![Event::UploadSucceeded {
                        session_id,
                        url,
                        at: at(now_ms),
                    }],
                    follow_up,
                }
            }
            UploadStatus::Error => Step::events(vec![Event::UploadFailed {
                session_id,
                message: job.error_message.unwrap_or_default(),
                at: at(now_ms),
            }]),
            UploadStatus::Idle | UploadStatus::Uploading => Step::default(),
        }
    }

    /// Continuation of the punishment transform. Never touches the upload
    /// state or the scheduled close.
    pub fn finish_transform(
        &mut self,
        session_id: Uuid,
        result: Result<String, RemoteError>,
        now_ms: u64,
    ) -> Step {
        let event = match result {
            Ok(url) => {
                if let Some(popup) = self.current(session_id) {
                    popup.punishment_url = Some(url.clone());
                }
                tracing::info!(session = %session_id, %url, "punishment image ready");
                Event::PunishmentReady {
                    session_id,
                    url,
                    at: at(now_ms),
                }
            }
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "punishment transform failed");
                Event::PunishmentFailed {
                    session_id,
                    message: err.to_string(),
                    at: at(now_ms),
                }
            }
        };
        Step::events(vec![event])
    }

    /// Close the open popup, if any. The only way out after a failed upload.
    pub fn close(&mut self, timers: &mut TimerQueue, now_ms: u64) -> Vec<Event> {
        let Some(mut popup) = self.popup.take() else {
            return Vec::new();
        };
        popup.dispose(timers);
        tracing::info!(session = %popup.session_id(), task = %popup.task_id, "panic popup closed");
        vec![Event::PopupClosed {
            session_id: popup.session_id(),
            task_id: popup.task_id,
            at: at(now_ms),
        }]
    }

    pub fn dispose(&mut self, timers: &mut TimerQueue) {
        if let Some(mut popup) = self.popup.take() {
            popup.dispose(timers);
        }
    }
}

fn capture_step(session_id: Uuid, step: CaptureStep, quality: u8, now_ms: u64) -> Step {
    match step {
        CaptureStep::Skipped(reason) => Step::events(vec![Event::CaptureSkipped {
            session_id,
            reason: reason.to_string(),
            at: at(now_ms),
        }]),
        CaptureStep::Frame(frame) => Step {
            events: Vec::new(),
            follow_up: Some(FollowUp::Encode(EncodeRequest {
                session_id,
                frame,
                quality,
            })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encode_mirrored_jpeg;
    use crate::memory::{MemoryFrameCache, SyntheticStream};

    fn coordinator() -> PanicCoordinator {
        PanicCoordinator::new(CaptureConfig::default(), UploadConfig::default())
    }

    fn open_live(p: &mut PanicCoordinator, q: &mut TimerQueue) -> Uuid {
        let (_, req) = p.open(q, "read".into(), "Read".into(), 0);
        let events = p.bind_stream(q, req.session_id, Ok(Box::new(SyntheticStream::new(32, 24))), 0);
        assert!(matches!(events[0], Event::CameraLive { .. }));
        req.session_id
    }

    fn encode_request(step: Step) -> EncodeRequest {
        match step.follow_up {
            Some(FollowUp::Encode(req)) => req,
            other => panic!("expected encode, got {other:?}"),
        }
    }

    #[test]
    fn auto_timer_leads_to_store_request() {
        let mut q = TimerQueue::new();
        let mut p = coordinator();
        let sid = open_live(&mut p, &mut q);

        let fired = q.pop_due(3_000).unwrap();
        let step = p.on_timer(&mut q, fired.id, 3_000).unwrap();
        assert!(matches!(step.events[0], Event::CaptionHidden { .. }));
        let req = encode_request(step);

        let cache = MemoryFrameCache::default();
        let encoded = encode_mirrored_jpeg(&req.frame, req.quality);
        let step = p.finish_encode(sid, encoded, Some(&cache), 3_000);
        assert!(matches!(step.events[0], Event::PhotoCaptured { .. }));
        assert!(matches!(step.events[1], Event::UploadStarted { .. }));
        let Some(FollowUp::Store(store)) = step.follow_up else {
            panic!("expected store");
        };
        assert_eq!(store.bucket, "panic_images");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn successful_upload_closes_after_delay() {
        let mut q = TimerQueue::new();
        let mut p = coordinator().with_transform(true);
        let sid = open_live(&mut p, &mut q);
        let req = encode_request(p.capture_now(&mut q, 100));
        p.finish_encode(sid, encode_mirrored_jpeg(&req.frame, 80), None, 100);

        let receipt = StoreReceipt {
            success: true,
            url: Some("https://cdn/p.jpg".into()),
        };
        let step = p.finish_store(&mut q, sid, Ok(receipt), 200);
        let Some(FollowUp::Transform(t)) = step.follow_up else {
            panic!("expected transform");
        };
        assert_eq!(t.context, "Read");
        p.finish_transform(sid, Ok("https://ai/punish.jpg".into()), 200);
        assert_eq!(p.popup().unwrap().punishment_url(), Some("https://ai/punish.jpg"));

        let fired = q.pop_due(2_200).unwrap();
        let step = p.on_timer(&mut q, fired.id, 2_200).unwrap();
        assert!(matches!(step.events[0], Event::PopupClosed { .. }));
        assert!(!p.is_open());
        assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn failed_upload_stays_open_until_closed() {
        let mut q = TimerQueue::new();
        let mut p = coordinator();
        let sid = open_live(&mut p, &mut q);
        let req = encode_request(p.capture_now(&mut q, 100));
        p.finish_encode(sid, encode_mirrored_jpeg(&req.frame, 80), None, 100);

        let step = p.finish_store(&mut q, sid, Err(RemoteError::Transport("offline".into())), 150);
        assert!(matches!(step.events[0], Event::UploadFailed { .. }));
        assert!(step.follow_up.is_none());
        assert_eq!(q.active_count(), 0);
        assert!(p.is_open());

        let events = p.close(&mut q, 9_000);
        assert!(matches!(events[0], Event::PopupClosed { .. }));
    }

    #[test]
    fn new_panic_replaces_open_popup_and_stops_late_stream() {
        let mut q = TimerQueue::new();
        let mut p = coordinator();
        let (_, first) = p.open(&mut q, "a".into(), "A".into(), 0);
        let (events, second) = p.open(&mut q, "b".into(), "B".into(), 10);
        assert!(matches!(&events[0], Event::PopupClosed { task_id, .. } if task_id.as_str() == "a"));

        let late = SyntheticStream::new(8, 8);
        let stops = late.stop_counter();
        assert!(p.bind_stream(&mut q, first.session_id, Ok(Box::new(late)), 20).is_empty());
        assert_eq!(stops.get(), 1);
        assert_eq!(p.popup().unwrap().session_id(), second.session_id);
        assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn denied_camera_reports_permission_message() {
        let mut q = TimerQueue::new();
        let mut p = coordinator();
        let (_, req) = p.open(&mut q, "a".into(), "A".into(), 0);
        let events = p.bind_stream(
            &mut q,
            req.session_id,
            Err(CaptureError::PermissionDenied("NotAllowedError".into())),
            0,
        );
        assert!(matches!(
            &events[0],
            Event::CameraFailed { message, .. } if message == crate::capture::PERMISSION_MESSAGE
        ));
        assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn manual_capture_after_auto_capture_is_skipped() {
        let mut q = TimerQueue::new();
        let mut p = coordinator();
        open_live(&mut p, &mut q);
        let fired = q.pop_due(3_000).unwrap();
        encode_request(p.on_timer(&mut q, fired.id, 3_000).unwrap());
        let step = p.capture_now(&mut q, 3_000);
        assert!(step.follow_up.is_none());
        assert!(matches!(step.events[0], Event::CaptureSkipped { .. }));
    }
}

//! Single-owner driver for the whole pipeline.
//!
//! `HabitCore` owns the timer queue and every stateful component. Callers
//! feed it presses and the current time; it pops due timers one at a time,
//! routes each to its owner, awaits whatever that owner hands back and
//! reports every state change as an [`Event`]. Taking `&mut self` across
//! those awaits is what keeps the model single-threaded: nothing else can
//! touch the state between a suspension point and its continuation.

use std::sync::Arc;

use crate::capture::{encode_mirrored_jpeg, CaptureConfig, FrameCache, MediaDevices};
use crate::completion::{CompletionSyncEngine, ToggleOutcome};
use crate::error::{CaptureError, RemoteError};
use crate::events::{at, Event};
use crate::gesture::{GestureConfig, GestureOutput, GestureStateMachine, PressOutcome};
use crate::panic::{FollowUp, PanicCoordinator, PanicPopup, Step};
use crate::remote::{BlobStore, HabitStore, ImageTransform};
use crate::storage::Config;
use crate::task::TaskId;
use crate::timer::{Fired, TimerQueue};
use crate::upload::UploadConfig;

/// Component timing and capture settings.
#[derive(Debug, Clone, Default)]
pub struct CoreSettings {
    pub gesture: GestureConfig,
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
}

impl From<&Config> for CoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            gesture: config.gesture.clone(),
            capture: config.capture.clone(),
            upload: config.upload.clone(),
        }
    }
}

/// External collaborators the driver calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn HabitStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub camera: Arc<dyn MediaDevices>,
    pub transform: Option<Arc<dyn ImageTransform>>,
    pub cache: Option<Arc<dyn FrameCache>>,
}

pub struct HabitCore {
    timers: TimerQueue,
    now_ms: u64,
    gesture: GestureStateMachine,
    completion: CompletionSyncEngine,
    panic: PanicCoordinator,
    blobs: Arc<dyn BlobStore>,
    camera: Arc<dyn MediaDevices>,
    transform: Option<Arc<dyn ImageTransform>>,
    cache: Option<Arc<dyn FrameCache>>,
}

impl HabitCore {
    pub fn new(settings: CoreSettings, deps: Collaborators, now_ms: u64) -> Self {
        let panic = PanicCoordinator::new(settings.capture, settings.upload)
            .with_transform(deps.transform.is_some());
        Self {
            timers: TimerQueue::new(),
            now_ms,
            gesture: GestureStateMachine::new(settings.gesture),
            completion: CompletionSyncEngine::new(deps.tasks),
            panic,
            blobs: deps.blobs,
            camera: deps.camera,
            transform: deps.transform,
            cache: deps.cache,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn gesture(&self) -> &GestureStateMachine {
        &self.gesture
    }

    pub fn completion(&self) -> &CompletionSyncEngine {
        &self.completion
    }

    pub fn popup(&self) -> Option<&PanicPopup> {
        self.panic.popup()
    }

    /// True exactly while the gesture is depleting or in panic.
    pub fn emphasis_active(&self) -> bool {
        self.gesture.emphasis_active()
    }

    // ── Gesture input ────────────────────────────────────────────────

    /// Press on `task_id`. Ignored if the mirror says it is already done.
    /// Call [`advance_to`](Self::advance_to) for `now_ms` first.
    pub fn press_start(&mut self, task_id: impl Into<TaskId>, now_ms: u64) -> Vec<Event> {
        self.clock(now_ms);
        let task_id = task_id.into();
        let done = self.completion.is_done(&task_id);
        let outcome = self
            .gesture
            .press_start(&mut self.timers, task_id.clone(), done, self.now_ms);

        let when = at(self.now_ms);
        match outcome {
            PressOutcome::Ignored => Vec::new(),
            PressOutcome::Started => vec![Event::GestureStarted { task_id, at: when }],
            PressOutcome::Superseded { abandoned } => vec![
                Event::GestureSuperseded {
                    abandoned,
                    by: task_id.clone(),
                    at: when,
                },
                Event::GestureStarted { task_id, at: when },
            ],
        }
    }

    pub fn press_end(&mut self, now_ms: u64) -> Vec<Event> {
        self.clock(now_ms);
        let task_id = self.gesture.task_id().cloned();
        match (task_id, self.gesture.press_end(&mut self.timers, self.now_ms)) {
            (Some(task_id), Some(progress)) => vec![Event::GestureReleased {
                task_id,
                progress,
                at: at(self.now_ms),
            }],
            _ => Vec::new(),
        }
    }

    // ── Time ─────────────────────────────────────────────────────────

    /// Fire every timer due at or before `now_ms`, each at its own deadline.
    pub async fn advance_to(&mut self, now_ms: u64) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(fired) = self.timers.pop_due(now_ms) {
            self.clock(fired.at_ms);
            events.extend(self.dispatch(fired).await);
        }
        self.clock(now_ms);
        events
    }

    async fn dispatch(&mut self, fired: Fired) -> Vec<Event> {
        if self.gesture.owns_timer(fired.id) {
            let output = self.gesture.on_timer(&mut self.timers, fired.id, self.now_ms);
            return match output {
                Some(GestureOutput::Committed(task_id)) => self.commit(task_id).await,
                Some(GestureOutput::Panic(task_id)) => self.open_panic(task_id).await,
                None => Vec::new(),
            };
        }

        match self.panic.on_timer(&mut self.timers, fired.id, self.now_ms) {
            Some(step) => self.run(step).await,
            None => {
                tracing::trace!(timer = ?fired.id, "fired timer has no owner");
                Vec::new()
            }
        }
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    async fn commit(&mut self, task_id: TaskId) -> Vec<Event> {
        let mut events = vec![Event::Committed {
            task_id: task_id.clone(),
            at: at(self.now_ms),
        }];
        let outcome = self.completion.mark_done(&task_id).await;
        events.push(self.outcome_event(outcome));
        events
    }

    async fn open_panic(&mut self, task_id: TaskId) -> Vec<Event> {
        let mut events = vec![Event::PanicTriggered {
            task_id: task_id.clone(),
            at: at(self.now_ms),
        }];
        let title = self
            .completion
            .title_of(&task_id)
            .unwrap_or_else(|| task_id.to_string());
        let (closed, request) = self.panic.open(&mut self.timers, task_id, title, self.now_ms);
        events.extend(closed);
        self.gesture.clear_panic();

        let granted = self.camera.request_stream(&request.constraints).await;
        events.extend(self.panic.bind_stream(
            &mut self.timers,
            request.session_id,
            granted,
            self.now_ms,
        ));
        events
    }

    /// Drive a step and every follow-up it chains into.
    async fn run(&mut self, step: Step) -> Vec<Event> {
        let mut events = step.events;
        let mut next = step.follow_up;
        while let Some(follow_up) = next.take() {
            let step = match follow_up {
                FollowUp::Encode(req) => {
                    let session_id = req.session_id;
                    let encoded = tokio::task::spawn_blocking(move || {
                        encode_mirrored_jpeg(&req.frame, req.quality)
                    })
                    .await
                    .unwrap_or_else(|err| Err(CaptureError::Encode(err.to_string())));
                    self.panic
                        .finish_encode(session_id, encoded, self.cache.as_deref(), self.now_ms)
                }
                FollowUp::Store(req) => {
                    let result = self.blobs.store(&req.bytes, &req.bucket).await;
                    self.panic
                        .finish_store(&mut self.timers, req.session_id, result, self.now_ms)
                }
                FollowUp::Transform(req) => {
                    let result = match &self.transform {
                        Some(transform) => transform.transform(&req.image_url, &req.context).await,
                        None => Err(RemoteError::NotConfigured("no image transform".into())),
                    };
                    self.panic.finish_transform(req.session_id, result, self.now_ms)
                }
            };
            events.extend(step.events);
            next = step.follow_up;
        }
        events
    }

    /// Manual capture from the open popup.
    pub async fn capture_now(&mut self) -> Vec<Event> {
        let step = self.panic.capture_now(&mut self.timers, self.now_ms);
        self.run(step).await
    }

    /// Dismiss the open popup. The only way out after a failed upload.
    pub fn close_popup(&mut self) -> Vec<Event> {
        self.panic.close(&mut self.timers, self.now_ms)
    }

    // ── Completion ───────────────────────────────────────────────────

    pub async fn toggle(&mut self, task_id: impl Into<TaskId>) -> Vec<Event> {
        let outcome = self.completion.toggle(&task_id.into()).await;
        vec![self.outcome_event(outcome)]
    }

    pub async fn refresh(&mut self) -> Result<Vec<Event>, RemoteError> {
        let tasks = self.completion.refresh().await?;
        Ok(vec![Event::TasksRefreshed {
            count: tasks.len(),
            at: at(self.now_ms),
        }])
    }

    fn outcome_event(&self, outcome: ToggleOutcome) -> Event {
        match outcome {
            ToggleOutcome::Confirmed { task_id, done } => Event::CompletionChanged {
                task_id,
                done,
                at: at(self.now_ms),
            },
            ToggleOutcome::RolledBack {
                task_id,
                done,
                error,
            } => Event::CompletionRolledBack {
                task_id,
                done,
                message: error.to_string(),
                at: at(self.now_ms),
            },
        }
    }

    /// Teardown: stops every timer and any open camera stream.
    pub fn dispose(&mut self) {
        self.gesture.dispose(&mut self.timers);
        self.panic.dispose(&mut self.timers);
    }

    fn clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }
}

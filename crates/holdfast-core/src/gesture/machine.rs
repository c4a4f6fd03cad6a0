//! Commitment gesture state machine.
//!
//! Converts a continuous press into either a completion commit or a one-shot
//! panic signal. Like the rest of the crate it owns no threads: progress is
//! recomputed from elapsed wall-clock time on every tick of a single
//! periodic timer held in a [`TimerSlot`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Holding -> Idle                 (held to 100: commit)
//!         Holding -> Depleting -> Panic -> Idle
//!         any     -> Holding              (fresh press supersedes)
//! ```
//!
//! The decay window is time-fixed: whatever progress the press reached,
//! depletion always hits zero exactly `decay_ms` after release. When
//! `tick_ms` does not divide a window, the last poll is replaced by a
//! one-shot landing on the window's end, so commit and panic are never late.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;
use crate::timer::{TimerId, TimerQueue, TimerSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Idle,
    Holding,
    Depleting,
    /// Momentary: set while the panic signal is being dispatched.
    Panic,
}

/// Timing for the hold and decay windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureConfig {
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    #[serde(default = "default_decay_ms")]
    pub decay_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_hold_ms() -> u64 {
    5_000
}
fn default_decay_ms() -> u64 {
    2_500
}
fn default_tick_ms() -> u64 {
    50
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            hold_ms: default_hold_ms(),
            decay_ms: default_decay_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

/// Read-only view of the active gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureSession {
    pub task_id: Option<TaskId>,
    pub phase: GesturePhase,
    /// 0.0 ..= 100.0
    pub progress: f64,
    pub started_at_ms: u64,
}

/// What a press or tick asks the caller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureOutput {
    /// The hold reached 100: commit completion for the task.
    Committed(TaskId),
    /// Decay reached zero: open the capture pipeline for the task.
    Panic(TaskId),
}

/// Result of a press-start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PressOutcome {
    /// The task is already done today; nothing changed.
    Ignored,
    Started,
    /// Started, abandoning the gesture on another task.
    Superseded { abandoned: TaskId },
}

#[derive(Debug)]
pub struct GestureStateMachine {
    config: GestureConfig,
    phase: GesturePhase,
    task_id: Option<TaskId>,
    progress: f64,
    started_at_ms: u64,
    decay_from: f64,
    decay_started_ms: u64,
    timer: TimerSlot,
    /// One-shot: set when panic fires, reset on the next entry into Holding.
    panic_fired: bool,
}

impl GestureStateMachine {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            phase: GesturePhase::Idle,
            task_id: None,
            progress: 0.0,
            started_at_ms: 0,
            decay_from: 0.0,
            decay_started_ms: 0,
            timer: TimerSlot::new(),
            panic_fired: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// True while the penalty window is running; collaborators dim
    /// unrelated controls.
    pub fn emphasis_active(&self) -> bool {
        matches!(self.phase, GesturePhase::Depleting | GesturePhase::Panic)
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer.owns(id)
    }

    pub fn is_ticking(&self, timers: &TimerQueue) -> bool {
        self.timer.is_armed(timers)
    }

    pub fn session(&self) -> GestureSession {
        GestureSession {
            task_id: self.task_id.clone(),
            phase: self.phase,
            progress: self.progress,
            started_at_ms: self.started_at_ms,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin holding `task_id`. An in-flight hold or decay on any task is
    /// cancelled first and never resumed.
    pub fn press_start(
        &mut self,
        timers: &mut TimerQueue,
        task_id: TaskId,
        already_completed: bool,
        now_ms: u64,
    ) -> PressOutcome {
        if already_completed {
            tracing::debug!(task = %task_id, "press ignored, task already completed");
            return PressOutcome::Ignored;
        }

        let abandoned = match self.phase {
            GesturePhase::Holding | GesturePhase::Depleting => self.task_id.take(),
            _ => None,
        };

        self.timer.cancel(timers);
        self.phase = GesturePhase::Holding;
        self.task_id = Some(task_id.clone());
        self.progress = 0.0;
        self.started_at_ms = now_ms;
        self.panic_fired = false;
        self.timer.arm_every(timers, now_ms, self.config.tick_ms);
        self.land_on(timers, now_ms, now_ms.saturating_add(self.config.hold_ms));
        tracing::debug!(task = %task_id, "hold started");

        match abandoned {
            Some(prev) if prev != task_id => PressOutcome::Superseded { abandoned: prev },
            _ => PressOutcome::Started,
        }
    }

    /// Release the press. Returns the progress decay starts from, or `None`
    /// if nothing was holding.
    pub fn press_end(&mut self, timers: &mut TimerQueue, now_ms: u64) -> Option<f64> {
        if self.phase != GesturePhase::Holding {
            return None;
        }

        if self.progress >= 100.0 {
            self.reset(timers);
            return None;
        }

        self.phase = GesturePhase::Depleting;
        self.decay_from = self.progress;
        self.decay_started_ms = now_ms;
        self.timer.arm_every(timers, now_ms, self.config.tick_ms);
        self.land_on(timers, now_ms, now_ms.saturating_add(self.config.decay_ms));
        tracing::debug!(progress = self.decay_from, "released early, decaying");
        Some(self.decay_from)
    }

    /// Route a fired timer. Timers not held by this machine are ignored.
    pub fn on_timer(
        &mut self,
        timers: &mut TimerQueue,
        id: TimerId,
        now_ms: u64,
    ) -> Option<GestureOutput> {
        if !self.timer.owns(id) {
            return None;
        }
        self.tick(timers, now_ms)
    }

    /// Advance progress to `now_ms`.
    pub fn tick(&mut self, timers: &mut TimerQueue, now_ms: u64) -> Option<GestureOutput> {
        match self.phase {
            GesturePhase::Holding => {
                let elapsed = now_ms.saturating_sub(self.started_at_ms) as f64;
                self.progress = (elapsed * 100.0 / self.config.hold_ms.max(1) as f64).min(100.0);
                if self.progress >= 100.0 {
                    let task = self.task_id.clone()?;
                    self.reset(timers);
                    tracing::info!(task = %task, "hold completed, committing");
                    return Some(GestureOutput::Committed(task));
                }
                let deadline = self.started_at_ms.saturating_add(self.config.hold_ms);
                self.land_on(timers, now_ms, deadline);
                None
            }
            GesturePhase::Depleting => {
                let elapsed = now_ms.saturating_sub(self.decay_started_ms) as f64;
                let remaining = 1.0 - elapsed / self.config.decay_ms.max(1) as f64;
                self.progress = (self.decay_from * remaining).max(0.0);
                if self.progress <= 0.0 && !self.panic_fired {
                    self.panic_fired = true;
                    let task = self.task_id.take()?;
                    self.timer.cancel(timers);
                    self.progress = 0.0;
                    self.phase = GesturePhase::Panic;
                    tracing::info!(task = %task, "decay depleted, panic");
                    return Some(GestureOutput::Panic(task));
                }
                let deadline = self.decay_started_ms.saturating_add(self.config.decay_ms);
                self.land_on(timers, now_ms, deadline);
                None
            }
            GesturePhase::Idle | GesturePhase::Panic => None,
        }
    }

    /// Swap the poll for a one-shot at `deadline` if the next poll would
    /// overshoot it.
    fn land_on(&mut self, timers: &mut TimerQueue, now_ms: u64, deadline: u64) {
        let remaining = deadline.saturating_sub(now_ms);
        if remaining > 0 && remaining < self.config.tick_ms {
            self.timer.arm_once(timers, now_ms, remaining);
        }
    }

    /// Leave the momentary panic phase once the signal has been dispatched.
    pub fn clear_panic(&mut self) {
        if self.phase == GesturePhase::Panic {
            self.phase = GesturePhase::Idle;
        }
    }

    /// Return to idle, stopping any running timer.
    pub fn reset(&mut self, timers: &mut TimerQueue) {
        self.timer.cancel(timers);
        self.phase = GesturePhase::Idle;
        self.task_id = None;
        self.progress = 0.0;
    }

    /// Teardown. Must be called before the owner goes away.
    pub fn dispose(&mut self, timers: &mut TimerQueue) {
        self.reset(timers);
    }
}

impl Default for GestureStateMachine {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

//! Optimistic toggle of "done today" with rollback.
//!
//! A toggle flips the mirror synchronously, then awaits the remote write.
//! The lock is only held between suspension points, so rapid toggles issued
//! before earlier writes answer each read the mirror as last written.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::mirror::{rebuild, reconcile, CompletionMirror, PendingChange, RemoteOutcome};
use crate::error::RemoteError;
use crate::remote::HabitStore;
use crate::task::{Task, TaskId};

/// How a toggle settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Confirmed { task_id: TaskId, done: bool },
    RolledBack {
        task_id: TaskId,
        /// Membership after the rollback.
        done: bool,
        error: RemoteError,
    },
}

#[derive(Debug, Default)]
struct SyncState {
    mirror: CompletionMirror,
    in_flight: BTreeMap<u64, PendingChange>,
    next_seq: u64,
    tasks: Vec<Task>,
}

pub struct CompletionSyncEngine {
    store: Arc<dyn HabitStore>,
    state: Mutex<SyncState>,
}

impl CompletionSyncEngine {
    pub fn new(store: Arc<dyn HabitStore>) -> Self {
        Self {
            store,
            state: Mutex::new(SyncState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_done(&self, task_id: &TaskId) -> bool {
        self.lock().mirror.is_done(task_id)
    }

    /// Snapshot of the mirror. Read-only for callers.
    pub fn mirror(&self) -> CompletionMirror {
        self.lock().mirror.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn title_of(&self, task_id: &TaskId) -> Option<String> {
        self.lock()
            .tasks
            .iter()
            .find(|t| &t.id == task_id)
            .map(|t| t.title.clone())
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    // ── Synchronous halves ───────────────────────────────────────────

    /// Flip membership now and record the intent.
    pub fn begin_toggle(&self, task_id: &TaskId) -> PendingChange {
        let mut state = self.lock();
        let next = !state.mirror.is_done(task_id);
        Self::begin_locked(&mut state, task_id, next)
    }

    /// Set membership to done now, whatever it was.
    pub fn begin_mark_done(&self, task_id: &TaskId) -> PendingChange {
        let mut state = self.lock();
        Self::begin_locked(&mut state, task_id, true)
    }

    fn begin_locked(state: &mut SyncState, task_id: &TaskId, next: bool) -> PendingChange {
        state.next_seq += 1;
        let previous = state.mirror.set(task_id, next);
        let change = PendingChange {
            seq: state.next_seq,
            task_id: task_id.clone(),
            previous,
            next,
        };
        state.in_flight.insert(change.seq, change.clone());
        change
    }

    /// Settle a flip once its write has answered.
    pub fn finish(&self, change: &PendingChange, result: Result<(), RemoteError>) -> ToggleOutcome {
        let mut guard = self.lock();
        let state = &mut *guard;
        // The recorded copy may carry a previous value handed down by an
        // earlier failed flip.
        let change = state
            .in_flight
            .remove(&change.seq)
            .unwrap_or_else(|| change.clone());

        let outcome = match &result {
            Ok(()) => RemoteOutcome::Confirmed,
            Err(_) => RemoteOutcome::Failed,
        };
        let successor = state
            .in_flight
            .range_mut(change.seq + 1..)
            .map(|(_, later)| later)
            .find(|later| later.task_id == change.task_id);
        state.mirror = reconcile(&state.mirror, &change, successor, outcome);

        match result {
            Ok(()) => ToggleOutcome::Confirmed {
                task_id: change.task_id.clone(),
                done: change.next,
            },
            Err(error) => {
                tracing::warn!(
                    task = %change.task_id,
                    restored = change.previous,
                    %error,
                    "completion write failed, rolled back"
                );
                ToggleOutcome::RolledBack {
                    task_id: change.task_id.clone(),
                    done: state.mirror.is_done(&change.task_id),
                    error,
                }
            }
        }
    }

    // ── Remote round-trips ───────────────────────────────────────────

    async fn write(&self, change: &PendingChange) -> Result<(), RemoteError> {
        if change.next {
            let record = self.store.insert_completion(&change.task_id).await?;
            tracing::debug!(task = %change.task_id, record = %record.id, "completion inserted");
        } else {
            let removed = self.store.delete_today(&change.task_id).await?;
            tracing::debug!(task = %change.task_id, removed, "completions deleted");
        }
        Ok(())
    }

    async fn settle(&self, change: PendingChange) -> ToggleOutcome {
        let result = self.write(&change).await;
        let outcome = self.finish(&change, result);
        if matches!(outcome, ToggleOutcome::Confirmed { .. }) {
            if let Err(err) = self.refresh().await {
                tracing::warn!(error = %err, "refetch after completion write failed");
            }
        }
        outcome
    }

    /// Flip "done today" for `task_id`. No automatic retry.
    pub async fn toggle(&self, task_id: &TaskId) -> ToggleOutcome {
        let change = self.begin_toggle(task_id);
        self.settle(change).await
    }

    /// Commit path used by a completed hold. Inserts unconditionally.
    pub async fn mark_done(&self, task_id: &TaskId) -> ToggleOutcome {
        let change = self.begin_mark_done(task_id);
        self.settle(change).await
    }

    /// Refetch the task list and rebuild the mirror from it.
    pub async fn refresh(&self) -> Result<Vec<Task>, RemoteError> {
        let tasks = self.store.fetch_tasks().await?;
        let mut state = self.lock();
        state.mirror = rebuild(&tasks, state.in_flight.values());
        state.tasks = tasks.clone();
        Ok(tasks)
    }
}

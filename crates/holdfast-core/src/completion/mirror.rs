//! Client-local "done today" mirror and its reconciliation rules.
//!
//! The mirror is never authoritative. Two functions define every way it can
//! change after an optimistic flip:
//!
//! - [`reconcile`] settles one flip once its remote write answers: keep it on
//!   confirmation, restore exactly the pre-flip value on failure. A failed
//!   flip that a later unanswered flip of the same task was read from hands
//!   its pre-flip value down to that flip instead of touching the mirror.
//! - [`rebuild`] replaces the mirror with a fresh remote list, re-applying
//!   flips whose writes have not answered yet.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMirror {
    done: BTreeSet<TaskId>,
}

impl CompletionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self {
            done: tasks
                .iter()
                .filter(|t| t.completed_today)
                .map(|t| t.id.clone())
                .collect(),
        }
    }

    pub fn is_done(&self, task_id: &TaskId) -> bool {
        self.done.contains(task_id)
    }

    /// Set membership. Returns the previous value.
    pub fn set(&mut self, task_id: &TaskId, done: bool) -> bool {
        if done {
            !self.done.insert(task_id.clone())
        } else {
            self.done.remove(task_id)
        }
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.done.iter()
    }
}

/// One optimistic flip awaiting its remote write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Issue order; later flips were read from the mirror as this one left it.
    pub seq: u64,
    pub task_id: TaskId,
    pub previous: bool,
    pub next: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Confirmed,
    Failed,
}

/// Settle `change` against `local`.
///
/// `successor` is the earliest unanswered flip of the same task issued after
/// `change`, if any.
pub fn reconcile(
    local: &CompletionMirror,
    change: &PendingChange,
    successor: Option<&mut PendingChange>,
    outcome: RemoteOutcome,
) -> CompletionMirror {
    let mut next = local.clone();
    if outcome == RemoteOutcome::Failed {
        match successor {
            Some(later) => later.previous = change.previous,
            None => {
                next.set(&change.task_id, change.previous);
            }
        }
    }
    next
}

/// Mirror for a fresh remote list, with unanswered flips applied in issue
/// order on top.
pub fn rebuild<'a>(
    remote: &[Task],
    in_flight: impl IntoIterator<Item = &'a PendingChange>,
) -> CompletionMirror {
    let mut mirror = CompletionMirror::from_tasks(remote);
    let mut pending: Vec<&PendingChange> = in_flight.into_iter().collect();
    pending.sort_by_key(|c| c.seq);
    for change in pending {
        mirror.set(&change.task_id, change.next);
    }
    mirror
}

//! Cooperative timer queue.
//!
//! The queue owns no threads. A single driver calls [`TimerQueue::pop_due`]
//! with the current time and routes each fired handle to the component that
//! armed it. Because fires are handed out one at a time, a tick always
//! completes before the next one is observed.
//!
//! ```text
//! start_once / start_every -> armed -> (fired | cancelled)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Once,
    Every(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    deadline_ms: u64,
    repeat: Repeat,
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    /// The deadline the timer was armed for (epoch milliseconds).
    pub at_ms: u64,
}

/// Every scheduled timer in the process.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: BTreeMap<TimerId, Entry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once, `delay_ms` after `now_ms`.
    pub fn start_once(&mut self, now_ms: u64, delay_ms: u64) -> TimerId {
        self.insert(now_ms.saturating_add(delay_ms), Repeat::Once)
    }

    /// Fire every `period_ms`, first at `now_ms + period_ms`.
    pub fn start_every(&mut self, now_ms: u64, period_ms: u64) -> TimerId {
        let period = period_ms.max(1);
        self.insert(now_ms.saturating_add(period), Repeat::Every(period))
    }

    /// Returns `true` if the timer was still armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Earliest deadline among armed timers.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|e| e.deadline_ms).min()
    }

    /// Pop the earliest timer whose deadline is at or before `now_ms`.
    ///
    /// Ties are broken by creation order. One-shot timers are removed;
    /// periodic timers re-arm at `deadline + period`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Fired> {
        let (id, deadline_ms) = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline_ms <= now_ms)
            .min_by_key(|(id, e)| (e.deadline_ms, **id))
            .map(|(id, e)| (*id, e.deadline_ms))?;

        let repeat = self.entries.get(&id).map(|e| e.repeat)?;
        match repeat {
            Repeat::Once => {
                self.entries.remove(&id);
            }
            Repeat::Every(period) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.deadline_ms = deadline_ms.saturating_add(period);
                }
            }
        }

        Some(Fired { id, at_ms: deadline_ms })
    }

    fn insert(&mut self, deadline_ms: u64, repeat: Repeat) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.entries.insert(id, Entry { deadline_ms, repeat });
        id
    }
}

/// The single timer a component is allowed to hold for one purpose.
///
/// Arming always cancels the previously held timer first, so two timers can
/// never drive the same state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerSlot {
    id: Option<TimerId>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_once(&mut self, timers: &mut TimerQueue, now_ms: u64, delay_ms: u64) -> TimerId {
        self.cancel(timers);
        let id = timers.start_once(now_ms, delay_ms);
        self.id = Some(id);
        id
    }

    pub fn arm_every(&mut self, timers: &mut TimerQueue, now_ms: u64, period_ms: u64) -> TimerId {
        self.cancel(timers);
        let id = timers.start_every(now_ms, period_ms);
        self.id = Some(id);
        id
    }

    /// Returns `true` if an armed timer was cancelled.
    pub fn cancel(&mut self, timers: &mut TimerQueue) -> bool {
        match self.id.take() {
            Some(id) => timers.cancel(id),
            None => false,
        }
    }

    /// Whether `id` is the timer held by this slot.
    pub fn owns(&self, id: TimerId) -> bool {
        self.id == Some(id)
    }

    pub fn is_armed(&self, timers: &TimerQueue) -> bool {
        self.id.is_some_and(|id| timers.is_active(id))
    }

    /// Forget a one-shot timer that has just fired.
    pub fn clear_fired(&mut self, fired: TimerId) {
        if self.id == Some(fired) {
            self.id = None;
        }
    }
}

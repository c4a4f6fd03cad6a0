mod queue;

pub use queue::{Fired, TimerId, TimerQueue, TimerSlot};

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

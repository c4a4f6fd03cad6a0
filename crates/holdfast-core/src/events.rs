use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskId;

/// Every externally visible state change produces an Event.
/// Front ends render from them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GestureStarted {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    /// A press began while another task was holding or decaying.
    GestureSuperseded {
        abandoned: TaskId,
        by: TaskId,
        at: DateTime<Utc>,
    },
    GestureReleased {
        task_id: TaskId,
        progress: f64,
        at: DateTime<Utc>,
    },
    Committed {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    PanicTriggered {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    CompletionChanged {
        task_id: TaskId,
        done: bool,
        at: DateTime<Utc>,
    },
    /// The remote write failed and the optimistic flip was undone.
    CompletionRolledBack {
        task_id: TaskId,
        done: bool,
        message: String,
        at: DateTime<Utc>,
    },
    TasksRefreshed {
        count: usize,
        at: DateTime<Utc>,
    },
    CameraLive {
        session_id: Uuid,
        caption: String,
        at: DateTime<Utc>,
    },
    CameraFailed {
        session_id: Uuid,
        message: String,
        at: DateTime<Utc>,
    },
    CaptionHidden {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    PhotoCaptured {
        session_id: Uuid,
        bytes: usize,
        cache_key: String,
        at: DateTime<Utc>,
    },
    /// The capture trigger fired but a guard or precondition stopped it.
    CaptureSkipped {
        session_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
    UploadStarted {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    UploadSucceeded {
        session_id: Uuid,
        url: String,
        at: DateTime<Utc>,
    },
    UploadFailed {
        session_id: Uuid,
        message: String,
        at: DateTime<Utc>,
    },
    PunishmentReady {
        session_id: Uuid,
        url: String,
        at: DateTime<Utc>,
    },
    PunishmentFailed {
        session_id: Uuid,
        message: String,
        at: DateTime<Utc>,
    },
    PopupClosed {
        session_id: Uuid,
        task_id: TaskId,
        at: DateTime<Utc>,
    },
}

/// Convert a driver timestamp into the event clock.
pub fn at(now_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(now_ms as i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_snake_case() {
        let ev = Event::PanicTriggered {
            task_id: TaskId::from("read"),
            at: at(2_500),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "panic_triggered");
        assert_eq!(json["task_id"], "read");
        assert_eq!(json["at"], "1970-01-01T00:00:02.500Z");
    }
}

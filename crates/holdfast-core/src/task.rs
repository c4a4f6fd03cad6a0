//! Task records as the remote store reports them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity of a task in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Read-mostly copy of a remote task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Whether a completion record dated today exists.
    pub completed_today: bool,
    /// Display-only counter maintained by the store.
    #[serde(default)]
    pub streak: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed_today: false,
            streak: 0,
        }
    }

    pub fn completed(mut self) -> Self {
        self.completed_today = true;
        self
    }
}

/// A "done on this day" record returned by an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: String,
    pub task_id: TaskId,
    pub completed_on: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serializes_camel_case() {
        let task = Task::new("t1", "Drink water").completed();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], "t1");
        assert_eq!(json["completedToday"], true);
        assert_eq!(json["streak"], 0);
    }

    #[test]
    fn streak_defaults_when_missing() {
        let task: Task =
            serde_json::from_str(r#"{"id":"t2","title":"Read","completedToday":false}"#).unwrap();
        assert_eq!(task.streak, 0);
        assert_eq!(task.id.as_str(), "t2");
    }
}

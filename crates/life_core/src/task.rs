use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::repository::Record;
use crate::store::Fields;

/// Task priority, 1 (highest) through 4 (none).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const NONE: Priority = Priority(4);

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NONE
    }
}

impl TryFrom<u8> for Priority {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=4).contains(&value) {
            Ok(Priority(value))
        } else {
            Err(CoreError::InvalidRecord(format!(
                "priority must be between 1 and 4, got {value}"
            )))
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            title: title.into(),
            notes: String::new(),
            completed: false,
            completed_at: None,
            due_date: None,
            priority: Priority::default(),
            tags: Vec::new(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Open and due on or before `date`.
    pub fn is_due_by(&self, date: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due <= date)
    }

    pub fn set_completed(&mut self, completed: bool, at: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(at);
        self.updated_at = at;
    }
}

impl Record for Task {
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn complete_patch(patch: &mut Fields, now: DateTime<Utc>) {
        let Some(completed) = patch.get("completed").and_then(Value::as_bool) else {
            return;
        };
        let stamp = if completed {
            Value::String(now.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        } else {
            Value::Null
        };
        patch.entry("completedAt").or_insert(stamp);
    }
}

/// Ids of `root` and every task nested beneath it, parents first.
pub fn descendant_ids(tasks: &[Task], root: &str) -> Vec<String> {
    let mut ordered = vec![root.to_string()];
    let mut idx = 0;
    while idx < ordered.len() {
        let parent = ordered[idx].clone();
        for task in tasks {
            if task.parent_id.as_deref() == Some(parent.as_str()) && !ordered.contains(&task.id) {
                ordered.push(task.id.clone());
            }
        }
        idx += 1;
    }
    ordered
}

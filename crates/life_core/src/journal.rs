use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Record;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub focus_area_ids: Vec<String>,
    /// 1 (low) through 5 (high).
    #[serde(default)]
    pub mood: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn key(date: NaiveDate) -> String {
        format!("entry_{}", date.format("%Y-%m-%d"))
    }

    pub fn new(date: NaiveDate, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Self::key(date),
            date,
            content: content.into(),
            focus_area_ids: Vec::new(),
            mood: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for JournalEntry {
    const COLLECTION: &'static str = "journalEntries";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl FocusArea {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            color: None,
        }
    }
}

impl Record for FocusArea {
    const COLLECTION: &'static str = "focusAreas";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

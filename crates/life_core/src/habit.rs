use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::repository::Record;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub habit_type: HabitType,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub comparison: Comparison,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub focus_area_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum HabitType {
    Binary,
    Count,
    Duration,
    Checklist,
}

/// How a logged numeric value is measured against the habit's target.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Comparison {
    GreaterThan,
    #[default]
    AtLeast,
    LessThan,
    Exactly,
    AnyValue,
}

impl Comparison {
    pub fn holds(self, value: f64, target: f64) -> bool {
        match self {
            Comparison::GreaterThan => value > target,
            Comparison::AtLeast => value >= target,
            Comparison::LessThan => value < target,
            Comparison::Exactly => (value - target).abs() < f64::EPSILON,
            Comparison::AnyValue => value > 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekdays {
        days: Vec<Weekday>,
    },
    #[serde(rename_all = "camelCase")]
    EveryNDays {
        every: u32,
        anchor: NaiveDate,
    },
    TimesPerWeek {
        times: u32,
    },
}

impl HabitFrequency {
    /// Whether the habit is scheduled on `date`.
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        match self {
            HabitFrequency::Daily => true,
            HabitFrequency::Weekdays { days } => days.contains(&date.weekday()),
            HabitFrequency::EveryNDays { every, anchor } => {
                if date < *anchor {
                    return false;
                }
                let every = i64::from((*every).max(1));
                (date - *anchor).num_days() % every == 0
            }
            // The user picks which days count towards the weekly quota.
            HabitFrequency::TimesPerWeek { .. } => true,
        }
    }
}

impl Habit {
    pub fn new(title: impl Into<String>, habit_type: HabitType) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            title: title.into(),
            habit_type,
            frequency: HabitFrequency::Daily,
            target: None,
            comparison: Comparison::default(),
            unit: None,
            checklist: Vec::new(),
            focus_area_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_target(mut self, target: f64, comparison: Comparison) -> Self {
        self.target = Some(target);
        self.comparison = comparison;
        self
    }

    pub fn with_frequency(mut self, frequency: HabitFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_checklist<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checklist = titles
            .into_iter()
            .enumerate()
            .map(|(idx, title)| ChecklistItem {
                id: format!("item-{}", idx + 1),
                title: title.into(),
            })
            .collect();
        self
    }

    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        date >= self.created_at.date_naive() && self.frequency.is_due_on(date)
    }
}

impl Record for Habit {
    const COLLECTION: &'static str = "habits";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LogStatus {
    Done,
    Partial,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitLog {
    #[serde(default)]
    pub id: String,
    pub habit_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: LogStatus,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub completed_items: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl HabitLog {
    /// Document id for the single log a habit may have on `date`.
    pub fn key(habit_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", habit_id, date.format("%Y-%m-%d"))
    }

    pub fn new(habit_id: impl Into<String>, date: NaiveDate) -> Self {
        let habit_id = habit_id.into();
        Self {
            id: Self::key(&habit_id, date),
            habit_id,
            date,
            status: LogStatus::None,
            value: None,
            completed_items: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Record for HabitLog {
    const COLLECTION: &'static str = "habitLogs";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Progress the user records for a habit on one day.
#[derive(Debug, Clone, PartialEq)]
pub enum HabitProgress {
    Done,
    Undone,
    Value(f64),
    Items(Vec<String>),
}

impl HabitProgress {
    pub(crate) fn apply_to(self, log: &mut HabitLog) {
        match self {
            HabitProgress::Done => log.status = LogStatus::Done,
            HabitProgress::Undone => log.status = LogStatus::None,
            HabitProgress::Value(value) => log.value = Some(value),
            HabitProgress::Items(items) => log.completed_items = items,
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::habit::{Habit, HabitLog, HabitProgress, HabitType};
use crate::journal::{FocusArea, JournalEntry};
use crate::repository::{Record, Repository};
use crate::session::Session;
use crate::status::{self, HabitEvaluation};
use crate::store::{DocumentStore, MemoryStore};
use crate::task::{self, Task};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitDay {
    pub habit: Habit,
    pub log: Option<HabitLog>,
    pub evaluation: HabitEvaluation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub habits: Vec<HabitDay>,
    pub tasks_due: Vec<Task>,
    pub journal: Option<JournalEntry>,
}

/// Feature operations over the signed-in user's collections.
pub struct LifeService {
    store: Arc<dyn DocumentStore>,
    session: Session,
    habits: Repository<Habit>,
    habit_logs: Repository<HabitLog>,
    tasks: Repository<Task>,
    journal: Repository<JournalEntry>,
    focus_areas: Repository<FocusArea>,
}

pub struct LifeServiceBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    session: Option<Session>,
}

impl LifeServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            session: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Falls back to an in-memory store and a signed-out session.
    pub fn build(self) -> LifeService {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>);
        let session = self.session.unwrap_or_default();
        LifeService {
            habits: Repository::new(Arc::clone(&store), session.clone()),
            habit_logs: Repository::new(Arc::clone(&store), session.clone()),
            tasks: Repository::new(Arc::clone(&store), session.clone()),
            journal: Repository::new(Arc::clone(&store), session.clone()),
            focus_areas: Repository::new(Arc::clone(&store), session.clone()),
            store,
            session,
        }
    }
}

impl Default for LifeServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LifeService {
    pub fn builder() -> LifeServiceBuilder {
        LifeServiceBuilder::new()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn task_repository(&self) -> Repository<Task> {
        self.tasks.clone()
    }

    pub fn habit_repository(&self) -> Repository<Habit> {
        self.habits.clone()
    }

    pub fn journal_repository(&self) -> Repository<JournalEntry> {
        self.journal.clone()
    }

    // Habits

    pub async fn create_habit(&self, habit: Habit) -> Result<Habit> {
        if habit.title.trim().is_empty() {
            return Err(CoreError::InvalidRecord("habit title is empty".into()));
        }
        self.habits.add(habit).await
    }

    pub async fn habits(&self) -> Result<Vec<Habit>> {
        let mut habits = self.habits.list().await?;
        habits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(habits)
    }

    #[instrument(skip(self))]
    pub async fn delete_habit(&self, habit_id: &str) -> Result<()> {
        for log in self.logs_for_habit(habit_id).await? {
            self.habit_logs.delete(&log.id).await?;
        }
        self.habits.delete(habit_id).await
    }

    pub async fn logs_for_habit(&self, habit_id: &str) -> Result<Vec<HabitLog>> {
        let mut logs: Vec<HabitLog> = self
            .habit_logs
            .list()
            .await?
            .into_iter()
            .filter(|log| log.habit_id == habit_id)
            .collect();
        logs.sort_by_key(|log| log.date);
        Ok(logs)
    }

    pub async fn log_for(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitLog>> {
        self.habit_logs.find(&HabitLog::key(habit_id, date)).await
    }

    /// Apply `progress` to the habit's log for `date` and store the resulting status.
    #[instrument(skip(self))]
    pub async fn record_progress(
        &self,
        habit_id: &str,
        date: NaiveDate,
        progress: HabitProgress,
    ) -> Result<HabitDay> {
        let habit = self.habits.get(habit_id).await?;
        let mut log = self
            .log_for(habit_id, date)
            .await?
            .unwrap_or_else(|| HabitLog::new(habit_id, date));

        progress.apply_to(&mut log);
        if !matches!(habit.habit_type, HabitType::Binary) {
            log.status = status::evaluate(&habit, Some(&log)).status.into();
        }
        log.updated_at = Utc::now();
        self.habit_logs.put(&log).await?;
        tracing::info!(habit = %habit_id, %date, status = ?log.status, "habit progress recorded");

        let evaluation = status::evaluate(&habit, Some(&log));
        Ok(HabitDay {
            habit,
            log: Some(log),
            evaluation,
        })
    }

    pub async fn daily_snapshot(&self, date: NaiveDate) -> Result<DailySnapshot> {
        let logs: HashMap<String, HabitLog> = self
            .habit_logs
            .list()
            .await?
            .into_iter()
            .filter(|log| log.date == date)
            .map(|log| (log.habit_id.clone(), log))
            .collect();

        let habits = self
            .habits()
            .await?
            .into_iter()
            .filter(|habit| habit.is_due_on(date))
            .map(|habit| {
                let log = logs.get(&habit.id).cloned();
                let evaluation = status::evaluate(&habit, log.as_ref());
                HabitDay {
                    habit,
                    log,
                    evaluation,
                }
            })
            .collect();

        let mut tasks_due: Vec<Task> = self
            .tasks
            .list()
            .await?
            .into_iter()
            .filter(|task| task.is_due_by(date))
            .collect();
        tasks_due.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.due_date.cmp(&b.due_date))
                .then_with(|| a.title.cmp(&b.title))
        });

        Ok(DailySnapshot {
            date,
            habits,
            tasks_due,
            journal: self.journal_entry(date).await?,
        })
    }

    // Tasks

    pub async fn create_task(&self, task: Task) -> Result<Task> {
        if task.title.trim().is_empty() {
            return Err(CoreError::InvalidRecord("task title is empty".into()));
        }
        if let Some(parent) = &task.parent_id {
            self.tasks.get(parent).await?;
        }
        self.tasks.add(task).await
    }

    pub async fn add_subtask(&self, parent_id: &str, title: impl Into<String>) -> Result<Task> {
        let mut subtask = Task::new(title);
        subtask.parent_id = Some(parent_id.to_string());
        self.create_task(subtask).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self.tasks.list().await?;
        tasks.sort_by(|a, b| {
            a.completed
                .cmp(&b.completed)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(tasks)
    }

    pub async fn subtasks_of(&self, parent_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .tasks()
            .await?
            .into_iter()
            .filter(|task| task.parent_id.as_deref() == Some(parent_id))
            .collect())
    }

    pub async fn set_task_completed(&self, task_id: &str, completed: bool) -> Result<Task> {
        let mut task = self.tasks.get(task_id).await?;
        task.set_completed(completed, Utc::now());
        self.tasks.put(&task).await?;
        Ok(task)
    }

    /// Delete a task together with every subtask nested beneath it.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: &str) -> Result<usize> {
        let tasks = self.tasks.list().await?;
        if !tasks.iter().any(|task| task.id == task_id) {
            return Err(CoreError::not_found(Task::COLLECTION, task_id));
        }
        let doomed = task::descendant_ids(&tasks, task_id);
        for id in doomed.iter().rev() {
            self.tasks.delete(id).await?;
        }
        tracing::info!(task = %task_id, removed = doomed.len(), "task deleted");
        Ok(doomed.len())
    }

    // Journal

    pub async fn create_focus_area(&self, area: FocusArea) -> Result<FocusArea> {
        if area.name.trim().is_empty() {
            return Err(CoreError::InvalidRecord("focus area name is empty".into()));
        }
        self.focus_areas.add(area).await
    }

    pub async fn focus_areas(&self) -> Result<Vec<FocusArea>> {
        let mut areas = self.focus_areas.list().await?;
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(areas)
    }

    pub async fn journal_entry(&self, date: NaiveDate) -> Result<Option<JournalEntry>> {
        self.journal.find(&JournalEntry::key(date)).await
    }

    /// Write the entry for `entry.date`, replacing any earlier entry that day.
    pub async fn write_journal_entry(&self, mut entry: JournalEntry) -> Result<JournalEntry> {
        if let Some(mood) = entry.mood {
            if !(1..=5).contains(&mood) {
                return Err(CoreError::InvalidRecord(format!(
                    "mood must be between 1 and 5, got {mood}"
                )));
            }
        }
        entry.id = JournalEntry::key(entry.date);
        if let Some(existing) = self.journal_entry(entry.date).await? {
            entry.created_at = existing.created_at;
        }
        entry.updated_at = Utc::now();
        self.journal.put(&entry).await?;
        Ok(entry)
    }

    /// Entries dated within `from..=to`, oldest first.
    pub async fn journal_entries(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>> {
        let mut entries: Vec<JournalEntry> = self
            .journal
            .list()
            .await?
            .into_iter()
            .filter(|entry| entry.date >= from && entry.date <= to)
            .collect();
        entries.sort_by_key(|entry| entry.date);
        Ok(entries)
    }
}

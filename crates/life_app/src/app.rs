use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use life_core::{
    habit::HabitProgress, task::Task, DocumentStore, JsonFileStore, LifeService, Session, UserId,
};
use life_sync::{PendingWrites, SaveState, TaskEditor};
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 800;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) user: Option<String>,
    pub(crate) autosave_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_vars(|name| std::env::var(name).ok()))
    }

    /// Build from `lookup`, skipping any variable that is blank or unparseable.
    pub(crate) fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("LIFE_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(user) = lookup("LIFE_USER") {
            let user = user.trim();
            if !user.is_empty() {
                config.user = Some(user.to_string());
            }
        }
        if let Some(delay) = lookup("LIFE_AUTOSAVE_DELAY_MS") {
            match delay.trim().parse::<u64>() {
                Ok(millis) => config.autosave_delay = Duration::from_millis(millis),
                Err(err) => warn!(%delay, %err, "ignoring LIFE_AUTOSAVE_DELAY_MS"),
            }
        }
        config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn autosave_delay(&self) -> Duration {
        self.autosave_delay
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share/life"))
            .unwrap_or_else(|| PathBuf::from("life-data"));
        Self {
            data_dir,
            user: None,
            autosave_delay: Duration::from_millis(DEFAULT_AUTOSAVE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Today(Option<NaiveDate>),
    Habits,
    Log {
        habit_id: String,
        progress: HabitProgress,
        date: Option<NaiveDate>,
    },
    Tasks,
    AddTask(String),
    CompleteTask(String),
    EditTask {
        task_id: String,
        field: String,
        value: Value,
    },
}

impl Command {
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Today(None));
        };
        match (name.as_str(), rest) {
            ("today", []) => Ok(Command::Today(None)),
            ("today", [date]) => Ok(Command::Today(Some(parse_date(date)?))),
            ("habits", []) => Ok(Command::Habits),
            ("log", [habit_id, progress, tail @ ..]) if tail.len() <= 1 => Ok(Command::Log {
                habit_id: habit_id.clone(),
                progress: parse_progress(progress)?,
                date: tail.first().map(|d| parse_date(d)).transpose()?,
            }),
            ("tasks", []) => Ok(Command::Tasks),
            ("task-add", words) if !words.is_empty() => Ok(Command::AddTask(words.join(" "))),
            ("task-done", [task_id]) => Ok(Command::CompleteTask(task_id.clone())),
            ("task-edit", [task_id, field, raw]) => Ok(Command::EditTask {
                task_id: task_id.clone(),
                field: field.clone(),
                // Bare words are taken as strings.
                value: serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
            }),
            _ => bail!("unrecognised command: {}", args.join(" ")),
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date `{raw}`"))
}

fn parse_progress(raw: &str) -> Result<HabitProgress> {
    match raw {
        "done" => Ok(HabitProgress::Done),
        "undone" => Ok(HabitProgress::Undone),
        _ => {
            if let Some(items) = raw.strip_prefix("items:") {
                return Ok(HabitProgress::Items(
                    items
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect(),
                ));
            }
            raw.parse::<f64>()
                .map(HabitProgress::Value)
                .map_err(|_| anyhow!("progress must be done, undone, a number or items:a,b"))
        }
    }
}

pub fn build_service(config: &AppConfig) -> Result<LifeService> {
    let user = config
        .user
        .clone()
        .context("LIFE_USER must name the signed-in user")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("unable to prepare {}", config.data_dir.display()))?;
    info!(path = %config.data_dir.display(), %user, "opening data directory");
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(&config.data_dir));
    Ok(LifeService::builder()
        .with_store(store)
        .with_session(Session::signed_in(UserId::new(user)))
        .build())
}

pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    let service = build_service(&config)?;
    debug!(?command, "dispatching");
    let today = Local::now().date_naive();

    match command {
        Command::Today(date) => {
            let snapshot = service.daily_snapshot(date.unwrap_or(today)).await?;
            for day in &snapshot.habits {
                println!(
                    "{} {} ({:.0}%)",
                    day.evaluation.status.glyph(),
                    day.habit.title,
                    day.evaluation.progress * 100.0
                );
            }
            for task in &snapshot.tasks_due {
                println!("☐ {} {}", task.priority, task.title);
            }
        }
        Command::Habits => {
            for habit in service.habits().await? {
                println!("{}\t{:?}\t{}", habit.id, habit.habit_type, habit.title);
            }
        }
        Command::Log {
            habit_id,
            progress,
            date,
        } => {
            let day = service
                .record_progress(&habit_id, date.unwrap_or(today), progress)
                .await?;
            println!("{} {}", day.evaluation.status.glyph(), day.habit.title);
        }
        Command::Tasks => {
            for task in service.tasks().await? {
                let mark = if task.completed { "☑" } else { "☐" };
                let indent = if task.is_subtask() { "  " } else { "" };
                println!("{indent}{mark} {}\t{}", task.id, task.title);
            }
        }
        Command::AddTask(title) => {
            let task = service.create_task(Task::new(title)).await?;
            println!("{}", task.id);
        }
        Command::CompleteTask(task_id) => {
            let task = service.set_task_completed(&task_id, true).await?;
            println!("☑ {}", task.title);
        }
        Command::EditTask {
            task_id,
            field,
            value,
        } => {
            let editor = TaskEditor::new(
                service.task_repository(),
                task_id,
                Arc::new(PendingWrites::new()),
                config.autosave_delay,
            );
            editor.edit(&field, value)?;
            match editor.flush().await {
                SaveState::Error(message) => bail!("save failed: {message}"),
                state => println!("{state:?}"),
            }
        }
    }
    Ok(())
}

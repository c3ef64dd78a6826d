use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use life_core::{task::Task, AutoSaveManager, Fields, Record, Repository, Result};

use crate::pending::{PendingWrites, SaveState, WriteKey};

#[derive(Debug, Clone)]
struct StagedValue {
    revision: u64,
    value: Value,
}

/// Auto-saving editor for one stored record.
///
/// Edits are staged in [`PendingWrites`] immediately and written field by
/// field once the debounce delay passes. Failed writes stay visible through
/// [`RecordEditor::save_state`] until [`RecordEditor::retry`] succeeds.
pub struct RecordEditor<T: Record> {
    repo: Repository<T>,
    record_id: String,
    writes: Arc<PendingWrites>,
    autosave: AutoSaveManager<StagedValue>,
    delay: Duration,
    registered: Mutex<HashSet<String>>,
}

pub type TaskEditor = RecordEditor<Task>;

impl<T: Record> RecordEditor<T> {
    pub fn new(
        repo: Repository<T>,
        record_id: impl Into<String>,
        writes: Arc<PendingWrites>,
        delay: Duration,
    ) -> Self {
        Self {
            repo,
            record_id: record_id.into(),
            writes,
            autosave: AutoSaveManager::new(),
            delay,
            registered: Mutex::new(HashSet::new()),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Use `delay` for `field` instead of the editor default.
    pub fn set_field_delay(&self, field: &str, delay: Duration) {
        self.register(field, delay);
    }

    /// Stage `value` for `field` and schedule its debounced write.
    pub fn edit(&self, field: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        if !self.registered.lock().contains(field) {
            self.register(field, self.delay);
        }
        let revision = self.writes.stage(self.key(field), value.clone());
        self.autosave
            .trigger_save(field, StagedValue { revision, value })
    }

    pub fn save_state(&self) -> SaveState {
        self.writes.save_state(T::COLLECTION, &self.record_id)
    }

    /// Re-send every failed write now. Returns the resulting save state.
    #[instrument(skip(self), fields(record = %self.record_id))]
    pub async fn retry(&self) -> SaveState {
        for write in self.writes.failed(T::COLLECTION, &self.record_id) {
            tracing::info!(field = %write.key.field, attempts = write.attempts, "retrying save");
            let staged = StagedValue {
                revision: write.revision,
                value: write.value,
            };
            if let Err(err) = persist(&self.repo, &self.writes, &write.key, staged).await {
                tracing::warn!(field = %write.key.field, %err, "retry failed");
            }
        }
        self.save_state()
    }

    /// Cancel waiting timers and write everything staged right away.
    #[instrument(skip(self), fields(record = %self.record_id))]
    pub async fn flush(&self) -> SaveState {
        self.autosave.cancel_all_saves();
        for write in self.writes.staged(T::COLLECTION, &self.record_id) {
            let staged = StagedValue {
                revision: write.revision,
                value: write.value,
            };
            if let Err(err) = persist(&self.repo, &self.writes, &write.key, staged).await {
                tracing::warn!(field = %write.key.field, %err, "flush failed");
            }
        }
        self.save_state()
    }

    /// Drop edits still waiting on their timer and forget settled writes.
    /// Writes already sent still reach the store.
    pub fn close(&self) {
        self.autosave.cancel_all_saves();
        let dropped = self.writes.release(T::COLLECTION, &self.record_id);
        if dropped > 0 {
            tracing::debug!(record = %self.record_id, dropped, "discarded unsaved edits");
        }
    }

    fn key(&self, field: &str) -> WriteKey {
        WriteKey::new(T::COLLECTION, self.record_id.clone(), field)
    }

    fn register(&self, field: &str, delay: Duration) {
        let repo = self.repo.clone();
        let writes = Arc::clone(&self.writes);
        let key = self.key(field);
        self.autosave.register_field(
            field,
            move |staged: StagedValue| {
                let repo = repo.clone();
                let writes = Arc::clone(&writes);
                let key = key.clone();
                async move { persist(&repo, &writes, &key, staged).await }
            },
            delay,
        );
        self.registered.lock().insert(field.to_string());
    }
}

impl<T: Record> Drop for RecordEditor<T> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn persist<T: Record>(
    repo: &Repository<T>,
    writes: &PendingWrites,
    key: &WriteKey,
    staged: StagedValue,
) -> Result<()> {
    if !writes.begin(key, staged.revision) {
        return Ok(());
    }
    let mut patch = Fields::new();
    patch.insert(key.field.clone(), staged.value);
    match repo.update_fields(&key.record_id, patch).await {
        Ok(()) => {
            writes.confirm(key, staged.revision);
            Ok(())
        }
        Err(err) => {
            writes.fail(key, staged.revision, err.to_string());
            Err(err)
        }
    }
}

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field of one record awaiting persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteKey {
    pub collection: String,
    pub record_id: String,
    pub field: String,
}

impl WriteKey {
    pub fn new(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            record_id: record_id.into(),
            field: field.into(),
        }
    }

    fn belongs_to(&self, collection: &str, record_id: &str) -> bool {
        self.collection == collection && self.record_id == record_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteState {
    Staged,
    InFlight,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub key: WriteKey,
    pub value: Value,
    pub revision: u64,
    pub state: WriteState,
    pub attempts: u32,
}

/// What a view shows for a record while its edits are being saved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum SaveState {
    Idle,
    Saving,
    Saved,
    Error(String),
}

#[derive(Default)]
struct Ledger {
    writes: BTreeMap<WriteKey, PendingWrite>,
    next_revision: u64,
}

/// Tracks optimistic local edits until the store confirms or rejects them.
///
/// Every staged value gets a fresh revision. Confirmations and failures carry
/// the revision they were issued for and are ignored once a newer value has
/// been staged for the same key.
#[derive(Default)]
pub struct PendingWrites {
    ledger: Mutex<Ledger>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, key: WriteKey, value: Value) -> u64 {
        let mut ledger = self.ledger.lock();
        ledger.next_revision += 1;
        let revision = ledger.next_revision;
        let attempts = ledger.writes.get(&key).map_or(0, |write| write.attempts);
        ledger.writes.insert(
            key.clone(),
            PendingWrite {
                key,
                value,
                revision,
                state: WriteState::Staged,
                attempts,
            },
        );
        revision
    }

    /// Mark the write as in flight. False when `revision` is stale or the
    /// write is not waiting to be sent.
    pub fn begin(&self, key: &WriteKey, revision: u64) -> bool {
        let mut ledger = self.ledger.lock();
        let Some(write) = ledger.writes.get_mut(key) else {
            return false;
        };
        if write.revision != revision
            || !matches!(write.state, WriteState::Staged | WriteState::Failed(_))
        {
            return false;
        }
        write.state = WriteState::InFlight;
        write.attempts += 1;
        true
    }

    pub fn confirm(&self, key: &WriteKey, revision: u64) {
        self.settle(key, revision, WriteState::Confirmed);
    }

    pub fn fail(&self, key: &WriteKey, revision: u64, message: impl Into<String>) {
        self.settle(key, revision, WriteState::Failed(message.into()));
    }

    fn settle(&self, key: &WriteKey, revision: u64, state: WriteState) {
        let mut ledger = self.ledger.lock();
        match ledger.writes.get_mut(key) {
            Some(write) if write.revision == revision => write.state = state,
            Some(_) => {
                tracing::debug!(field = %key.field, revision, "ignoring settle of superseded write")
            }
            None => {}
        }
    }

    pub fn get(&self, key: &WriteKey) -> Option<PendingWrite> {
        self.ledger.lock().writes.get(key).cloned()
    }

    pub fn for_record(&self, collection: &str, record_id: &str) -> Vec<PendingWrite> {
        self.ledger
            .lock()
            .writes
            .values()
            .filter(|write| write.key.belongs_to(collection, record_id))
            .cloned()
            .collect()
    }

    pub fn failed(&self, collection: &str, record_id: &str) -> Vec<PendingWrite> {
        self.for_record(collection, record_id)
            .into_iter()
            .filter(|write| matches!(write.state, WriteState::Failed(_)))
            .collect()
    }

    pub fn staged(&self, collection: &str, record_id: &str) -> Vec<PendingWrite> {
        self.for_record(collection, record_id)
            .into_iter()
            .filter(|write| write.state == WriteState::Staged)
            .collect()
    }

    /// Forget a record's writes once its editor is gone. Failed writes are
    /// kept so a later editor can still surface and retry them. Returns how
    /// many staged values were dropped unsent.
    pub fn release(&self, collection: &str, record_id: &str) -> usize {
        let mut ledger = self.ledger.lock();
        let mut unsent = 0;
        ledger.writes.retain(|key, write| {
            if !key.belongs_to(collection, record_id) {
                return true;
            }
            match write.state {
                WriteState::Failed(_) => true,
                WriteState::Staged => {
                    unsent += 1;
                    false
                }
                WriteState::InFlight | WriteState::Confirmed => false,
            }
        });
        unsent
    }

    pub fn save_state(&self, collection: &str, record_id: &str) -> SaveState {
        let writes = self.for_record(collection, record_id);
        if let Some(message) = writes.iter().find_map(|write| match &write.state {
            WriteState::Failed(message) => Some(message.clone()),
            _ => None,
        }) {
            return SaveState::Error(message);
        }
        if writes
            .iter()
            .any(|write| matches!(write.state, WriteState::Staged | WriteState::InFlight))
        {
            return SaveState::Saving;
        }
        if writes.is_empty() {
            SaveState::Idle
        } else {
            SaveState::Saved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(field: &str) -> WriteKey {
        WriteKey::new("tasks", "t1", field)
    }

    #[test]
    fn stale_confirmation_does_not_mark_newer_value_saved() {
        let writes = PendingWrites::new();
        let first = writes.stage(key("title"), json!("Dra"));
        assert!(writes.begin(&key("title"), first));
        let second = writes.stage(key("title"), json!("Draft"));

        writes.confirm(&key("title"), first);
        assert_eq!(writes.get(&key("title")).unwrap().state, WriteState::Staged);
        assert_eq!(writes.save_state("tasks", "t1"), SaveState::Saving);

        assert!(writes.begin(&key("title"), second));
        writes.confirm(&key("title"), second);
        assert_eq!(writes.save_state("tasks", "t1"), SaveState::Saved);
    }

    #[test]
    fn failure_dominates_record_state() {
        let writes = PendingWrites::new();
        let title = writes.stage(key("title"), json!("x"));
        let notes = writes.stage(key("notes"), json!("y"));
        writes.begin(&key("title"), title);
        writes.confirm(&key("title"), title);
        writes.begin(&key("notes"), notes);
        writes.fail(&key("notes"), notes, "offline");

        assert_eq!(
            writes.save_state("tasks", "t1"),
            SaveState::Error("offline".into())
        );
        assert_eq!(writes.failed("tasks", "t1").len(), 1);
        assert_eq!(writes.save_state("tasks", "other"), SaveState::Idle);
    }

    #[test]
    fn begin_rejects_unknown_or_in_flight_writes() {
        let writes = PendingWrites::new();
        assert!(!writes.begin(&key("title"), 1));
        let rev = writes.stage(key("title"), json!("x"));
        assert!(writes.begin(&key("title"), rev));
        assert!(!writes.begin(&key("title"), rev));
        assert_eq!(writes.get(&key("title")).unwrap().attempts, 1);
    }

    #[test]
    fn release_keeps_only_failures_of_the_record() {
        let writes = PendingWrites::new();
        writes.stage(key("title"), json!("x"));
        let notes = writes.stage(key("notes"), json!("y"));
        writes.begin(&key("notes"), notes);
        writes.confirm(&key("notes"), notes);
        let tags = writes.stage(key("tags"), json!(["a"]));
        writes.begin(&key("tags"), tags);
        writes.fail(&key("tags"), tags, "offline");
        writes.stage(WriteKey::new("tasks", "t2", "title"), json!("z"));

        assert_eq!(writes.release("tasks", "t1"), 1);
        let left = writes.for_record("tasks", "t1");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key.field, "tags");
        assert_eq!(writes.staged("tasks", "t2").len(), 1);
    }

    #[test]
    fn save_state_serializes_with_message() {
        let json = serde_json::to_value(SaveState::Error("boom".into())).unwrap();
        assert_eq!(json, json!({ "state": "error", "message": "boom" }));
        let json = serde_json::to_value(SaveState::Saved).unwrap();
        assert_eq!(json, json!({ "state": "saved" }));
    }
}

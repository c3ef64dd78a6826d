use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::compat;
use crate::error::{CoreError, Result};
use crate::session::Session;
use crate::store::{Document, DocumentStore, Fields};

/// A domain type stored as one document in a named collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// Add fields that must change together with those already in `patch`.
    fn complete_patch(_patch: &mut Fields, _now: DateTime<Utc>) {}
}

/// Typed access to one collection of the signed-in user.
pub struct Repository<T: Record> {
    store: Arc<dyn DocumentStore>,
    session: Session,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: self.session.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>, session: Session) -> Self {
        Self {
            store,
            session,
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    /// Every readable record. Documents that fail to decode are skipped.
    pub async fn list(&self) -> Result<Vec<T>> {
        let user = self.session.require_user()?;
        let docs = self.store.get_all(&user, T::COLLECTION).await?;
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            match decode::<T>(doc) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        collection = T::COLLECTION,
                        %id,
                        %err,
                        "skipping malformed document"
                    );
                }
            }
        }
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> Result<T> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::not_found(T::COLLECTION, id))
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        Ok(self.list().await?.into_iter().find(|record| record.id() == id))
    }

    /// Store a new record under a generated id and return it with that id.
    pub async fn add(&self, mut record: T) -> Result<T> {
        let user = self.session.require_user()?;
        let id = self.store.add(&user, T::COLLECTION, encode(&record)?).await?;
        tracing::debug!(collection = T::COLLECTION, %id, "record added");
        record.set_id(id);
        Ok(record)
    }

    /// Create or overwrite the record under its own id.
    pub async fn put(&self, record: &T) -> Result<()> {
        if record.id().is_empty() {
            return Err(CoreError::InvalidRecord(format!(
                "{} record has no id",
                T::COLLECTION
            )));
        }
        let user = self.session.require_user()?;
        self.store
            .set(&user, T::COLLECTION, record.id(), encode(record)?)
            .await
    }

    /// Merge `patch` into the stored document, stamping `updatedAt`.
    ///
    /// The merged result must still decode as `T`. Fields `T` does not have
    /// are rejected with [`CoreError::UnknownField`], values it cannot hold
    /// with [`CoreError::InvalidRecord`], and nothing is written.
    pub async fn update_fields(&self, id: &str, mut patch: Fields) -> Result<()> {
        let user = self.session.require_user()?;
        let now = Utc::now();
        patch.remove("id");
        T::complete_patch(&mut patch, now);
        patch.insert(
            "updatedAt".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );

        let mut merged = encode(&self.get(id).await?)?;
        if let Some(field) = patch.keys().find(|field| !merged.contains_key(*field)) {
            return Err(CoreError::UnknownField(format!("{}.{field}", T::COLLECTION)));
        }
        merged.extend(patch.iter().map(|(key, value)| (key.clone(), value.clone())));
        serde_json::from_value::<T>(Value::Object(merged)).map_err(|err| {
            CoreError::InvalidRecord(format!("{} {id}: {err}", T::COLLECTION))
        })?;

        self.store.update(&user, T::COLLECTION, id, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let user = self.session.require_user()?;
        self.store.delete(&user, T::COLLECTION, id).await?;
        tracing::debug!(collection = T::COLLECTION, %id, "record deleted");
        Ok(())
    }
}

fn encode<T: Record>(record: &T) -> Result<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(CoreError::InvalidRecord(format!(
            "{} encoded to non-object {other}",
            T::COLLECTION
        ))),
    }
}

fn decode<T: Record>(doc: Document) -> Result<T> {
    let mut value = Value::Object(doc.data);
    compat::normalize_document(T::COLLECTION, &mut value);
    let mut record: T = serde_json::from_value(value)?;
    record.set_id(doc.id);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{Habit, HabitType};
    use crate::session::UserId;
    use crate::store::MemoryStore;
    use crate::task::Task;
    use serde_json::json;

    fn repo<T: Record>(store: Arc<MemoryStore>) -> Repository<T> {
        Repository::new(store, Session::signed_in(UserId::new("u1")))
    }

    #[tokio::test]
    async fn add_assigns_id_and_list_reads_back() {
        let store = Arc::new(MemoryStore::new());
        let tasks = repo::<Task>(store);
        let added = tasks.add(Task::new("Buy milk")).await.unwrap();
        assert!(!added.id.is_empty());

        let listed = tasks.list().await.unwrap();
        assert_eq!(listed, vec![added]);
    }

    #[tokio::test]
    async fn requires_signed_in_user() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let tasks: Repository<Task> = Repository::new(store, Session::signed_out());
        assert!(matches!(tasks.list().await, Err(CoreError::NotSignedIn)));
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u1");
        store.seed(&user, "tasks", "broken", json!({ "title": 42 }));
        let tasks = repo::<Task>(Arc::clone(&store));
        tasks.add(Task::new("ok")).await.unwrap();
        let listed = tasks.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "ok");
    }

    #[tokio::test]
    async fn update_fields_merges_and_stamps() {
        let store = Arc::new(MemoryStore::new());
        let tasks = repo::<Task>(store);
        let added = tasks.add(Task::new("Draft")).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("title".into(), json!("Final"));
        tasks.update_fields(&added.id, patch).await.unwrap();

        let updated = tasks.get(&added.id).await.unwrap();
        assert_eq!(updated.title, "Final");
        assert!(updated.updated_at >= added.updated_at);
    }

    #[tokio::test]
    async fn update_fields_rejects_values_the_record_cannot_hold() {
        let store = Arc::new(MemoryStore::new());
        let tasks = repo::<Task>(store);
        let added = tasks.add(Task::new("Draft")).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("priority".into(), json!(9));
        let err = tasks.update_fields(&added.id, patch).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord(msg) if msg.contains("priority")));

        let mut patch = Fields::new();
        patch.insert("colour".into(), json!("red"));
        let err = tasks.update_fields(&added.id, patch).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownField(field) if field == "tasks.colour"));

        assert_eq!(tasks.list().await.unwrap(), vec![added]);
    }

    #[tokio::test]
    async fn update_fields_on_missing_record_is_not_found() {
        let tasks = repo::<Task>(Arc::new(MemoryStore::new()));
        let mut patch = Fields::new();
        patch.insert("title".into(), json!("x"));
        assert!(matches!(
            tasks.update_fields("nope", patch).await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn completing_through_a_patch_stamps_completed_at() {
        let tasks = repo::<Task>(Arc::new(MemoryStore::new()));
        let added = tasks.add(Task::new("Draft")).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("completed".into(), json!(true));
        tasks.update_fields(&added.id, patch).await.unwrap();
        let done = tasks.get(&added.id).await.unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        let mut patch = Fields::new();
        patch.insert("completed".into(), json!(false));
        tasks.update_fields(&added.id, patch).await.unwrap();
        assert_eq!(tasks.get(&added.id).await.unwrap().completed_at, None);
    }

    #[tokio::test]
    async fn legacy_documents_decode_through_compat() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u1");
        store.seed(
            &user,
            "habits",
            "legacy",
            json!({
                "title": "Run",
                "habitType": "yes_no",
                "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
                "updatedAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
            }),
        );
        let habits = repo::<Habit>(store);
        let habit = habits.get("legacy").await.unwrap();
        assert_eq!(habit.habit_type, HabitType::Binary);
        assert_eq!(habit.created_at.timestamp(), 1_700_000_000);
    }
}

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::session::UserId;

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

/// Per-user document collections offered by the backend.
///
/// `update` merges top-level fields into an existing document and fails with
/// [`CoreError::NotFound`] when it is absent. `delete` of a missing document
/// succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, user: &UserId, collection: &str) -> Result<Vec<Document>>;

    async fn add(&self, user: &UserId, collection: &str, data: Fields) -> Result<String>;

    async fn set(&self, user: &UserId, collection: &str, id: &str, data: Fields) -> Result<()>;

    async fn update(&self, user: &UserId, collection: &str, id: &str, patch: Fields)
        -> Result<()>;

    async fn delete(&self, user: &UserId, collection: &str, id: &str) -> Result<()>;
}

type Collection = BTreeMap<String, Fields>;

fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn merge_into(collection: &mut Collection, name: &str, id: &str, patch: Fields) -> Result<()> {
    let doc = collection
        .get_mut(id)
        .ok_or_else(|| CoreError::not_found(name, id))?;
    doc.extend(patch);
    Ok(())
}

/// In-process store, used offline and by tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<(UserId, String), Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw document as-is, bypassing the typed layer.
    pub fn seed(&self, user: &UserId, collection: &str, id: &str, data: Value) {
        let fields = match data {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        };
        self.collections
            .write()
            .entry((user.clone(), collection.to_string()))
            .or_default()
            .insert(id.to_string(), fields);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_all(&self, user: &UserId, collection: &str) -> Result<Vec<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(&(user.clone(), collection.to_string()))
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, user: &UserId, collection: &str, data: Fields) -> Result<String> {
        let id = new_document_id();
        self.set(user, collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, user: &UserId, collection: &str, id: &str, data: Fields) -> Result<()> {
        self.collections
            .write()
            .entry((user.clone(), collection.to_string()))
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(
        &self,
        user: &UserId,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(&(user.clone(), collection.to_string()))
            .ok_or_else(|| CoreError::not_found(collection, id))?;
        merge_into(docs, collection, id, patch)
    }

    async fn delete(&self, user: &UserId, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self
            .collections
            .write()
            .get_mut(&(user.clone(), collection.to_string()))
        {
            docs.remove(id);
        }
        Ok(())
    }
}

/// Store keeping one JSON file per user and collection under a data directory.
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, user: &UserId, collection: &str) -> Result<PathBuf> {
        for part in [user.as_str(), collection] {
            let safe = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
            if !safe {
                return Err(CoreError::InvalidRecord(format!(
                    "`{part}` is not a valid storage key"
                )));
            }
        }
        Ok(self
            .root
            .join(user.as_str())
            .join(format!("{collection}.json")))
    }

    async fn read_collection(&self, path: &Path) -> Result<Collection> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Collection::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Collection::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_collection(&self, path: &Path, docs: &Collection) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(docs)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn modify<F>(&self, user: &UserId, collection: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Collection) -> Result<()> + Send,
    {
        let path = self.collection_path(user, collection)?;
        let _guard = self.write_lock.lock().await;
        let mut docs = self.read_collection(&path).await?;
        apply(&mut docs)?;
        self.write_collection(&path, &docs).await?;
        tracing::debug!(path = %path.display(), documents = docs.len(), "collection written");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get_all(&self, user: &UserId, collection: &str) -> Result<Vec<Document>> {
        let path = self.collection_path(user, collection)?;
        let docs = self.read_collection(&path).await?;
        Ok(docs
            .into_iter()
            .map(|(id, data)| Document { id, data })
            .collect())
    }

    async fn add(&self, user: &UserId, collection: &str, data: Fields) -> Result<String> {
        let id = new_document_id();
        self.set(user, collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, user: &UserId, collection: &str, id: &str, data: Fields) -> Result<()> {
        self.modify(user, collection, |docs| {
            docs.insert(id.to_string(), data);
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        user: &UserId,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<()> {
        self.modify(user, collection, |docs| {
            merge_into(docs, collection, id, patch)
        })
        .await
    }

    async fn delete(&self, user: &UserId, collection: &str, id: &str) -> Result<()> {
        self.modify(user, collection, |docs| {
            docs.remove(id);
            Ok(())
        })
        .await
    }
}

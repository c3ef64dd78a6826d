use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no signed-in user")]
    NotSignedIn,
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("auto-save requires a running tokio runtime")]
    NoRuntime,
    #[error("store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("submission {0} already reached a terminal state")]
    AlreadyTerminal(Uuid),

    #[error("judge queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("unsupported result schema version {0}")]
    Schema(u32),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture path escapes the store root: {0}")]
    InvalidPath(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FixtureError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        FixtureError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

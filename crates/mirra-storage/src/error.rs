use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read index file {path}: {source}")]
    IndexRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("index file {path} is malformed: {source}")]
    IndexMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write index file {path}: {source}")]
    IndexWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recording {id} not found")]
    NotFound { id: String },

    #[error("failed to append recording {id} to {filename}: {source}")]
    RecorderWrite {
        id: String,
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session group {key} already holds the maximum of {max} recordings")]
    GroupSizeExceeded { key: String, max: usize },
}

pub type Result<T> = std::result::Result<T, StorageError>;

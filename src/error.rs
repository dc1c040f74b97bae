use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The engine has not been booted yet and the operation cannot boot it.
    #[error("engine is not initialized: {0}")]
    Initialization(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("file bridge error for {path}: {reason}")]
    FileBridge { path: String, reason: String },
    #[error("arrow error: {0}")]
    Arrow(#[from] duckdb::arrow::error::ArrowError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DataSourceError {
    pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    pub(crate) fn query(err: impl std::fmt::Display) -> Self {
        Self::Query(err.to_string())
    }

    pub(crate) fn file_bridge(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FileBridge {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("engine task failed: {err}"))
    }
}

pub type Result<T, E = DataSourceError> = std::result::Result<T, E>;

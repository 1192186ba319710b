use thiserror::Error;

/// All errors that can occur in citegraph-core.
#[derive(Debug, Error)]
pub enum CiteGraphError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Graph store is busy: {0}")]
    StoreBusy(String),

    #[error("Graph backend error: {0}")]
    Graph(String),

    #[error("Invalid graph query: {0}")]
    InvalidQuery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CiteGraphError {
    /// Whether retrying the same write later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreBusy(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Exit codes used by the `citegraph` binary.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    ConfigError = 4,
    NetworkError = 6,
}

pub type Result<T> = std::result::Result<T, CiteGraphError>;

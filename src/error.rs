use thiserror::Error;

/// Result type for relq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for relq operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entry id must be a positive integer, got {id}")]
    InvalidEntryId { id: i64 },

    #[error("task handler `{name}` is already registered")]
    HandlerAlreadyRegistered { name: String },

    #[error("unsupported store DSN `{dsn}`: expected a postgres:// or sqlite: URL")]
    UnsupportedDsn { dsn: String },
}

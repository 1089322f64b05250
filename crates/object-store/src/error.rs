//! Error types for the mailbox store.

/// Errors that can occur when working with the mailbox store.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A message row exists but its body is gone from object storage
    #[error("message body missing for uid {0}")]
    MissingBody(u64),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before mounting.")]
    BucketNotFound(String),
}

/// Result type alias for mailbox store operations.
pub type Result<T> = std::result::Result<T, MailboxError>;

use thiserror::Error;

/// Custom error type for the storage engine operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// A point in the batch carries no tags, so no series key can be derived for it.
    /// `index` is the position of the first offending point in the submitted batch.
    #[error("Point missing tag at batch index {index}")]
    PointMissingTag { index: usize },

    #[error("Engine is closed")]
    EngineClosed,

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Background task error: {0}")]
    BackgroundTaskError(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        DbError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}

use std::error::Error as StdError;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure of a storage operation.
///
/// The message names the operation and the key or ID it targeted; the
/// underlying transport or serialization error is kept as the source.
/// Absence is never an error: lookups return `None` or an empty list.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StorageError {
    message: String,
    #[source]
    source: BoxError,
}

impl StorageError {
    pub fn new(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Attaches a storage message to a lower-level failure.
pub trait StorageContext<T> {
    fn storage_context<F>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: Into<BoxError>,
{
    fn storage_context<F>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| StorageError::new(message(), err))
    }
}

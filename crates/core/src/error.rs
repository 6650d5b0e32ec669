//! Unified error types for rendercache.
//!
//! None of these reach an HTTP client: the coordinator fails open on every
//! store error and only logs it.

use tokio_rusqlite::rusqlite;

/// Unified error type for the cache core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store is not reachable right now.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Reading an entry failed.
    #[error("READ_FAILED: {0}")]
    ReadFailed(String),

    /// Merging fields into an entry failed.
    #[error("WRITE_FAILED: {0}")]
    WriteFailed(String),

    /// SQLite operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Redis operation failed.
    #[cfg(feature = "redis")]
    #[error("STORE_ERROR: {0}")]
    Redis(#[from] redis::RedisError),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The store target could not be understood.
    #[error("INVALID_STORE_URL: {0}")]
    InvalidStoreUrl(String),

    /// The request URL could not be turned into a cache key.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Whether this error means the store itself went away, as opposed to a
    /// single failed command.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) => true,
            Error::Database(tokio_rusqlite::Error::ConnectionClosed) => true,
            #[cfg(feature = "redis")]
            Error::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

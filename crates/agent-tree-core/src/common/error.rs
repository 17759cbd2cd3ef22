//! Error types for the agent tree service.
//!
//! Errors travel unchanged from the repository up to the transport, which
//! converts them into a `tonic::Status` through the `From` impl below. Nothing
//! in between retries, wraps or recovers.
//!
//! ## Error Cases
//! - `Storage`: the relational store could not be reached or the query
//!   failed. The `sqlx` error is carried as-is.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the agent tree service.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Connectivity or query failure in the relational store.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    /// Whether the failure is about reaching the store rather than the query
    /// itself. Such failures map to `UNAVAILABLE` so clients may retry.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::Storage(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        if err.is_unavailable() {
            return Status::unavailable(err.to_string());
        }
        match err {
            Error::Storage(e) => Status::internal(format!("Storage error: {e}")),
        }
    }
}

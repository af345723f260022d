//! Cancellation primitives for transliteration requests.
//!
//! A `CancellationToken` is owned by the caller and shared with the worker
//! threads of one request. Workers poll it at their check points; the
//! coordinator turns an observed cancellation into `Outcome::Cancelled`.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::VarnamError;

/// Cheaply clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn checkpoint(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a cancellable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The completed value, `None` when cancelled.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Why an internal search stopped early.
#[derive(Debug)]
pub(crate) enum SearchError {
    Cancelled,
    Failed(VarnamError),
}

macro_rules! search_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SearchError {
                fn from(e: $ty) -> Self {
                    SearchError::Failed(e.into())
                }
            }
        )*
    };
}

search_error_from!(
    VarnamError,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    bincode::Error,
);

pub(crate) type SearchResult<T> = Result<T, SearchError>;

/// Split a search result into the public shape.
pub(crate) fn into_outcome<T>(result: SearchResult<T>) -> Result<Outcome<T>, VarnamError> {
    match result {
        Ok(value) => Ok(Outcome::Completed(value)),
        Err(SearchError::Cancelled) => Ok(Outcome::Cancelled),
        Err(SearchError::Failed(e)) => Err(e),
    }
}

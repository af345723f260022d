// core/src/error.rs
//
// Error type shared by the rule table, dictionary, learner and engine.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum VarnamError {
    #[error("rule table not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid rule table: {0}")]
    InvalidRuleTable(String),

    #[error("{word:?} cannot be decomposed into conjuncts of this scheme")]
    Decomposition { word: String },

    #[error("nothing to unlearn for {0:?}")]
    NothingToUnlearn(String),

    #[error("store error: {0}")]
    Store(#[from] redb::Error),

    #[error("store operation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("record serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("search task panicked")]
    TaskPanicked,
}

pub type Result<T> = std::result::Result<T, VarnamError>;

macro_rules! store_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for VarnamError {
                fn from(e: $ty) -> Self {
                    VarnamError::Store(e.into())
                }
            }
        )*
    };
}

store_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_become_store_variant() {
        let err: VarnamError = redb::StorageError::Corrupted("bad page".into()).into();
        assert!(matches!(err, VarnamError::Store(_)));
        assert!(err.to_string().starts_with("store error"));
    }

    #[test]
    fn decomposition_message_names_word() {
        let err = VarnamError::Decomposition {
            word: "abc".into(),
        };
        assert!(err.to_string().contains("\"abc\""));
    }
}

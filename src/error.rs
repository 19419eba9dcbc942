use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::todo::TodoId;

/// Failure delivered on a live listener in place of a snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener on collection '{collection}' failed: {message}")]
pub struct SubscriptionError {
    pub collection: String,
    pub message: String,
}

/// Immediate failures of a request to the remote collection.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: TodoId },

    #[error("document '{id}' is not a JSON object: {source}")]
    Malformed {
        id: TodoId,
        #[source]
        source: serde_json::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("sign-in was cancelled")]
    Cancelled,

    #[error("failed to access session file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session file '{path}' is corrupted: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_collection_and_id() {
        let err = RemoteError::NotFound {
            collection: "u1".into(),
            id: TodoId::new("d9"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'d9'"));
        assert!(msg.contains("'u1'"));
    }

    #[test]
    fn subscription_error_display() {
        let err = SubscriptionError {
            collection: "u1".into(),
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "listener on collection 'u1' failed: permission denied"
        );
    }
}

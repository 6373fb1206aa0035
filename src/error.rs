use std::time::Duration;

use thiserror::Error;

/// Failure of the local key-value store. Never surfaced to the user; loads
/// degrade to defaults and saves are logged.
#[derive(Error, Debug)]
pub enum LocalStoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("local store lock poisoned")]
    Poisoned,
}

/// Failure reported by a [`RemoteStore`](crate::remote::RemoteStore) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote write failed: {0}")]
    WriteFailed(String),
    #[error("batch of {size} mutations exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),
    #[error("batch of {size} mutations exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("history replace stopped after {committed} of {total} chunks: {source}")]
    PartialReplace {
        committed: usize,
        total: usize,
        #[source]
        source: RemoteError,
    },
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("serde: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("local store: {0}")]
    LocalStore(#[from] LocalStoreError),
    #[error("another sync is already in flight")]
    InFlight,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unavailable(msg) => SyncError::RemoteUnavailable(msg),
            RemoteError::WriteFailed(msg) => SyncError::RemoteWriteFailed(msg),
            RemoteError::BatchTooLarge { size, limit } => SyncError::BatchTooLarge { size, limit },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_to_sync_taxonomy() {
        let e: SyncError = RemoteError::Unavailable("offline".into()).into();
        assert!(matches!(e, SyncError::RemoteUnavailable(ref m) if m == "offline"));

        let e: SyncError = RemoteError::BatchTooLarge { size: 600, limit: 500 }.into();
        assert!(matches!(e, SyncError::BatchTooLarge { size: 600, limit: 500 }));
    }

    #[test]
    fn partial_replace_keeps_source() {
        let e = SyncError::PartialReplace {
            committed: 1,
            total: 3,
            source: RemoteError::WriteFailed("denied".into()),
        };
        assert_eq!(
            e.to_string(),
            "history replace stopped after 1 of 3 chunks: remote write failed: denied"
        );
        assert!(std::error::Error::source(&e).is_some());
    }
}

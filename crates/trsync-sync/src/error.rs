//! Failure taxonomy of a sync run and its process exit codes.

use std::path::PathBuf;

use thiserror::Error;
use trsync_storage::StoreError;

/// A failure that halts the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration incomplete in {path}: {detail}")]
    ConfigMissing { path: PathBuf, detail: String },
    #[error("database unreachable: {0}")]
    Connection(#[source] StoreError),
    #[error("reading source window failed: {0}")]
    Query(#[source] StoreError),
    #[error("resync failed and was rolled back: {0}")]
    Sync(#[source] StoreError),
}

impl RunError {
    pub fn config(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        RunError::ConfigMissing {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Classify a source-side failure; a dropped connection is not a bad query.
    pub fn from_source(err: StoreError) -> Self {
        if err.is_connection() {
            RunError::Connection(err)
        } else {
            RunError::Query(err)
        }
    }

    /// Classify a destination write failure.
    pub fn from_destination(err: StoreError) -> Self {
        if matches!(err, StoreError::Connect { .. }) {
            RunError::Connection(err)
        } else {
            RunError::Sync(err)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunError::ConfigMissing { .. } => "config_missing",
            RunError::Connection(_) => "connection",
            RunError::Query(_) => "query",
            RunError::Sync(_) => "sync",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::ConfigMissing { .. } => 2,
            RunError::Connection(_) => 3,
            RunError::Query(_) => 4,
            RunError::Sync(_) => 5,
        }
    }
}

/// A post-sync routine failure. Logged and recorded; never halts the run.
#[derive(Debug, Error)]
#[error("{label} routine {routine} failed: {source}")]
pub struct TriggerError {
    pub label: &'static str,
    pub routine: String,
    #[source]
    pub source: StoreError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_halting_kind_has_its_own_exit_code() {
        let errors = [
            RunError::config("setting.json", "source_url is empty"),
            RunError::Connection(StoreError::Backend("down".into())),
            RunError::Query(StoreError::Backend("bad sql".into())),
            RunError::Sync(StoreError::Backend("insert rejected".into())),
        ];
        let mut codes = errors.iter().map(RunError::exit_code).collect::<Vec<_>>();
        assert!(codes.iter().all(|code| *code > 1));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn source_failures_split_into_connection_and_query() {
        let lost = StoreError::database("fetching window rows", sqlx_io_error());
        assert_eq!(RunError::from_source(lost).kind(), "connection");
        assert_eq!(
            RunError::from_source(StoreError::Backend("syntax error".into())).kind(),
            "query"
        );
    }

    #[test]
    fn destination_write_failures_are_sync_errors() {
        let err = RunError::from_destination(StoreError::Backend("insert rejected".into()));
        assert_eq!(err.kind(), "sync");
        assert!(err.to_string().contains("rolled back"));
    }

    fn sqlx_io_error() -> trsync_storage::SqlxError {
        trsync_storage::SqlxError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ))
    }
}

//! Source/destination store contracts plus PostgreSQL and in-memory backends.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use trsync_core::TransactionRecord;

pub mod ident;
pub mod memory;
pub mod postgres;

pub use ident::{quote_table_name, routine_call_sql};
pub use memory::MemoryStore;
pub use postgres::{PgStore, PoolSettings, DEFAULT_INSERT_BATCH_SIZE};
pub use sqlx::Error as SqlxError;

pub const CRATE_NAME: &str = "trsync-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Source,
    Destination,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Source => f.write_str("source"),
            StoreRole::Destination => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to {role} database: {source}")]
    Connect {
        role: StoreRole,
        #[source]
        source: sqlx::Error,
    },
    #[error("invalid sql identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("encoding rows for insert: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn database(context: impl Into<String>, source: sqlx::Error) -> Self {
        StoreError::Database {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure is the database being unreachable rather than a
    /// statement being rejected.
    pub fn is_connection(&self) -> bool {
        match self {
            StoreError::Connect { .. } => true,
            StoreError::Database { source, .. } => matches!(
                source,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Rows removed and written by one window replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

/// Read side: the append-only transaction table.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Up to `limit` most recent distinct `trans_date` days, newest first.
    async fn recent_dates(&self, table: &str, limit: usize) -> Result<Vec<NaiveDate>, StoreError>;

    /// Every row whose day is in `dates`, ordered by `(trans_date, JobSuffix, oper_num)`.
    async fn fetch_window(
        &self,
        table: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Write side: the synchronized copy and its aggregation routines.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Delete rows dated on or after `boundary`, then append `rows`, as one
    /// unit: on error nothing is changed.
    async fn replace_window(
        &self,
        table: &str,
        boundary: NaiveDate,
        rows: &[TransactionRecord],
    ) -> Result<ReplaceOutcome, StoreError>;

    /// Invoke a zero-argument routine in its own committed statement and
    /// return its result rendered as text.
    async fn call_routine(&self, routine: &str) -> Result<Option<String>, StoreError>;
}

//! Core domain model for windowed transaction resync: records, windows and the
//! pure resource gap-filling pass.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod gap_fill;
pub mod window;

pub use gap_fill::{
    fill_gaps, normalize_resource, resolve, GapFillOutput, GapFillStats, GapFiller, Resolution,
    ResolvedRecord, MANUAL_PROCESS, RESOURCE_TOKEN_LEN,
};
pub use window::{Window, DEFAULT_WINDOW_DAYS};

pub const CRATE_NAME: &str = "trsync-core";

/// Transaction kind as recorded by the source system.
///
/// Only `Move`, `Run` and `Machine` drive gap-filling; every other value is
/// carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransType {
    Move,
    Run,
    Machine,
    Other(String),
}

impl TransType {
    pub fn as_str(&self) -> &str {
        match self {
            TransType::Move => "Move",
            TransType::Run => "Run",
            TransType::Machine => "Machine",
            TransType::Other(raw) => raw,
        }
    }

    /// Labour-side transactions that may borrow a resource from a machine row.
    pub fn borrows_machine_resource(&self) -> bool {
        matches!(self, TransType::Move | TransType::Run)
    }
}

impl From<String> for TransType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "Move" => TransType::Move,
            "Run" => TransType::Run,
            "Machine" => TransType::Machine,
            _ => TransType::Other(raw),
        }
    }
}

impl From<&str> for TransType {
    fn from(raw: &str) -> Self {
        TransType::from(raw.to_string())
    }
}

impl From<TransType> for String {
    fn from(kind: TransType) -> Self {
        match kind {
            TransType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TransType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended transaction row, shaped like the source and destination tables.
///
/// Serialized field names match the table column names so a batch of records
/// can be handed to the database as a JSON recordset. Identifier columns are
/// nullable in the source and a NULL is carried through as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub trans_date: NaiveDateTime,
    #[serde(rename = "JobSuffix")]
    pub job_suffix: Option<String>,
    pub oper_num: Option<String>,
    pub trans_type: Option<TransType>,
    #[serde(rename = "Resources")]
    pub resources: Option<String>,
}

impl TransactionRecord {
    pub fn new(
        trans_date: NaiveDateTime,
        job_suffix: impl Into<String>,
        oper_num: impl Into<String>,
        trans_type: impl Into<TransType>,
        resources: Option<&str>,
    ) -> Self {
        Self {
            trans_date,
            job_suffix: Some(job_suffix.into()),
            oper_num: Some(oper_num.into()),
            trans_type: Some(trans_type.into()),
            resources: resources.map(str::to_string),
        }
    }

    /// Calendar date used for window membership and the resync boundary.
    pub fn trans_day(&self) -> NaiveDate {
        self.trans_date.date()
    }

    pub fn is_machine(&self) -> bool {
        self.trans_type == Some(TransType::Machine)
    }

    pub fn borrows_machine_resource(&self) -> bool {
        self.trans_type
            .as_ref()
            .is_some_and(TransType::borrows_machine_resource)
    }

    /// Lookup identity shared by sibling rows of the same job operation.
    ///
    /// `None` when either part is NULL: a NULL key never matches anything,
    /// not even another NULL.
    pub fn operation_key(&self) -> Option<(&str, &str)> {
        Some((self.job_suffix.as_deref()?, self.oper_num.as_deref()?))
    }

    /// Ordering used for the fetched window: `(trans_date, JobSuffix, oper_num)`
    /// ascending, NULLs after every value as in PostgreSQL.
    pub fn fetch_order_key(&self) -> (NaiveDateTime, NullsLast<'_>, NullsLast<'_>) {
        (
            self.trans_date,
            NullsLast(self.job_suffix.as_deref()),
            NullsLast(self.oper_num.as_deref()),
        )
    }
}

/// Sort key wrapper placing `None` after every `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullsLast<'a>(pub Option<&'a str>);

impl Ord for NullsLast<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for NullsLast<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stable sort into fetch order. Rows sharing a key keep their relative order.
pub fn sort_fetch_order(rows: &mut [TransactionRecord]) {
    rows.sort_by(|a, b| a.fetch_order_key().cmp(&b.fetch_order_key()));
}

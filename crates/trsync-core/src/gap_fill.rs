//! Resource normalization and gap-filling over a fetched window.
//!
//! Every row resolves against the same immutable window snapshot. The only
//! lookup is "last Machine row for this job operation", which is precomputed
//! once per window so resolution is linear in the window size.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TransactionRecord;

/// Fallback written when a labour row has no machine sibling to borrow from.
pub const MANUAL_PROCESS: &str = "MANUAL PROCESS";

/// Length of a canonical resource token.
pub const RESOURCE_TOKEN_LEN: usize = 7;

/// Canonicalize a free-text resource: uppercase, drop spaces, keep the first
/// seven characters. Absent stays absent.
pub fn normalize_resource(raw: Option<&str>) -> Option<String> {
    raw.map(|value| {
        value
            .to_uppercase()
            .chars()
            .filter(|c| *c != ' ')
            .take(RESOURCE_TOKEN_LEN)
            .collect()
    })
}

/// Resolve a single row against `dataset` by scanning it.
///
/// Prefer [`GapFiller`] when resolving a whole window; this is the same rule
/// without the prebuilt index.
pub fn resolve(row: &TransactionRecord, dataset: &[TransactionRecord]) -> Option<String> {
    if row.resources.is_some() {
        return normalize_resource(row.resources.as_deref());
    }
    if !row.borrows_machine_resource() {
        return None;
    }
    let sibling = row.operation_key().and_then(|key| {
        dataset.iter().rposition(|candidate| {
            is_machine_source(candidate) && candidate.operation_key() == Some(key)
        })
    });
    match sibling {
        Some(index) => normalize_resource(dataset[index].resources.as_deref()),
        None => Some(MANUAL_PROCESS.to_string()),
    }
}

fn is_machine_source(row: &TransactionRecord) -> bool {
    row.is_machine() && row.resources.is_some()
}

/// How a row's `Resources` value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Resolution {
    /// The row carried its own value, normalized.
    Normalized,
    /// Borrowed from the Machine row at `from_index` in window order.
    Inferred { from_index: usize },
    /// No Machine sibling in the window.
    Sentinel,
    /// Absent and not eligible for inference.
    Unresolved,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Normalized => "normalized",
            Resolution::Inferred { .. } => "inferred",
            Resolution::Sentinel => "sentinel",
            Resolution::Unresolved => "unresolved",
        }
    }
}

/// A window row ready to be written: `record.resources` holds the resolved value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRecord {
    pub record: TransactionRecord,
    pub raw_resources: Option<String>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFillStats {
    pub normalized: usize,
    pub inferred: usize,
    pub sentinel: usize,
    pub unresolved: usize,
}

impl GapFillStats {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Normalized => self.normalized += 1,
            Resolution::Inferred { .. } => self.inferred += 1,
            Resolution::Sentinel => self.sentinel += 1,
            Resolution::Unresolved => self.unresolved += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.normalized + self.inferred + self.sentinel + self.unresolved
    }
}

#[derive(Debug, Clone, Default)]
pub struct GapFillOutput {
    pub records: Vec<ResolvedRecord>,
    pub stats: GapFillStats,
}

/// Window snapshot plus an index of the last Machine row per job operation.
pub struct GapFiller<'a> {
    dataset: &'a [TransactionRecord],
    last_machine: HashMap<(&'a str, &'a str), usize>,
}

impl<'a> GapFiller<'a> {
    pub fn new(dataset: &'a [TransactionRecord]) -> Self {
        let mut last_machine = HashMap::new();
        for (index, row) in dataset.iter().enumerate() {
            if !is_machine_source(row) {
                continue;
            }
            if let Some(key) = row.operation_key() {
                // later rows overwrite earlier ones: last in fetch order wins
                last_machine.insert(key, index);
            }
        }
        Self {
            dataset,
            last_machine,
        }
    }

    pub fn resolve(&self, row: &TransactionRecord) -> (Option<String>, Resolution) {
        if row.resources.is_some() {
            return (
                normalize_resource(row.resources.as_deref()),
                Resolution::Normalized,
            );
        }
        if !row.borrows_machine_resource() {
            return (None, Resolution::Unresolved);
        }
        match row
            .operation_key()
            .and_then(|key| self.last_machine.get(&key))
        {
            Some(&from_index) => (
                normalize_resource(self.dataset[from_index].resources.as_deref()),
                Resolution::Inferred { from_index },
            ),
            None => (Some(MANUAL_PROCESS.to_string()), Resolution::Sentinel),
        }
    }

    /// Resolve every row of the window, preserving window order.
    pub fn fill(&self) -> GapFillOutput {
        let mut stats = GapFillStats::default();
        let mut records = Vec::with_capacity(self.dataset.len());

        for (index, row) in self.dataset.iter().enumerate() {
            let (value, resolution) = self.resolve(row);
            stats.record(resolution);
            if matches!(resolution, Resolution::Inferred { .. } | Resolution::Sentinel) {
                debug!(
                    row = index,
                    job_suffix = ?row.job_suffix,
                    oper_num = ?row.oper_num,
                    trans_type = ?row.trans_type,
                    resolution = resolution.label(),
                    value = value.as_deref().unwrap_or_default(),
                    "filled missing resource"
                );
            }
            let mut record = row.clone();
            record.resources = value;
            records.push(ResolvedRecord {
                record,
                raw_resources: row.resources.clone(),
                resolution,
            });
        }

        GapFillOutput { records, stats }
    }
}

/// Resolve the whole window in one pass.
pub fn fill_gaps(dataset: &[TransactionRecord]) -> GapFillOutput {
    GapFiller::new(dataset).fill()
}

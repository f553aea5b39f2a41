//! In-process store with the same contracts as [`PgStore`](crate::PgStore),
//! for running the pipeline without a database.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use trsync_core::{sort_fetch_order, TransactionRecord};

use crate::{DestinationStore, ReplaceOutcome, SourceStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<TransactionRecord>>,
    routines: HashMap<String, Option<String>>,
    failing_routines: HashSet<String>,
    routine_calls: Vec<String>,
    fail_inserts: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, rows: Vec<TransactionRecord>) -> Self {
        self.state_mut().tables.insert(table.to_string(), rows);
        self
    }

    /// Register a routine that succeeds with `result`.
    pub fn with_routine(mut self, name: &str, result: Option<&str>) -> Self {
        self.state_mut()
            .routines
            .insert(name.to_string(), result.map(str::to_string));
        self
    }

    /// Register a routine that exists but raises when called.
    pub fn with_failing_routine(mut self, name: &str) -> Self {
        let state = self.state_mut();
        state.routines.insert(name.to_string(), None);
        state.failing_routines.insert(name.to_string());
        self
    }

    /// Make every following `replace_window` fail at the insert step.
    pub fn fail_inserts(&self, fail: bool) -> Result<(), StoreError> {
        self.lock()?.fail_inserts = fail;
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self.lock()?.tables.get(table).cloned().unwrap_or_default())
    }

    pub fn routine_calls(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.routine_calls.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Builders own the store, so there is no other holder to wait for; a
    /// poisoned state is taken over as is.
    fn state_mut(&mut self) -> &mut MemoryState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing_relation(table: &str) -> StoreError {
    StoreError::Backend(format!("relation \"{table}\" does not exist"))
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn recent_dates(&self, table: &str, limit: usize) -> Result<Vec<NaiveDate>, StoreError> {
        let state = self.lock()?;
        let rows = state.tables.get(table).ok_or_else(|| missing_relation(table))?;
        let days = rows.iter().map(TransactionRecord::trans_day).collect::<BTreeSet<_>>();
        Ok(days.into_iter().rev().take(limit).collect())
    }

    async fn fetch_window(
        &self,
        table: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let state = self.lock()?;
        let rows = state.tables.get(table).ok_or_else(|| missing_relation(table))?;
        let mut window = rows
            .iter()
            .filter(|row| dates.contains(&row.trans_day()))
            .cloned()
            .collect::<Vec<_>>();
        sort_fetch_order(&mut window);
        Ok(window)
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn replace_window(
        &self,
        table: &str,
        boundary: NaiveDate,
        rows: &[TransactionRecord],
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut state = self.lock()?;
        let existing = state.tables.get(table).ok_or_else(|| missing_relation(table))?;

        // stage the whole replacement, publish only on success
        let mut staged = existing
            .iter()
            .filter(|row| row.trans_day() < boundary)
            .cloned()
            .collect::<Vec<_>>();
        let deleted = (existing.len() - staged.len()) as u64;
        if state.fail_inserts {
            return Err(StoreError::Backend(format!(
                "insert into \"{table}\" rejected"
            )));
        }
        staged.extend_from_slice(rows);
        state.tables.insert(table.to_string(), staged);

        Ok(ReplaceOutcome {
            deleted,
            inserted: rows.len() as u64,
        })
    }

    async fn call_routine(&self, routine: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.lock()?;
        state.routine_calls.push(routine.to_string());
        if state.failing_routines.contains(routine) {
            return Err(StoreError::Backend(format!("routine {routine} raised an exception")));
        }
        state
            .routines
            .get(routine)
            .cloned()
            .ok_or_else(|| StoreError::Backend(format!("function {routine}() does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, day).expect("valid date")
    }

    fn rec(day: u32, hour: u32, job: &str) -> TransactionRecord {
        TransactionRecord::new(at(day, hour), job, "10", "Run", None)
    }

    #[tokio::test]
    async fn recent_dates_are_distinct_and_newest_first() {
        let store = MemoryStore::new().with_table(
            "src",
            vec![rec(1, 8, "A"), rec(3, 8, "A"), rec(3, 9, "B"), rec(2, 8, "A")],
        );
        assert_eq!(store.recent_dates("src", 2).await.unwrap(), vec![d(3), d(2)]);
        assert_eq!(store.recent_dates("src", 10).await.unwrap(), vec![d(3), d(2), d(1)]);
    }

    #[tokio::test]
    async fn fetch_window_filters_and_orders() {
        let store = MemoryStore::new().with_table(
            "src",
            vec![rec(3, 9, "A"), rec(1, 8, "A"), rec(3, 8, "B"), rec(3, 8, "A")],
        );
        let rows = store.fetch_window("src", &[d(3)]).await.unwrap();
        let keys = rows
            .iter()
            .map(|r| (r.trans_date, r.job_suffix.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![(at(3, 8), "A"), (at(3, 8), "B"), (at(3, 9), "A")]);
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let store = MemoryStore::new();
        let err = store.recent_dates("nope", 7).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn failed_insert_leaves_table_unchanged() {
        let before = vec![rec(1, 8, "A"), rec(2, 8, "A")];
        let store = MemoryStore::new().with_table("dst", before.clone());
        store.fail_inserts(true).unwrap();

        let err = store.replace_window("dst", d(2), &[rec(2, 9, "Z")]).await;
        assert!(err.is_err());
        assert_eq!(store.rows("dst").unwrap(), before);
    }

    #[test]
    fn builders_apply_after_a_poisoned_lock() {
        let store = MemoryStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.state.lock().unwrap();
            panic!("poison the store");
        }));
        assert!(store.state.is_poisoned());

        let store = store
            .with_table("dst", vec![rec(1, 8, "A")])
            .with_routine("rt", Some("ok"));
        let state = store.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(state.tables["dst"], vec![rec(1, 8, "A")]);
        assert_eq!(state.routines["rt"].as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn routines_record_calls_and_failures() {
        let store = MemoryStore::new()
            .with_routine("rt", Some("ok"))
            .with_failing_routine("hist");
        assert_eq!(store.call_routine("rt").await.unwrap().as_deref(), Some("ok"));
        assert!(store.call_routine("hist").await.is_err());
        assert!(store.call_routine("unknown").await.is_err());
        assert_eq!(store.routine_calls().unwrap(), vec!["rt", "hist", "unknown"]);
    }
}

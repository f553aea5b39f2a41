//! PostgreSQL-backed source and destination stores (sqlx).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};
use trsync_core::{TransType, TransactionRecord};

use crate::ident::{quote_table_name, routine_call_sql};
use crate::{DestinationStore, ReplaceOutcome, SourceStore, StoreError, StoreRole};

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub acquire_timeout: Duration,
    pub insert_batch_size: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

type WindowRow = (
    NaiveDateTime,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// One database, used either as the source or as the destination of a run.
///
/// Runs are sequential, so the pool holds a single connection.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    insert_batch_size: usize,
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        role: StoreRole,
        settings: PoolSettings,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|source| StoreError::Connect { role, source })?;
        info!(%role, "connected to database");
        Ok(Self {
            pool,
            insert_batch_size: settings.insert_batch_size.max(1),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SourceStore for PgStore {
    async fn recent_dates(&self, table: &str, limit: usize) -> Result<Vec<NaiveDate>, StoreError> {
        let table = quote_table_name(table)?;
        let sql = format!(
            r#"
            SELECT DISTINCT trans_date::date AS trans_day
              FROM {table}
             WHERE trans_date IS NOT NULL
             ORDER BY trans_day DESC
             LIMIT $1
            "#
        );
        sqlx::query_scalar::<_, NaiveDate>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                StoreError::database(format!("selecting recent dates from {table}"), err)
            })
    }

    async fn fetch_window(
        &self,
        table: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let table = quote_table_name(table)?;
        let sql = format!(
            r#"
            SELECT trans_date::timestamp AS trans_date,
                   "JobSuffix"::text AS job_suffix,
                   oper_num::text AS oper_num,
                   trans_type::text AS trans_type,
                   "Resources"::text AS resources
              FROM {table}
             WHERE trans_date::date = ANY($1)
             ORDER BY trans_date, "JobSuffix", oper_num
            "#
        );
        let rows = sqlx::query_as::<_, WindowRow>(&sql)
            .bind(dates)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| {
                StoreError::database(format!("fetching window rows from {table}"), err)
            })?;

        Ok(rows
            .into_iter()
            .map(
                |(trans_date, job_suffix, oper_num, trans_type, resources)| TransactionRecord {
                    trans_date,
                    job_suffix,
                    oper_num,
                    trans_type: trans_type.map(TransType::from),
                    resources,
                },
            )
            .collect())
    }
}

#[async_trait]
impl DestinationStore for PgStore {
    async fn replace_window(
        &self,
        table: &str,
        boundary: NaiveDate,
        rows: &[TransactionRecord],
    ) -> Result<ReplaceOutcome, StoreError> {
        let table = quote_table_name(table)?;
        let delete_sql = format!("DELETE FROM {table} WHERE trans_date::date >= $1");
        // jsonb_populate_recordset casts every field to the destination's own column type
        let insert_sql = format!(
            r#"
            INSERT INTO {table} (trans_date, "JobSuffix", oper_num, trans_type, "Resources")
            SELECT trans_date, "JobSuffix", oper_num, trans_type, "Resources"
              FROM jsonb_populate_recordset(NULL::{table}, $1)
            "#
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| StoreError::database("opening resync transaction", err))?;

        let deleted = sqlx::query(&delete_sql)
            .bind(boundary)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                StoreError::database(format!("deleting rows from {table} since {boundary}"), err)
            })?
            .rows_affected();

        let mut inserted = 0u64;
        for (batch_no, batch) in rows.chunks(self.insert_batch_size).enumerate() {
            let payload = serde_json::to_value(batch)?;
            inserted += sqlx::query(&insert_sql)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    StoreError::database(format!("inserting batch {batch_no} into {table}"), err)
                })?
                .rows_affected();
            debug!(batch_no, rows = batch.len(), "inserted window batch");
        }

        tx.commit()
            .await
            .map_err(|err| StoreError::database("committing resync transaction", err))?;

        Ok(ReplaceOutcome { deleted, inserted })
    }

    async fn call_routine(&self, routine: &str) -> Result<Option<String>, StoreError> {
        let sql = routine_call_sql(routine)?;
        sqlx::query_scalar::<_, Option<String>>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| StoreError::database(format!("calling routine {routine}"), err))
    }
}

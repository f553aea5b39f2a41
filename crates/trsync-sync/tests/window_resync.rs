use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use trsync_core::{TransType, TransactionRecord};
use trsync_storage::MemoryStore;
use trsync_sync::{RunMode, RunStatus, Settings, SyncConfig, SyncPipeline};

const SRC: &str = "JobTrans";
const DST: &str = "job_trans_copy";

/// D1 is the newest date, D8 the oldest.
fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 30).expect("valid date") - Duration::days(n - 1)
}

fn at(n: i64, hour: u32) -> NaiveDateTime {
    day(n).and_hms_opt(hour, 0, 0).expect("valid time")
}

#[tokio::test]
async fn eight_day_source_resyncs_the_seven_newest_days() {
    let source_rows = vec![
        TransactionRecord::new(at(8, 9), "J-800", "10", "Run", Some("old press")),
        TransactionRecord::new(at(7, 9), "J-700", "10", "Move", Some("saw 1")),
        TransactionRecord::new(at(3, 8), "J-300", "20", "Machine", Some("  cnc 12 machine  ")),
        TransactionRecord::new(at(3, 10), "J-300", "20", "Run", None),
        TransactionRecord::new(at(2, 9), "J-200", "10", "Move", None),
        TransactionRecord::new(at(1, 9), "J-100", "10", "Queue", None),
        TransactionRecord::new(at(6, 9), "J-600", "10", "Run", Some("x")),
        TransactionRecord::new(at(5, 9), "J-500", "10", "Run", Some("y")),
        TransactionRecord::new(at(4, 9), "J-400", "10", "Run", Some("z")),
    ];
    let untouched = vec![
        TransactionRecord::new(at(8, 9), "J-800", "10", "Run", Some("OLDPRES")),
        TransactionRecord::new(at(9, 9), "J-900", "10", "Run", Some("ANCIENT")),
    ];
    let mut existing = untouched.clone();
    existing.push(TransactionRecord::new(at(7, 11), "STALE", "10", "Run", Some("STALE")));
    existing.push(TransactionRecord::new(at(1, 11), "STALE", "10", "Run", Some("STALE")));

    let source = Arc::new(MemoryStore::new().with_table(SRC, source_rows));
    let destination = Arc::new(
        MemoryStore::new()
            .with_table(DST, existing)
            .with_routine("refresh_realtime", Some("ok"))
            .with_routine("refresh_history", Some("ok")),
    );
    let config = SyncConfig::from_settings(
        Settings {
            source_url: "postgres://erp".into(),
            destination_url: "postgres://dw".into(),
            source_table: SRC.into(),
            destination_table: DST.into(),
            realtime_routine: "refresh_realtime".into(),
            historical_routine: "refresh_history".into(),
            ..Settings::default()
        },
        Path::new("setting.json"),
    )
    .expect("valid config");
    let pipeline = SyncPipeline::new(config, source, destination.clone());

    let summary = pipeline.run_once(RunMode::Apply).await.expect("sync run");

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(
        summary.window.dates(),
        &[day(1), day(2), day(3), day(4), day(5), day(6), day(7)]
    );
    assert_eq!(summary.minimum_date, Some(day(7)));
    assert_eq!(summary.rows_fetched, 8);
    assert_eq!(summary.rows_deleted, 2);
    assert_eq!(summary.rows_inserted, 8);
    assert_eq!(summary.failed_triggers(), 0);

    let rows = destination.rows(DST).expect("destination rows");
    let find = |job: &str, kind: &str| {
        rows.iter()
            .find(|r| {
                r.job_suffix.as_deref() == Some(job)
                    && r.trans_type.as_ref().map(TransType::as_str) == Some(kind)
            })
            .unwrap_or_else(|| panic!("missing {job} {kind}"))
    };

    assert_eq!(find("J-300", "Run").resources.as_deref(), Some("CNC12MA"));
    assert_eq!(find("J-300", "Machine").resources.as_deref(), Some("CNC12MA"));
    assert_eq!(find("J-200", "Move").resources.as_deref(), Some("MANUAL PROCESS"));
    assert_eq!(find("J-100", "Queue").resources, None);
    assert_eq!(find("J-700", "Move").resources.as_deref(), Some("SAW1"));

    for row in &untouched {
        assert!(rows.contains(row), "row before the boundary was modified: {row:?}");
    }
    assert!(!rows.iter().any(|r| r.job_suffix.as_deref() == Some("STALE")));
    assert_eq!(
        rows.iter().filter(|r| r.trans_day() >= day(7)).count(),
        8,
        "only the current window remains at or after the boundary"
    );
    // the D8 source row is outside the window and never copied
    let j800 = rows.iter().filter(|r| r.job_suffix.as_deref() == Some("J-800"));
    assert_eq!(j800.count(), 1);
    assert_eq!(rows.len(), untouched.len() + 8);
}

//! Per-run report directory: summary JSON, Parquet snapshot of the resolved
//! window, and a hash manifest of both.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use trsync_core::{Resolution, ResolvedRecord, TransType};

use crate::SyncRunSummary;

pub const SUMMARY_FILE: &str = "summary.json";
pub const WINDOW_SNAPSHOT_FILE: &str = "window.parquet";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifest {
    pub schema_version: u32,
    pub files: Vec<ReportManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub fn run_report_dir(reports_root: &Path, summary: &SyncRunSummary) -> PathBuf {
    reports_root.join(summary.run_id.to_string())
}

/// Write `summary.json`, `window.parquet` and `manifest.json` under `report_dir`.
pub async fn write_run_report(
    report_dir: &Path,
    summary: &SyncRunSummary,
    records: &[ResolvedRecord],
) -> Result<PathBuf> {
    fs::create_dir_all(report_dir)
        .await
        .with_context(|| format!("creating {}", report_dir.display()))?;

    let summary_path = report_dir.join(SUMMARY_FILE);
    let body = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(&summary_path, body)
        .await
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let snapshot_path = report_dir.join(WINDOW_SNAPSHOT_FILE);
    write_window_parquet(&snapshot_path, records)?;

    let manifest = ReportManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("summary", report_dir, &summary_path)?,
            manifest_entry("window", report_dir, &snapshot_path)?,
        ],
    };
    let manifest_path = report_dir.join(MANIFEST_FILE);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing report manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    Ok(manifest_path)
}

fn window_schema() -> Schema {
    Schema::new(vec![
        ArrowField::new("trans_date", DataType::Utf8, false),
        ArrowField::new("job_suffix", DataType::Utf8, true),
        ArrowField::new("oper_num", DataType::Utf8, true),
        ArrowField::new("trans_type", DataType::Utf8, true),
        ArrowField::new("resources_raw", DataType::Utf8, true),
        ArrowField::new("resources", DataType::Utf8, true),
        ArrowField::new("resolution", DataType::Utf8, false),
        ArrowField::new("inferred_from", DataType::UInt32, true),
    ])
}

fn write_window_parquet(path: &Path, records: &[ResolvedRecord]) -> Result<()> {
    let trans_dates = StringArray::from(
        records
            .iter()
            .map(|r| Some(r.record.trans_date.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .collect::<Vec<_>>(),
    );
    let job_suffixes = StringArray::from(
        records
            .iter()
            .map(|r| r.record.job_suffix.as_deref())
            .collect::<Vec<_>>(),
    );
    let oper_nums = StringArray::from(
        records
            .iter()
            .map(|r| r.record.oper_num.as_deref())
            .collect::<Vec<_>>(),
    );
    let trans_types = StringArray::from(
        records
            .iter()
            .map(|r| r.record.trans_type.as_ref().map(TransType::as_str))
            .collect::<Vec<_>>(),
    );
    let raw = StringArray::from(
        records
            .iter()
            .map(|r| r.raw_resources.as_deref())
            .collect::<Vec<_>>(),
    );
    let resolved = StringArray::from(
        records
            .iter()
            .map(|r| r.record.resources.as_deref())
            .collect::<Vec<_>>(),
    );
    let resolutions = StringArray::from(
        records
            .iter()
            .map(|r| Some(r.resolution.label()))
            .collect::<Vec<_>>(),
    );
    let inferred_from = UInt32Array::from(
        records
            .iter()
            .map(|r| match r.resolution {
                Resolution::Inferred { from_index } => u32::try_from(from_index).ok(),
                _ => None,
            })
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        Arc::new(window_schema()),
        vec![
            Arc::new(trans_dates),
            Arc::new(job_suffixes),
            Arc::new(oper_nums),
            Arc::new(trans_types),
            Arc::new(raw),
            Arc::new(resolved),
            Arc::new(resolutions),
            Arc::new(inferred_from),
        ],
    )
    .context("building window record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, report_dir: &Path, path: &Path) -> Result<ReportManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let rel = path
        .strip_prefix(report_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ReportManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: hex::encode(hasher.finalize()),
        bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;
    use trsync_core::{fill_gaps, GapFillStats, TransactionRecord, Window};
    use uuid::Uuid;

    use crate::RunStatus;

    fn summary(stats: GapFillStats) -> SyncRunSummary {
        let now = Utc::now();
        SyncRunSummary {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            status: RunStatus::Completed,
            source_table: "src".into(),
            destination_table: "dst".into(),
            window: Window::default(),
            minimum_date: None,
            rows_fetched: stats.total(),
            rows_deleted: 0,
            rows_inserted: stats.total() as u64,
            gap_fill: stats,
            triggers: Vec::new(),
            report_dir: None,
        }
    }

    #[tokio::test]
    async fn report_has_summary_snapshot_and_matching_manifest() {
        let at = NaiveDate::from_ymd_opt(2026, 5, 4)
            .and_then(|d| d.and_hms_opt(7, 30, 0))
            .expect("valid timestamp");
        let dataset = vec![
            TransactionRecord::new(at, "J1", "10", "Machine", Some("press 4")),
            TransactionRecord::new(at, "J1", "10", "Run", None),
            TransactionRecord::new(at, "J2", "10", "Move", None),
        ];
        let output = fill_gaps(&dataset);
        let summary = summary(output.stats);

        let root = tempdir().expect("tempdir");
        let report_dir = run_report_dir(root.path(), &summary);
        let manifest_path = write_run_report(&report_dir, &summary, &output.records)
            .await
            .expect("report");

        let manifest: ReportManifest =
            serde_json::from_slice(&std::fs::read(&manifest_path).expect("read manifest"))
                .expect("parse manifest");
        assert_eq!(manifest.files.len(), 2);
        for file in &manifest.files {
            let bytes = std::fs::read(report_dir.join(&file.path)).expect("read file");
            assert_eq!(bytes.len() as u64, file.bytes);
            assert_eq!(hex::encode(Sha256::digest(&bytes)), file.sha256);
        }

        let written: serde_json::Value = serde_json::from_slice(
            &std::fs::read(report_dir.join(SUMMARY_FILE)).expect("read summary"),
        )
        .expect("parse summary");
        assert_eq!(written["gap_fill"]["inferred"], 1);
        assert_eq!(written["gap_fill"]["sentinel"], 1);

        let reader = SerializedFileReader::new(
            File::open(report_dir.join(WINDOW_SNAPSHOT_FILE)).expect("open parquet"),
        )
        .expect("parquet reader");
        assert_eq!(reader.metadata().file_metadata().num_rows(), 3);
    }
}

//! Persisted settings file, environment overrides and the validated run config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trsync_core::DEFAULT_WINDOW_DAYS;
use trsync_storage::{quote_table_name, routine_call_sql, PoolSettings, DEFAULT_INSERT_BATCH_SIZE};

use crate::error::RunError;

pub const DEFAULT_CONFIG_FILE: &str = "setting.json";
pub const CONFIG_PATH_ENV: &str = "TRSYNC_CONFIG";

/// On-disk settings record. Every key is optional in the file; missing keys
/// take the template defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source_url: String,
    pub destination_url: String,
    pub source_table: String,
    pub destination_table: String,
    pub realtime_routine: String,
    pub historical_routine: String,
    pub window_days: usize,
    pub insert_batch_size: usize,
    pub acquire_timeout_secs: u64,
    pub reports_dir: String,
    pub schedule: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            destination_url: String::new(),
            source_table: String::new(),
            destination_table: String::new(),
            realtime_routine: String::new(),
            historical_routine: String::new(),
            window_days: DEFAULT_WINDOW_DAYS,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            acquire_timeout_secs: 30,
            reports_dir: String::new(),
            schedule: Vec::new(),
        }
    }
}

/// Outcome of [`Settings::load_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    Existing,
    CreatedTemplate,
}

impl Settings {
    /// Read the settings file, writing an empty template first if it is absent.
    pub fn load_or_create(path: &Path) -> Result<(Self, SettingsSource), RunError> {
        if !path.exists() {
            write_template(path)?;
            warn!(
                path = %path.display(),
                "created a settings file; fill in the connection and table details"
            );
            return Ok((Settings::default(), SettingsSource::CreatedTemplate));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|err| RunError::config(path, format!("reading settings: {err}")))?;
        let settings = serde_json::from_str(&text)
            .map_err(|err| RunError::config(path, format!("parsing settings: {err}")))?;
        Ok((settings, SettingsSource::Existing))
    }

    /// Overlay `TRSYNC_*` environment variables. `path` only names the
    /// settings file in errors.
    pub fn apply_env(&mut self, path: &Path) -> Result<(), RunError> {
        self.apply_overrides(path, |key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        &mut self,
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RunError> {
        let text_keys: [(&str, &mut String); 7] = [
            ("TRSYNC_SOURCE_URL", &mut self.source_url),
            ("TRSYNC_DESTINATION_URL", &mut self.destination_url),
            ("TRSYNC_SOURCE_TABLE", &mut self.source_table),
            ("TRSYNC_DESTINATION_TABLE", &mut self.destination_table),
            ("TRSYNC_REALTIME_ROUTINE", &mut self.realtime_routine),
            ("TRSYNC_HISTORICAL_ROUTINE", &mut self.historical_routine),
            ("TRSYNC_REPORTS_DIR", &mut self.reports_dir),
        ];
        for (key, slot) in text_keys {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }
        if let Some(raw) = lookup("TRSYNC_WINDOW_DAYS") {
            self.window_days = raw.trim().parse().map_err(|err| {
                let detail = format!("TRSYNC_WINDOW_DAYS={raw:?} is not a day count: {err}");
                RunError::config(path, detail)
            })?;
        }
        Ok(())
    }
}

fn write_template(path: &Path) -> Result<(), RunError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| RunError::config(path, format!("creating settings directory: {err}")))?;
    }
    let body = serde_json::to_string_pretty(&Settings::default())
        .map_err(|err| RunError::config(path, format!("serializing settings template: {err}")))?;
    std::fs::write(path, body)
        .map_err(|err| RunError::config(path, format!("writing settings template: {err}")))
}

/// Write the settings template unless a file already exists. Returns whether
/// a file was written.
pub fn init_settings_file(path: &Path) -> Result<bool, RunError> {
    if path.exists() {
        return Ok(false);
    }
    write_template(path)?;
    info!(path = %path.display(), "wrote settings template");
    Ok(true)
}

/// Settings path from an explicit flag, `TRSYNC_CONFIG`, or `./setting.json`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostSyncRoutines {
    pub realtime: Option<String>,
    pub historical: Option<String>,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub config_path: PathBuf,
    pub source_url: String,
    pub destination_url: String,
    pub source_table: String,
    pub destination_table: String,
    pub routines: PostSyncRoutines,
    pub window_days: usize,
    pub insert_batch_size: usize,
    pub acquire_timeout: Duration,
    pub reports_dir: Option<PathBuf>,
    pub schedule: Vec<String>,
}

impl SyncConfig {
    /// Load the settings file (creating the template if needed), apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, RunError> {
        let (mut settings, _) = Settings::load_or_create(path)?;
        settings.apply_env(path)?;
        Self::from_settings(settings, path)
    }

    pub fn from_settings(settings: Settings, path: &Path) -> Result<Self, RunError> {
        let required = [
            ("source_url", &settings.source_url),
            ("destination_url", &settings.destination_url),
            ("source_table", &settings.source_table),
            ("destination_table", &settings.destination_table),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        if missing.len() == required.len() {
            return Err(RunError::config(
                path,
                "no details filled in; key in the connection and table settings",
            ));
        }
        if !missing.is_empty() {
            return Err(RunError::config(
                path,
                format!("please fill in {}", missing.join(", ")),
            ));
        }
        if settings.window_days == 0 {
            return Err(RunError::config(path, "window_days must be at least 1"));
        }

        for (key, table) in [
            ("source_table", &settings.source_table),
            ("destination_table", &settings.destination_table),
        ] {
            quote_table_name(table).map_err(|err| RunError::config(path, format!("{key}: {err}")))?;
        }

        let routine = |key: &str, raw: &str| -> Result<Option<String>, RunError> {
            let raw = raw.trim();
            if raw.is_empty() {
                warn!(key, "post-sync routine not configured; it will be skipped");
                return Ok(None);
            }
            routine_call_sql(raw).map_err(|err| RunError::config(path, format!("{key}: {err}")))?;
            Ok(Some(raw.to_string()))
        };
        let routines = PostSyncRoutines {
            realtime: routine("realtime_routine", &settings.realtime_routine)?,
            historical: routine("historical_routine", &settings.historical_routine)?,
        };

        let reports_dir = Some(settings.reports_dir.trim())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            config_path: path.to_path_buf(),
            source_url: settings.source_url.trim().to_string(),
            destination_url: settings.destination_url.trim().to_string(),
            source_table: settings.source_table.trim().to_string(),
            destination_table: settings.destination_table.trim().to_string(),
            routines,
            window_days: settings.window_days,
            insert_batch_size: settings.insert_batch_size.max(1),
            acquire_timeout: Duration::from_secs(settings.acquire_timeout_secs.max(1)),
            reports_dir,
            schedule: settings.schedule,
        })
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            acquire_timeout: self.acquire_timeout,
            insert_batch_size: self.insert_batch_size,
        }
    }
}

//! Post-sync aggregation routines.

use serde::Serialize;
use tracing::{error, info, warn};
use trsync_storage::DestinationStore;

use crate::config::PostSyncRoutines;
use crate::error::TriggerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TriggerStatus {
    Succeeded { result: Option<String> },
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub label: &'static str,
    pub routine: Option<String>,
    #[serde(flatten)]
    pub status: TriggerStatus,
}

impl TriggerOutcome {
    pub fn failed(&self) -> bool {
        matches!(self.status, TriggerStatus::Failed { .. })
    }
}

/// Call the real-time routine, then the historical one. Each call commits on
/// its own and a failure never stops the next call.
pub async fn run_post_sync(
    destination: &dyn DestinationStore,
    routines: &PostSyncRoutines,
) -> Vec<TriggerOutcome> {
    let ordered = [
        ("real-time", routines.realtime.as_deref()),
        ("historical", routines.historical.as_deref()),
    ];

    let mut outcomes = Vec::with_capacity(ordered.len());
    for (label, routine) in ordered {
        let Some(routine) = routine else {
            warn!(label, "no routine configured, skipping");
            outcomes.push(TriggerOutcome {
                label,
                routine: None,
                status: TriggerStatus::Skipped,
            });
            continue;
        };

        let status = match destination.call_routine(routine).await {
            Ok(result) => {
                info!(label, routine, result = ?result, "function result");
                TriggerStatus::Succeeded { result }
            }
            Err(source) => {
                let err = TriggerError {
                    label,
                    routine: routine.to_string(),
                    source,
                };
                error!(error = %err, "post-sync routine failed; continuing");
                TriggerStatus::Failed {
                    error: err.to_string(),
                }
            }
        };
        outcomes.push(TriggerOutcome {
            label,
            routine: Some(routine.to_string()),
            status,
        });
    }
    outcomes
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Persisted progress of a multi-step form.
///
/// Wire layout: `{ "currentStep", "stepData", "completedSteps", "savedAt"? }`.
/// `stepData` maps step id → that step's cleaned values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshotRecord {
    pub current_step: usize,
    #[serde(default)]
    pub step_data: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub completed_steps: BTreeSet<usize>,
    /// RFC 3339 timestamp of the save. Older snapshots may lack it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

impl StepSnapshotRecord {
    /// Stamp the record with the current time.
    pub fn stamped(mut self) -> Self {
        self.saved_at = Some(now_rfc3339());
        self
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

//! The per-row processing log.
//!
//! Represented as a tagged variant with a finite action set and per-action
//! payloads, rather than an untyped document, per the re-architecture
//! guidance in the specification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of actions that can append an entry to a row's processing
/// log. `SubmitJob` through `SplitFacility` are recorded here only so the
/// label set stays complete for admin UIs that consume it (§6); this
/// pipeline's core only ever appends `Parse`, `Geocode`, and `Match` entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingAction {
    Parse,
    Geocode,
    Match,
    SubmitJob,
    Confirm,
    DeleteFacility,
    PromoteMatch,
    MergeFacility,
    SplitFacility,
}

/// The per-action payload for a `ProcessingResult`. Every non-error variant
/// here corresponds to one stage's success outcome; `Error` covers failures
/// from any stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingDetail {
    Parsed { pre_geocoded: bool },
    Geocoded { skipped_geocoder: bool, raw_response: Option<Value> },
    Matched,
    Error { message: String, trace: Option<String> },
}

/// One entry in a row's `processing_results` log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub action: ProcessingAction,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub detail: ProcessingDetail,
}

impl ProcessingResult {
    /// Build a successful entry.
    pub fn success(
        action: ProcessingAction,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        detail: ProcessingDetail,
    ) -> Self {
        debug_assert!(!matches!(detail, ProcessingDetail::Error { .. }));
        ProcessingResult {
            action,
            started_at,
            finished_at,
            detail,
        }
    }

    /// Build a failed entry.
    pub fn error(
        action: ProcessingAction,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        message: impl Into<String>,
        trace: Option<String>,
    ) -> Self {
        ProcessingResult {
            action,
            started_at,
            finished_at,
            detail: ProcessingDetail::Error {
                message: message.into(),
                trace,
            },
        }
    }

    /// Did this stage fail? Used by the invariant that every log entry
    /// records "an error boolean".
    pub fn is_error(&self) -> bool {
        matches!(self.detail, ProcessingDetail::Error { .. })
    }
}

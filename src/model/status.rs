//! Closed enumerations for row and match status, with transition functions
//! that reject illegal moves instead of trusting callers to check first.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

/// A `FacilityListItem`'s position in the ingest-and-match state machine.
///
/// Transitions are monotonic along the DAG described in the data model: a
/// row never moves backward, and every stage (`Parser`, `Geocoder`,
/// `Matcher`) rejects a row that isn't in the precondition status it expects.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RowStatus {
    Uploaded,
    Parsed,
    ErrorParsing,
    Geocoded,
    GeocodedNoResults,
    ErrorGeocoding,
    PotentialMatch,
    Matched,
    ErrorMatching,
}

/// Raised when a stage is asked to act on a row that isn't in the status it
/// requires as a precondition.
#[derive(Debug, Error)]
#[error("expected row status {expected}, found {actual}")]
pub struct WrongRowStatus {
    pub expected: &'static str,
    pub actual: RowStatus,
}

impl RowStatus {
    /// Is this row eligible for `Parser`?
    pub fn is_uploaded(&self) -> bool {
        matches!(self, RowStatus::Uploaded)
    }

    /// Is this row eligible for `Geocoder`?
    pub fn is_parsed(&self) -> bool {
        matches!(self, RowStatus::Parsed)
    }

    /// Is this row eligible for `Matcher` (§4.6: only rows geocoded, with or
    /// without results, are inspected)?
    pub fn is_geocoded_or_no_results(&self) -> bool {
        matches!(self, RowStatus::Geocoded | RowStatus::GeocodedNoResults)
    }

    /// Require `Uploaded`, or return a typed precondition error.
    pub fn require_uploaded(&self) -> Result<(), WrongRowStatus> {
        if self.is_uploaded() {
            Ok(())
        } else {
            Err(WrongRowStatus {
                expected: "uploaded",
                actual: *self,
            })
        }
    }

    /// Require `Parsed`, or return a typed precondition error.
    pub fn require_parsed(&self) -> Result<(), WrongRowStatus> {
        if self.is_parsed() {
            Ok(())
        } else {
            Err(WrongRowStatus {
                expected: "parsed",
                actual: *self,
            })
        }
    }
}

/// A `FacilityMatch`'s status.
///
/// Set at creation by the Materializer and later mutated only by
/// out-of-scope confirmation actions (outside this pipeline's core).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchStatus {
    Automatic,
    Pending,
    Rejected,
}

#[test]
fn row_status_displays_in_snake_case() {
    assert_eq!(RowStatus::GeocodedNoResults.to_string(), "geocoded_no_results");
    assert_eq!(RowStatus::ErrorMatching.to_string(), "error_matching");
}

#[test]
fn require_uploaded_rejects_other_statuses() {
    assert!(RowStatus::Uploaded.require_uploaded().is_ok());
    assert!(RowStatus::Parsed.require_uploaded().is_err());
}

//! The four core entities: `FacilityList`, `FacilityListItem`, `Facility`,
//! and `FacilityMatch`.

use serde::{Deserialize, Serialize};

use crate::country::CountryCode;

use super::ids::{FacilityId, FacilityListId, FacilityListItemId, FacilityMatchId};
use super::processing::ProcessingResult;
use super::status::{MatchStatus, RowStatus};

/// A geographic point, in the `(lat, lng)` order of the external geocoder
/// contract (not the `(lng, lat)` order some GIS libraries use).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

/// A list of contributed facility records uploaded by one contributor.
/// Created at upload and immutable thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FacilityList {
    pub id: FacilityListId,
    /// The raw first row of the uploaded CSV (or the XLSX sheet's row 0
    /// joined with commas).
    pub header: String,
    /// The contributor that owns this list.
    pub contributor: String,
}

/// One contributed row, owned exclusively by its `FacilityList`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FacilityListItem {
    pub id: FacilityListItemId,
    pub list_id: FacilityListId,
    pub raw_data: String,
    pub status: RowStatus,

    pub country_code: Option<CountryCode>,
    pub name: Option<String>,
    pub address: Option<String>,

    pub geocoded_point: Option<Point>,
    pub geocoded_address: Option<String>,

    /// A weak reference (lookup, not ownership) to the facility this row
    /// was matched to.
    pub facility_id: Option<FacilityId>,

    pub processing_results: Vec<ProcessingResult>,
}

impl FacilityListItem {
    pub fn new(id: FacilityListItemId, list_id: FacilityListId, raw_data: String) -> Self {
        FacilityListItem {
            id,
            list_id,
            raw_data,
            status: RowStatus::Uploaded,
            country_code: None,
            name: None,
            address: None,
            geocoded_point: None,
            geocoded_address: None,
            facility_id: None,
            processing_results: Vec::new(),
        }
    }
}

/// A canonical registry facility: the authoritative record for a real-world
/// facility, potentially backed by many contributed rows through
/// `FacilityMatch`es.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub address: String,
    pub country_code: CountryCode,
    pub location: Point,
    /// A weak reference to the row that created this facility.
    pub created_from_item_id: FacilityListItemId,
}

/// Metadata about the matching run that produced a `FacilityMatch`, carried
/// along for provenance and debugging. `match_type` is set once the
/// Materializer decides whether (and why) a match was auto-accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchResultsMeta {
    pub gazetteer_threshold: f64,
    pub automatic_threshold: f64,
    pub recall_weight: f64,
    pub code_version: String,
    pub match_type: Option<MatchType>,
}

/// Why a `FacilityMatch` was (or wasn't) auto-accepted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// A deterministic exact-field match (confidence forced to 1.0).
    Exact,
    /// No gazetteer candidate survived; a new canonical facility was minted.
    NoGazetteerMatch,
    /// Exactly one candidate, whose score met `automatic_threshold`.
    SingleGazetteerMatch,
    /// Multiple candidates, exactly one scoring above `automatic_threshold`;
    /// the *first* candidate in the list (not necessarily the highest
    /// scorer) was promoted. See DESIGN.md for why this is retained as-is.
    OneGazetteerMatchGreaterThanThreshold,
}

/// A candidate (or confirmed) link between a contributed row and a
/// canonical facility. Jointly owned by its row and its facility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FacilityMatch {
    pub id: FacilityMatchId,
    pub list_item_id: FacilityListItemId,
    pub facility_id: FacilityId,
    pub confidence: f64,
    pub status: MatchStatus,
    pub results: MatchResultsMeta,
}

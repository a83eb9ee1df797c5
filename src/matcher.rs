//! Computes per-row match candidates for a whole list in one batch. Never
//! mutates storage; the Materializer decides what a `MatchOutcome` means for
//! row and match statuses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::errors::MatchError;
use crate::gazetteer::{CleanedRecord, Gazetteer};
use crate::model::{FacilityId, FacilityListItemId};

/// Metadata about one matching run, carried into every `FacilityMatch`
/// created from it for provenance.
#[derive(Clone, Debug)]
pub struct MatchRunResults {
    pub gazetteer_threshold: f64,
    pub automatic_threshold: f64,
    pub recall_weight: f64,
    /// The model's own threshold computation. Recorded for telemetry only;
    /// `gazetteer_threshold` remains the enforced cutoff (open question,
    /// not resolved — see DESIGN.md).
    pub computed_threshold: Option<f64>,
    pub code_version: String,
    pub no_gazetteer_matches: bool,
    pub no_geocoded_items: bool,
}

/// The Matcher's output: every row it considered, the surviving candidates
/// per row, and run metadata.
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub processed_list_item_ids: Vec<FacilityListItemId>,
    pub item_matches: HashMap<FacilityListItemId, Vec<(FacilityId, f64)>>,
    pub results: MatchRunResults,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

/// Parameters that govern one matching run. Threaded through explicitly
/// rather than read from a global configuration singleton.
#[derive(Clone, Debug)]
pub struct MatcherConfig {
    pub automatic_threshold: f64,
    pub gazetteer_threshold: f64,
    pub recall_weight: f64,
    pub code_version: String,
}

/// Run the Matcher over one list's geocoded rows against the current
/// canonical set.
///
/// Returns `Err(MatchError::Internal(_))` if the gazetteer model itself
/// failed; callers should leave the list at its pre-Match statuses and
/// surface the error rather than treat it as "no candidates found".
pub fn run(
    messy: &HashMap<FacilityListItemId, CleanedRecord>,
    canonical: &HashMap<FacilityId, CleanedRecord>,
    gazetteer: &Gazetteer,
    config: &MatcherConfig,
) -> Result<MatchOutcome, MatchError> {
    let started = Utc::now();

    if canonical.is_empty() && !messy.is_empty() {
        let finished = Utc::now();
        return Ok(MatchOutcome {
            processed_list_item_ids: messy.keys().copied().collect(),
            item_matches: HashMap::new(),
            results: MatchRunResults {
                gazetteer_threshold: config.gazetteer_threshold,
                automatic_threshold: config.automatic_threshold,
                recall_weight: config.recall_weight,
                computed_threshold: None,
                code_version: config.code_version.clone(),
                no_gazetteer_matches: true,
                no_geocoded_items: false,
            },
            started,
            finished,
        });
    }

    if messy.is_empty() {
        let finished = Utc::now();
        return Ok(MatchOutcome {
            processed_list_item_ids: Vec::new(),
            item_matches: HashMap::new(),
            results: MatchRunResults {
                gazetteer_threshold: config.gazetteer_threshold,
                automatic_threshold: config.automatic_threshold,
                recall_weight: config.recall_weight,
                computed_threshold: None,
                code_version: config.code_version.clone(),
                no_gazetteer_matches: false,
                no_geocoded_items: true,
            },
            started,
            finished,
        });
    }

    let computed_threshold = gazetteer.threshold(config.recall_weight);
    let processed_list_item_ids: Vec<FacilityListItemId> = messy.keys().copied().collect();

    let (item_matches, no_gazetteer_matches) =
        match gazetteer.match_messy(messy, canonical, config.gazetteer_threshold) {
            Ok(matches) => (matches, false),
            Err(MatchError::ModelBlockingFailure) => (HashMap::new(), true),
            Err(err @ MatchError::Internal(_)) => return Err(err),
        };

    let finished = Utc::now();
    Ok(MatchOutcome {
        processed_list_item_ids,
        item_matches,
        results: MatchRunResults {
            gazetteer_threshold: config.gazetteer_threshold,
            automatic_threshold: config.automatic_threshold,
            recall_weight: config.recall_weight,
            computed_threshold: Some(computed_threshold),
            code_version: config.code_version.clone(),
            no_gazetteer_matches,
            no_geocoded_items: false,
        },
        started,
        finished,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country;

    fn config() -> MatcherConfig {
        MatcherConfig {
            automatic_threshold: 0.8,
            gazetteer_threshold: 0.5,
            recall_weight: 1.0,
            code_version: "test".to_string(),
        }
    }

    fn record(country_code: &str, name: &str, address: &str) -> CleanedRecord {
        CleanedRecord {
            country: country::resolve(country_code).unwrap(),
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn empty_canonical_flags_no_gazetteer_matches() {
        let messy = HashMap::from([(FacilityListItemId::new(), record("US", "acme", "100 main st"))]);
        let canonical = HashMap::new();

        let outcome = run(&messy, &canonical, &Gazetteer::empty(), &config()).unwrap();

        assert!(outcome.results.no_gazetteer_matches);
        assert!(!outcome.results.no_geocoded_items);
        assert_eq!(outcome.processed_list_item_ids.len(), 1);
        assert!(outcome.item_matches.is_empty());
    }

    #[test]
    fn empty_messy_flags_no_geocoded_items() {
        let messy = HashMap::new();
        let canonical = HashMap::from([(FacilityId::new(), record("US", "acme", "100 main st"))]);

        let outcome = run(&messy, &canonical, &Gazetteer::empty(), &config()).unwrap();

        assert!(outcome.results.no_geocoded_items);
        assert!(!outcome.results.no_gazetteer_matches);
        assert!(outcome.processed_list_item_ids.is_empty());
    }
}

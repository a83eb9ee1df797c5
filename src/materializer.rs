//! Applies one `MatchOutcome` to the store in a single atomic unit: rows
//! advance to `POTENTIAL_MATCH` or `MATCHED`, pending matches are created,
//! and unmatched rows either adopt a freshly created facility or fail with
//! `ERROR_MATCHING`. Either the whole list advances, or nothing does.

use crate::errors::MaterializeError;
use crate::matcher::MatchOutcome;
use crate::model::{
    Facility, FacilityId, FacilityMatch, FacilityMatchId, MatchResultsMeta, MatchStatus,
    MatchType, ProcessingAction, ProcessingDetail, ProcessingResult, RowStatus,
};
use crate::store::{FacilityListStore, FacilityMatchStore, Store};

/// Summary counts returned after a successful materialization, useful for
/// logging and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Materialized {
    pub auto_matched: usize,
    pub potential_matches: usize,
    pub new_facilities: usize,
    pub error_matching: usize,
}

fn base_results(outcome: &MatchOutcome) -> MatchResultsMeta {
    MatchResultsMeta {
        gazetteer_threshold: outcome.results.gazetteer_threshold,
        automatic_threshold: outcome.results.automatic_threshold,
        recall_weight: outcome.results.recall_weight,
        code_version: outcome.results.code_version.clone(),
        match_type: None,
    }
}

/// Materialize one list's `MatchOutcome`. Callers should hold the list's
/// lock (`Store::list_lock`) for the duration of this call so two
/// materializer runs on the same list never interleave.
pub fn materialize(
    store: &Store,
    outcome: &MatchOutcome,
) -> Result<Materialized, MaterializeError> {
    let mut uow = store.unit_of_work();
    let mut summary = Materialized::default();

    for (item_id, candidates) in &outcome.item_matches {
        let mut item = store
            .get_item(*item_id)
            .ok_or_else(|| MaterializeError::RowNotFound(item_id.to_string()))?;
        debug_assert!(item.status.is_geocoded_or_no_results());

        item.status = RowStatus::PotentialMatch;

        let mut matches: Vec<FacilityMatch> = candidates
            .iter()
            .map(|(facility_id, score)| FacilityMatch {
                id: FacilityMatchId::new(),
                list_item_id: *item_id,
                facility_id: *facility_id,
                confidence: *score,
                status: MatchStatus::Pending,
                results: base_results(outcome),
            })
            .collect();

        let above_threshold = candidates
            .iter()
            .filter(|(_, score)| *score > outcome.results.automatic_threshold)
            .count();

        if candidates.len() == 1 && candidates[0].1 >= outcome.results.automatic_threshold {
            matches[0].status = MatchStatus::Automatic;
            matches[0].results.match_type = Some(MatchType::SingleGazetteerMatch);
            item.status = RowStatus::Matched;
            item.facility_id = Some(matches[0].facility_id);
            summary.auto_matched += 1;
        } else if candidates.len() > 1 && above_threshold == 1 {
            // The first candidate in the list is promoted, not necessarily
            // the one that scored above the threshold.
            matches[0].status = MatchStatus::Automatic;
            matches[0].results.match_type = Some(MatchType::OneGazetteerMatchGreaterThanThreshold);
            item.status = RowStatus::Matched;
            item.facility_id = Some(matches[0].facility_id);
            summary.auto_matched += 1;
        } else {
            summary.potential_matches += 1;
        }

        let started = outcome.started;
        let finished = outcome.finished;
        item.processing_results.push(ProcessingResult::success(
            ProcessingAction::Match,
            started,
            finished,
            ProcessingDetail::Matched,
        ));

        for facility_match in matches {
            uow.stage_match(facility_match);
        }
        uow.stage_item(item);
    }

    let unmatched = outcome
        .processed_list_item_ids
        .iter()
        .filter(|id| !outcome.item_matches.contains_key(id));

    for item_id in unmatched {
        let mut item = store
            .get_item(*item_id)
            .ok_or_else(|| MaterializeError::RowNotFound(item_id.to_string()))?;
        debug_assert!(item.status.is_geocoded_or_no_results());

        if item.status == RowStatus::GeocodedNoResults {
            item.status = RowStatus::ErrorMatching;
            item.processing_results.push(ProcessingResult::error(
                ProcessingAction::Match,
                outcome.started,
                outcome.finished,
                "No match to an existing facility and cannot create a new facility without a geocode result",
                None,
            ));
            summary.error_matching += 1;
            uow.stage_item(item);
            continue;
        }

        let (name, address, country_code, point) = match (
            item.name.clone(),
            item.address.clone(),
            item.country_code,
            item.geocoded_point,
        ) {
            (Some(name), Some(address), Some(country_code), Some(point)) => {
                (name, address, country_code, point)
            }
            _ => {
                return Err(MaterializeError::RowNotFound(format!(
                    "item {item_id} reached the Matcher without complete geocoded fields"
                )))
            }
        };

        let facility = Facility {
            id: FacilityId::new(),
            name,
            address,
            country_code,
            location: point,
            created_from_item_id: *item_id,
        };

        let mut results = base_results(outcome);
        results.match_type = Some(MatchType::NoGazetteerMatch);

        let facility_match = FacilityMatch {
            id: FacilityMatchId::new(),
            list_item_id: *item_id,
            facility_id: facility.id,
            confidence: 1.0,
            status: MatchStatus::Automatic,
            results,
        };

        item.facility_id = Some(facility.id);
        item.status = RowStatus::Matched;
        item.processing_results.push(ProcessingResult::success(
            ProcessingAction::Match,
            outcome.started,
            outcome.finished,
            ProcessingDetail::Matched,
        ));

        summary.new_facilities += 1;
        summary.auto_matched += 1;
        uow.stage_facility(facility);
        uow.stage_match(facility_match);
        uow.stage_item(item);
    }

    uow.commit()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::country;
    use crate::matcher::MatchRunResults;
    use crate::model::{FacilityListId, FacilityListItem, FacilityListItemId, Point};
    use std::collections::HashMap;

    fn outcome_with(
        item_matches: HashMap<FacilityListItemId, Vec<(FacilityId, f64)>>,
        processed: Vec<FacilityListItemId>,
    ) -> MatchOutcome {
        let now = Utc::now();
        MatchOutcome {
            processed_list_item_ids: processed,
            item_matches,
            results: MatchRunResults {
                gazetteer_threshold: 0.5,
                automatic_threshold: 0.8,
                recall_weight: 1.0,
                computed_threshold: Some(0.5),
                code_version: "test".to_string(),
                no_gazetteer_matches: false,
                no_geocoded_items: false,
            },
            started: now,
            finished: now,
        }
    }

    fn geocoded_item(list_id: FacilityListId) -> FacilityListItem {
        let mut item = FacilityListItem::new(FacilityListItemId::new(), list_id, "raw".to_string());
        item.status = RowStatus::Geocoded;
        item.name = Some("Acme Mfg".to_string());
        item.address = Some("100 Main St".to_string());
        item.country_code = Some(country::resolve("US").unwrap());
        item.geocoded_point = Some(Point { lat: 1.0, lng: 2.0 });
        item
    }

    #[test]
    fn single_candidate_above_threshold_auto_matches() {
        let store = Store::new();
        let list_id = FacilityListId::new();
        let item = geocoded_item(list_id);
        let item_id = item.id;
        store.insert_item(item);

        let facility_id = FacilityId::new();
        let outcome = outcome_with(
            HashMap::from([(item_id, vec![(facility_id, 0.92)])]),
            vec![item_id],
        );

        let summary = materialize(&store, &outcome).unwrap();
        assert_eq!(summary.auto_matched, 1);

        let updated = store.get_item(item_id).unwrap();
        assert_eq!(updated.status, RowStatus::Matched);
        assert_eq!(updated.facility_id, Some(facility_id));

        let matches = store.matches_for_item(item_id);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].status, MatchStatus::Automatic);
        assert_eq!(matches[0].results.match_type, Some(MatchType::SingleGazetteerMatch));
    }

    #[test]
    fn multiple_candidates_all_above_threshold_stays_pending() {
        let store = Store::new();
        let list_id = FacilityListId::new();
        let item = geocoded_item(list_id);
        let item_id = item.id;
        store.insert_item(item);

        let candidates = vec![
            (FacilityId::new(), 0.85),
            (FacilityId::new(), 0.85),
            (FacilityId::new(), 0.85),
        ];
        let outcome = outcome_with(HashMap::from([(item_id, candidates)]), vec![item_id]);

        let summary = materialize(&store, &outcome).unwrap();
        assert_eq!(summary.potential_matches, 1);
        assert_eq!(summary.auto_matched, 0);

        let updated = store.get_item(item_id).unwrap();
        assert_eq!(updated.status, RowStatus::PotentialMatch);
        assert_eq!(updated.facility_id, None);

        let matches = store.matches_for_item(item_id);
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.status == MatchStatus::Pending));
    }

    #[test]
    fn no_candidates_creates_a_new_facility() {
        let store = Store::new();
        let list_id = FacilityListId::new();
        let item = geocoded_item(list_id);
        let item_id = item.id;
        store.insert_item(item);

        let outcome = outcome_with(HashMap::new(), vec![item_id]);

        let summary = materialize(&store, &outcome).unwrap();
        assert_eq!(summary.new_facilities, 1);

        let updated = store.get_item(item_id).unwrap();
        assert_eq!(updated.status, RowStatus::Matched);
        let facility_id = updated.facility_id.unwrap();

        let matches = store.matches_for_item(item_id);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 1.0);
        assert_eq!(matches[0].facility_id, facility_id);
        assert_eq!(matches[0].results.match_type, Some(MatchType::NoGazetteerMatch));
    }

    #[test]
    fn geocoded_no_results_row_errors_instead_of_creating_a_facility() {
        let store = Store::new();
        let list_id = FacilityListId::new();
        let mut item = geocoded_item(list_id);
        item.status = RowStatus::GeocodedNoResults;
        item.geocoded_point = None;
        let item_id = item.id;
        store.insert_item(item);

        let outcome = outcome_with(HashMap::new(), vec![item_id]);

        let summary = materialize(&store, &outcome).unwrap();
        assert_eq!(summary.error_matching, 1);
        assert_eq!(summary.new_facilities, 0);

        let updated = store.get_item(item_id).unwrap();
        assert_eq!(updated.status, RowStatus::ErrorMatching);
        assert_eq!(updated.facility_id, None);
        assert!(store.matches_for_item(item_id).is_empty());
    }
}

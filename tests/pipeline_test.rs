//! End-to-end pipeline scenarios: upload through parse, geocode, match, and
//! materialize, using an in-process store and a fixture geocoder so no
//! network access is required.

use std::sync::Arc;
use std::time::Duration;

use facility_match::country;
use facility_match::gazetteer::Gazetteer;
use facility_match::geocoder::{FixtureGeocoder, Geocoder};
use facility_match::ingest::{self, FileFormat};
use facility_match::matcher::{self, MatcherConfig};
use facility_match::materializer;
use facility_match::model::{
    FacilityList, FacilityListId, FacilityListItem, FacilityListItemId, MatchStatus, MatchType,
    Point, RowStatus,
};
use facility_match::normalize::{self, CleanValue};
use facility_match::pipeline;
use facility_match::store::{FacilityListStore, FacilityMatchStore, Store};

fn matcher_config() -> MatcherConfig {
    MatcherConfig {
        automatic_threshold: 0.8,
        gazetteer_threshold: 0.5,
        recall_weight: 1.0,
        code_version: "test".to_string(),
    }
}

/// Load a list from raw CSV text and run it through Parse+Geocode against
/// the given fixture geocoder, returning the resulting items.
async fn parse_and_geocode(
    csv: &str,
    geocoder: Arc<dyn Geocoder>,
) -> (Store, FacilityListId, String) {
    let loaded = ingest::load(csv.as_bytes(), FileFormat::Csv).unwrap();
    let store = Store::new();
    let list = FacilityList {
        id: FacilityListId::new(),
        header: loaded.header.clone(),
        contributor: "acme-test".to_string(),
    };
    let list_id = list.id;
    store.insert_list(list);

    let items: Vec<FacilityListItem> = loaded
        .rows
        .iter()
        .map(|raw| FacilityListItem::new(FacilityListItemId::new(), list_id, raw.clone()))
        .collect();

    pipeline::parse_and_geocode_list(
        &store,
        &loaded.header,
        items,
        geocoder,
        48,
        Duration::from_secs(10),
        4,
    )
    .await;

    (store, list_id, loaded.header)
}

/// A row with a fresh empty registry becomes a new, auto-matched facility
/// tagged `no_gazetteer_match`.
#[tokio::test]
async fn new_row_against_empty_registry_creates_a_facility() {
    let geocoder: Arc<dyn Geocoder> = Arc::new(FixtureGeocoder::new().with_result(
        "100 Main St",
        country::resolve("US").unwrap(),
        Point { lat: 40.0, lng: -74.0 },
        "100 Main St, New York, NY",
    ));
    let (store, list_id, _header) =
        parse_and_geocode("country,name,address\nUS,Acme Mfg,100 Main St\n", geocoder).await;

    let items = store.items_for_list(list_id);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, RowStatus::Geocoded);

    let messy = cleaned_messy(&items);
    let canonical = std::collections::HashMap::new();
    let outcome = matcher::run(&messy, &canonical, &Gazetteer::empty(), &matcher_config()).unwrap();
    let summary = materializer::materialize(&store, &outcome).unwrap();

    assert_eq!(summary.new_facilities, 1);
    assert_eq!(summary.auto_matched, 1);

    let item = store.get_item(items[0].id).unwrap();
    assert_eq!(item.status, RowStatus::Matched);
    let facility_id = item.facility_id.unwrap();
    let matches = store.matches_for_item(item.id);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].status, MatchStatus::Automatic);
    assert_eq!(matches[0].facility_id, facility_id);
    assert_eq!(matches[0].results.match_type, Some(MatchType::NoGazetteerMatch));
}

/// A row the geocoder can't resolve ends up `GEOCODED_NO_RESULTS`, and the
/// Materializer refuses to mint a facility for it: the row errors instead.
#[tokio::test]
async fn ungeocodable_row_errors_instead_of_creating_a_facility() {
    let geocoder: Arc<dyn Geocoder> = Arc::new(FixtureGeocoder::new());
    let (store, list_id, _header) = parse_and_geocode(
        "country,name,address\nUS,Nowhere Corp,1 Imaginary Way\n",
        geocoder,
    )
    .await;

    let items = store.items_for_list(list_id);
    assert_eq!(items[0].status, RowStatus::GeocodedNoResults);

    let canonical = std::collections::HashMap::new();
    let messy = cleaned_messy(&items);
    let outcome = matcher::run(&messy, &canonical, &Gazetteer::empty(), &matcher_config()).unwrap();
    assert!(outcome.results.no_gazetteer_matches);

    let summary = materializer::materialize(&store, &outcome).unwrap();
    assert_eq!(summary.error_matching, 1);
    assert_eq!(summary.new_facilities, 0);

    let item = store.get_item(items[0].id).unwrap();
    assert_eq!(item.status, RowStatus::ErrorMatching);
}

/// A row that supplies its own lat/lng skips the geocoder entirely.
#[tokio::test]
async fn pre_geocoded_row_skips_the_geocoder() {
    let geocoder: Arc<dyn Geocoder> = Arc::new(FixtureGeocoder::new());
    let (store, list_id, _header) = parse_and_geocode(
        "country,name,address,lat,lng\nDE,Beta Werk,Hauptstr 1,52.5,13.4\n",
        geocoder,
    )
    .await;

    let items = store.items_for_list(list_id);
    assert_eq!(items[0].status, RowStatus::Geocoded);
    let point = items[0].geocoded_point.unwrap();
    assert_eq!(point.lat, 52.5);
    assert_eq!(point.lng, 13.4);

    let last = items[0].processing_results.last().unwrap();
    match &last.detail {
        facility_match::model::ProcessingDetail::Geocoded { skipped_geocoder, .. } => {
            assert!(*skipped_geocoder);
        }
        other => panic!("expected a Geocoded detail, found {other:?}"),
    }
}

/// An unresolvable country sends a row straight to `ERROR_PARSING`.
#[tokio::test]
async fn unknown_country_errors_at_parse_time() {
    let geocoder: Arc<dyn Geocoder> = Arc::new(FixtureGeocoder::new());
    let (store, list_id, _header) = parse_and_geocode(
        "country,name,address\nNarnia,Acme Mfg,100 Main St\n",
        geocoder,
    )
    .await;

    let items = store.items_for_list(list_id);
    assert_eq!(items[0].status, RowStatus::ErrorParsing);
    assert!(items[0].processing_results.last().unwrap().is_error());
}

/// A single gazetteer candidate whose score clears `automatic_threshold`
/// auto-accepts.
#[tokio::test]
async fn single_high_confidence_candidate_auto_matches() {
    let store = Store::new();
    let list_id = FacilityListId::new();
    let mut item = FacilityListItem::new(FacilityListItemId::new(), list_id, "raw".to_string());
    item.status = RowStatus::Geocoded;
    item.country_code = Some(country::resolve("US").unwrap());
    item.name = Some("Acme Manufacturing".to_string());
    item.address = Some("100 Main St".to_string());
    item.geocoded_point = Some(Point { lat: 1.0, lng: 2.0 });
    let item_id = item.id;
    store.insert_item(item);

    let facility_id = facility_match::model::FacilityId::new();
    let mut item_matches = std::collections::HashMap::new();
    item_matches.insert(item_id, vec![(facility_id, 0.92)]);

    let outcome = facility_match::matcher::MatchOutcome {
        processed_list_item_ids: vec![item_id],
        item_matches,
        results: facility_match::matcher::MatchRunResults {
            gazetteer_threshold: 0.5,
            automatic_threshold: 0.8,
            recall_weight: 1.0,
            computed_threshold: Some(0.6),
            code_version: "test".to_string(),
            no_gazetteer_matches: false,
            no_geocoded_items: false,
        },
        started: fixed_time(),
        finished: fixed_time(),
    };

    let summary = materializer::materialize(&store, &outcome).unwrap();
    assert_eq!(summary.auto_matched, 1);

    let matches = store.matches_for_item(item_id);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].status, MatchStatus::Automatic);
    assert!(matches[0].confidence >= 0.8);
}

/// Several near-duplicate candidates above the gazetteer floor, none of
/// them alone above `automatic_threshold`, stay pending for manual review.
#[tokio::test]
async fn several_near_duplicates_stay_pending() {
    let store = Store::new();
    let list_id = FacilityListId::new();
    let mut item = FacilityListItem::new(FacilityListItemId::new(), list_id, "raw".to_string());
    item.status = RowStatus::Geocoded;
    item.country_code = Some(country::resolve("US").unwrap());
    item.name = Some("Acme Manufacturing".to_string());
    item.address = Some("100 Main St".to_string());
    item.geocoded_point = Some(Point { lat: 1.0, lng: 2.0 });
    let item_id = item.id;
    store.insert_item(item);

    let candidates = vec![
        (facility_match::model::FacilityId::new(), 0.85),
        (facility_match::model::FacilityId::new(), 0.85),
        (facility_match::model::FacilityId::new(), 0.85),
    ];
    let mut item_matches = std::collections::HashMap::new();
    item_matches.insert(item_id, candidates);

    let outcome = facility_match::matcher::MatchOutcome {
        processed_list_item_ids: vec![item_id],
        item_matches,
        results: facility_match::matcher::MatchRunResults {
            gazetteer_threshold: 0.5,
            automatic_threshold: 0.9,
            recall_weight: 1.0,
            computed_threshold: Some(0.6),
            code_version: "test".to_string(),
            no_gazetteer_matches: false,
            no_geocoded_items: false,
        },
        started: fixed_time(),
        finished: fixed_time(),
    };

    let summary = materializer::materialize(&store, &outcome).unwrap();
    assert_eq!(summary.potential_matches, 1);
    assert_eq!(summary.auto_matched, 0);

    let item = store.get_item(item_id).unwrap();
    assert_eq!(item.status, RowStatus::PotentialMatch);

    let matches = store.matches_for_item(item_id);
    assert_eq!(matches.len(), 3);
    assert!(matches.iter().all(|m| m.status == MatchStatus::Pending));
}

fn fixed_time() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc)
}

fn cleaned_messy(
    items: &[FacilityListItem],
) -> std::collections::HashMap<FacilityListItemId, facility_match::gazetteer::CleanedRecord> {
    let mut messy = std::collections::HashMap::new();
    for item in items {
        if !item.status.is_geocoded_or_no_results() {
            continue;
        }
        let (Some(country), Some(name), Some(address)) =
            (item.country_code, item.name.as_deref(), item.address.as_deref())
        else {
            continue;
        };
        if let (CleanValue::Present(name), CleanValue::Present(address)) =
            (normalize::clean(name), normalize::clean(address))
        {
            messy.insert(
                item.id,
                facility_match::gazetteer::CleanedRecord { country, name, address },
            );
        }
    }
    messy
}

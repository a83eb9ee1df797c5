//! Orchestration: per-row parse+geocode fan-out, and per-list match+
//! materialize. The per-row stage is embarrassingly parallel and uses the
//! same bounded-concurrency stream shape the teacher uses for chunked
//! geocoding; the per-list stage runs as one task per list, serialized
//! against other materializer runs on the same list by a per-list lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter};
use tokio::time::timeout;
use tracing::instrument;

use crate::config::MatchConfig;
use crate::errors::GeocodeError;
use crate::gazetteer::{CleanedRecord, Gazetteer};
use crate::geocoder::{Geocoder, GeocodeOutcome};
use crate::materializer::{self, Materialized};
use crate::matcher::{self, MatcherConfig};
use crate::model::{
    FacilityListId, FacilityListItem, ProcessingAction, ProcessingDetail, ProcessingResult,
    RowStatus,
};
use crate::normalize::{self, CleanValue};
use crate::parser;
use crate::store::{FacilityListStore, FacilityStore, Store};

/// Register the metrics this module emits. Call once at process startup.
pub fn describe_metrics() {
    describe_counter!(
        "facilitymatch.rows_parsed.total",
        "Total rows parsed, by outcome"
    );
    describe_counter!(
        "facilitymatch.rows_geocoded.total",
        "Total rows geocoded, by outcome"
    );
    describe_counter!(
        "facilitymatch.geocode_retries.total",
        "Total geocoder call retries"
    );
}

fn parse_stage(mut item: FacilityListItem, header: &str) -> FacilityListItem {
    debug_assert!(item.status.is_uploaded());
    let started = Utc::now();

    let parsed = match parser::parse_row(header, &item.raw_data) {
        Ok(parsed) => parsed,
        Err(err) => {
            item.status = RowStatus::ErrorParsing;
            let finished = Utc::now();
            item.processing_results.push(ProcessingResult::error(
                ProcessingAction::Parse,
                started,
                finished,
                err.to_string(),
                None,
            ));
            counter!("facilitymatch.rows_parsed.total", 1, "outcome" => "error");
            return item;
        }
    };

    item.country_code = parsed.country_code;
    item.name = parsed.name;
    item.address = parsed.address;
    item.geocoded_point = parsed.geocoded_point;

    let finished = Utc::now();
    if parsed.field_errors.is_empty() {
        item.status = RowStatus::Parsed;
        item.processing_results.push(ProcessingResult::success(
            ProcessingAction::Parse,
            started,
            finished,
            ProcessingDetail::Parsed {
                pre_geocoded: parsed.pre_geocoded,
            },
        ));
        counter!("facilitymatch.rows_parsed.total", 1, "outcome" => "ok");
    } else {
        item.status = RowStatus::ErrorParsing;
        let message = parsed
            .field_errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        item.processing_results.push(ProcessingResult::error(
            ProcessingAction::Parse,
            started,
            finished,
            message,
            None,
        ));
        counter!("facilitymatch.rows_parsed.total", 1, "outcome" => "error");
    }

    item
}

#[instrument(level = "debug", skip_all, fields(item_id = %item.id))]
async fn geocode_stage(
    mut item: FacilityListItem,
    geocoder: &dyn Geocoder,
    call_timeout: Duration,
    max_retries: u8,
) -> FacilityListItem {
    debug_assert!(item.status.is_parsed());
    let started = Utc::now();

    let pre_geocoded = matches!(
        item.processing_results.last().map(|r| &r.detail),
        Some(ProcessingDetail::Parsed {
            pre_geocoded: true
        })
    );

    if pre_geocoded {
        item.geocoded_address = item.address.clone();
        item.status = RowStatus::Geocoded;
        let finished = Utc::now();
        item.processing_results.push(ProcessingResult::success(
            ProcessingAction::Geocode,
            started,
            finished,
            ProcessingDetail::Geocoded {
                skipped_geocoder: true,
                raw_response: None,
            },
        ));
        counter!("facilitymatch.rows_geocoded.total", 1, "outcome" => "skipped");
        return item;
    }

    let (address, country) = match (item.address.clone(), item.country_code) {
        (Some(address), Some(country)) => (address, country),
        _ => {
            item.status = RowStatus::ErrorGeocoding;
            let finished = Utc::now();
            item.processing_results.push(ProcessingResult::error(
                ProcessingAction::Geocode,
                started,
                finished,
                "row has no address or country to geocode",
                None,
            ));
            counter!("facilitymatch.rows_geocoded.total", 1, "outcome" => "error");
            return item;
        }
    };

    let mut failures: u8 = 0;
    let mut retry_wait = Duration::from_secs(2);
    let outcome = loop {
        let call = timeout(call_timeout, geocoder.geocode(&address, country)).await;
        match call {
            Ok(Ok(outcome)) => break Ok(outcome),
            Ok(Err(_)) if failures < max_retries => {
                failures += 1;
                counter!("facilitymatch.geocode_retries.total", 1);
                tokio::time::sleep(retry_wait).await;
                retry_wait *= 2;
            }
            Ok(Err(err)) => break Err(err),
            Err(_) => break Err(GeocodeError::Timeout),
        }
    };

    let finished = Utc::now();
    match outcome {
        Ok(GeocodeOutcome::Found {
            point,
            geocoded_address,
            raw_response,
        }) => {
            item.geocoded_point = Some(point);
            item.geocoded_address = Some(geocoded_address);
            item.status = RowStatus::Geocoded;
            item.processing_results.push(ProcessingResult::success(
                ProcessingAction::Geocode,
                started,
                finished,
                ProcessingDetail::Geocoded {
                    skipped_geocoder: false,
                    raw_response: Some(raw_response),
                },
            ));
            counter!("facilitymatch.rows_geocoded.total", 1, "outcome" => "ok");
        }
        Ok(GeocodeOutcome::NoResults { raw_response }) => {
            item.status = RowStatus::GeocodedNoResults;
            item.processing_results.push(ProcessingResult::success(
                ProcessingAction::Geocode,
                started,
                finished,
                ProcessingDetail::Geocoded {
                    skipped_geocoder: false,
                    raw_response: Some(raw_response),
                },
            ));
            counter!("facilitymatch.rows_geocoded.total", 1, "outcome" => "no_results");
        }
        Err(err) => {
            item.status = RowStatus::ErrorGeocoding;
            item.processing_results.push(ProcessingResult::error(
                ProcessingAction::Geocode,
                started,
                finished,
                err.to_string(),
                None,
            ));
            counter!("facilitymatch.rows_geocoded.total", 1, "outcome" => "error");
        }
    }

    item
}

/// Parse and geocode every `UPLOADED` row of a list, writing each row's
/// result back to the store as soon as it finishes. Rows complete out of
/// order; only their eventual status matters.
#[allow(clippy::too_many_arguments)]
pub async fn parse_and_geocode_list(
    store: &dyn FacilityListStore,
    header: &str,
    rows: Vec<FacilityListItem>,
    geocoder: Arc<dyn Geocoder>,
    concurrency: usize,
    call_timeout: Duration,
    max_retries: u8,
) {
    let mut stream = stream::iter(rows)
        .map(|item| {
            let geocoder = Arc::clone(&geocoder);
            let header = header.to_string();
            async move {
                let item = parse_stage(item, &header);
                if item.status.is_parsed() {
                    geocode_stage(item, geocoder.as_ref(), call_timeout, max_retries).await
                } else {
                    item
                }
            }
        })
        .buffer_unordered(concurrency);

    while let Some(item) = stream.next().await {
        store.update_item(item);
    }
}

fn cleaned_messy_set(
    items: &[FacilityListItem],
) -> HashMap<crate::model::FacilityListItemId, CleanedRecord> {
    let mut messy = HashMap::new();
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
            messy.insert(item.id, CleanedRecord { country, name, address });
        }
    }
    messy
}

fn cleaned_canonical_set(
    facilities: &[crate::model::Facility],
) -> HashMap<crate::model::FacilityId, CleanedRecord> {
    let mut canonical = HashMap::new();
    for facility in facilities {
        if let (CleanValue::Present(name), CleanValue::Present(address)) = (
            normalize::clean(&facility.name),
            normalize::clean(&facility.address),
        ) {
            canonical.insert(
                facility.id,
                CleanedRecord {
                    country: facility.country_code,
                    name,
                    address,
                },
            );
        }
    }
    canonical
}

/// Run the Matcher and Materializer for one list, serialized against any
/// other in-flight materialization of the same list.
pub async fn process_list(
    store: &Store,
    list_id: FacilityListId,
    config: &MatchConfig,
) -> Result<Materialized, anyhow::Error> {
    let list_lock = store.list_lock(list_id);
    let _guard = list_lock.lock().await;

    let items = store.items_for_list(list_id);
    let messy = cleaned_messy_set(&items);
    let facilities = store.all_facilities();
    let canonical = cleaned_canonical_set(&facilities);

    let freshly_fit = !config.model_file_path.exists();
    let mut gazetteer = if freshly_fit {
        Gazetteer::fit(
            &config.training_file_path,
            &config.model_file_path,
            &messy,
            &canonical,
            config.training_sample_size,
        )?
    } else {
        Gazetteer::load(&config.model_file_path)?
    };

    gazetteer.index(&canonical);
    if freshly_fit {
        gazetteer.cleanup();
        gazetteer.index(&canonical);
    }

    let matcher_config = MatcherConfig {
        automatic_threshold: config.automatic_threshold,
        gazetteer_threshold: config.gazetteer_threshold,
        recall_weight: config.recall_weight,
        code_version: config.code_version.clone(),
    };

    let outcome = matcher::run(&messy, &canonical, &gazetteer, &matcher_config)?;
    let summary = materializer::materialize(store, &outcome)?;
    Ok(summary)
}

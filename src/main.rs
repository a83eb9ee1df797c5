use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, info_span};

use facility_match::config::{Command, IngestArgs, InputFormat, Opt, ReprocessArgs};
use facility_match::errors::display_causes_and_backtrace;
use facility_match::geocoder::{shared_http_client, CachingGeocoder, HttpGeocoder};
use facility_match::ingest::{self, FileFormat};
use facility_match::model::{FacilityList, FacilityListId, FacilityListItem, FacilityListItemId};
use facility_match::pipeline;
use facility_match::store::{FacilityListStore, ListSnapshot, Store};
use facility_match::telemetry;

fn file_format(input_file: &std::path::Path, input_format: Option<InputFormat>) -> Result<FileFormat> {
    if let Some(format) = input_format {
        return Ok(match format {
            InputFormat::Csv => FileFormat::Csv,
            InputFormat::Xlsx => FileFormat::Xlsx,
        });
    }
    match input_file.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(FileFormat::Csv),
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") => Ok(FileFormat::Xlsx),
        _ => bail!(
            "could not infer file format for {:?}; pass --format explicitly",
            input_file
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let _span = info_span!("facility-match").entered();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let opt = Opt::parse();
    pipeline::describe_metrics();
    let _metrics_handle = telemetry::init_metrics(&opt.metrics_labels)?;

    let result = match &opt.command {
        Command::Ingest(args) => run_ingest(args).await,
        Command::Reprocess(args) => run_reprocess(args).await,
    };

    if let Err(err) = &result {
        display_causes_and_backtrace(err);
    }

    result
}

/// Parse, geocode, match, and materialize one uploaded list file, then write
/// a snapshot of the parsed/geocoded rows so a later `reprocess` run can
/// re-run matching without touching the parser or geocoder again.
async fn run_ingest(args: &IngestArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input_file)
        .with_context(|| format!("reading {:?}", args.input_file))?;
    let format = file_format(&args.input_file, args.input_format)?;
    let loaded = ingest::load(&bytes, format).context("loading uploaded file")?;

    let store = Store::new();
    let list = FacilityList {
        id: FacilityListId::new(),
        header: loaded.header.clone(),
        contributor: args.contributor.clone(),
    };
    let list_id = list.id;
    store.insert_list(list);

    let items: Vec<FacilityListItem> = loaded
        .rows
        .into_iter()
        .map(|raw_data| FacilityListItem::new(FacilityListItemId::new(), list_id, raw_data))
        .collect();
    info!(rows = items.len(), "loaded list");

    let endpoint = args
        .geocoder_endpoint
        .clone()
        .context("GEOCODER_ENDPOINT is required")?;
    let key = args
        .geocoder_key
        .clone()
        .context("GEOCODER_KEY is required")?;
    let client = shared_http_client(args.concurrency);
    let geocoder = Arc::new(CachingGeocoder::new(HttpGeocoder::new(client, endpoint, key)));

    pipeline::parse_and_geocode_list(
        &store,
        &loaded.header,
        items,
        geocoder,
        args.concurrency,
        Duration::from_secs(args.geocode_timeout_secs),
        args.max_retries,
    )
    .await;

    let snapshot = store
        .snapshot_list(list_id)
        .context("list vanished from the store immediately after insertion")?;
    write_snapshot(&args.snapshot_path, &snapshot)
        .with_context(|| format!("writing snapshot to {:?}", args.snapshot_path))?;

    let summary = pipeline::process_list(&store, list_id, &args.matching)
        .await
        .context("matching and materializing list")?;

    info!(
        auto_matched = summary.auto_matched,
        potential_matches = summary.potential_matches,
        new_facilities = summary.new_facilities,
        error_matching = summary.error_matching,
        "finished ingesting list"
    );

    Ok(())
}

/// Load a previously ingested list's snapshot and re-run only the Matcher
/// and Materializer over it, without re-parsing or re-geocoding any row.
async fn run_reprocess(args: &ReprocessArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot_path)
        .with_context(|| format!("reading snapshot from {:?}", args.snapshot_path))?;
    let list_id = snapshot.list.id;
    let row_count = snapshot.items.len();

    let store = Store::new();
    store.insert_list(snapshot.list);
    for item in snapshot.items {
        store.insert_item(item);
    }
    info!(rows = row_count, "loaded list snapshot");

    let summary = pipeline::process_list(&store, list_id, &args.matching)
        .await
        .context("matching and materializing list")?;

    info!(
        auto_matched = summary.auto_matched,
        potential_matches = summary.potential_matches,
        new_facilities = summary.new_facilities,
        error_matching = summary.error_matching,
        "finished reprocessing list"
    );

    Ok(())
}

fn write_snapshot(path: &std::path::Path, snapshot: &ListSnapshot) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

fn read_snapshot(path: &std::path::Path) -> Result<ListSnapshot> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

//! Error-handling utilities and the domain error taxonomy.

use anyhow::Error;
use thiserror::Error as ThisError;

/// Display an error, plus all the underlying "causes" (ie, wrapped errors), plus a
/// backtrace.
pub fn display_causes_and_backtrace(err: &Error) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
    eprintln!("{}", err.backtrace());
}

/// Errors raised while resolving a free-text country field to an ISO code.
#[derive(Debug, Clone, ThisError)]
pub enum CountryError {
    #[error("Could not find a country code for \"{0}\"")]
    Unknown(String),
}

/// Errors that abort an upload before any row is persisted.
#[derive(Debug, ThisError)]
pub enum UploadError {
    #[error("unsupported file encoding; please submit a UTF-8 CSV")]
    BadEncoding,

    #[error("this file may be damaged and cannot be processed safely")]
    MalformedArchive,

    #[error("no header row found in uploaded file")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Row-scoped errors produced while parsing a single row. These never abort
/// the list; they are recorded on the row and parsing continues.
#[derive(Debug, Clone, ThisError)]
pub enum ParseError {
    #[error(transparent)]
    Country(#[from] CountryError),

    #[error("there is a problem with the {field}: {message}")]
    FieldValidation { field: String, message: String },

    #[error("could not parse coordinates: {0}")]
    BadCoordinates(String),

    #[error("{0}")]
    Other(String),
}

/// Row-scoped errors produced while geocoding a single row.
#[derive(Debug, Clone, ThisError)]
pub enum GeocodeError {
    #[error("geocoder request timed out")]
    Timeout,

    #[error("geocoder request failed: {0}")]
    Provider(String),
}

/// Matcher-scoped errors. `ModelBlockingFailure` is recoverable (degrades the
/// matcher to "no candidates for anyone"); `Internal` aborts the batch and is
/// reported to telemetry.
#[derive(Debug, ThisError)]
pub enum MatchError {
    #[error("gazetteer model could not generate any candidate blocks")]
    ModelBlockingFailure,

    #[error("internal matcher error: {0}")]
    Internal(String),
}

/// Errors raised while materializing a matcher outcome. Any error here
/// aborts the whole materialization; nothing partially applied is visible.
#[derive(Debug, ThisError)]
pub enum MaterializeError {
    #[error("row {0} not found in store")]
    RowNotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

//! Loads an uploaded file into a raw header line plus raw row lines, ready
//! for the row parser. Two front ends (`csv`, `xlsx`) normalize their
//! respective formats down to the same shape.

mod csv_format;
mod xlsx_format;

pub use csv_format::load_csv;
pub use xlsx_format::load_xlsx;

/// A freshly uploaded list, not yet split into individual `FacilityListItem`s.
pub struct LoadedList {
    /// The raw header line, comma-joined field names.
    pub header: String,
    /// One raw line of CSV text per contributed row, in file order.
    pub rows: Vec<String>,
}

/// Which front end to use for a given upload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

/// Load an uploaded file's bytes into a `LoadedList`.
pub fn load(bytes: &[u8], format: FileFormat) -> Result<LoadedList, crate::errors::UploadError> {
    match format {
        FileFormat::Csv => load_csv(bytes),
        FileFormat::Xlsx => load_xlsx(bytes),
    }
}

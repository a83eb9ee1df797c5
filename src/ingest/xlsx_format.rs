//! XLSX front end: reads the first sheet via `calamine` and reshapes it into
//! the same raw header-line-plus-row-lines shape the CSV front end produces,
//! so the row parser never has to know which format a list came from.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, DataType, Reader, Xlsx};

use crate::errors::UploadError;

use super::LoadedList;

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(d) => d.to_string(),
        DataType::Duration(d) => d.to_string(),
        DataType::DateTimeIso(s) => s.clone(),
        DataType::DurationIso(s) => s.clone(),
        DataType::Error(_) => String::new(),
    }
}

/// Load an XLSX file's first sheet. Row 0 becomes the comma-joined header;
/// every subsequent row is quoted-CSV-encoded (`"a","b","c"`) so it can be
/// handed to the same per-row CSV splitter the CSV front end uses.
pub fn load_xlsx(bytes: &[u8]) -> Result<LoadedList, UploadError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
        .map_err(|_| UploadError::MalformedArchive)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(UploadError::Empty)?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .ok_or(UploadError::Empty)?
        .map_err(|_| UploadError::MalformedArchive)?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter.next().ok_or(UploadError::Empty)?;
    let header = header_row
        .iter()
        .map(cell_to_string)
        .collect::<Vec<_>>()
        .join(",");

    let rows = rows_iter
        .map(|row| {
            let quoted = row
                .iter()
                .map(cell_to_string)
                .collect::<Vec<_>>()
                .join("\",\"");
            format!("\"{}\"", quoted)
        })
        .collect();

    Ok(LoadedList { header, rows })
}

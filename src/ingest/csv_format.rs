//! CSV front end: splits an uploaded CSV file into a raw header line and raw
//! row lines, rejecting non-UTF-8 input.

use crate::errors::UploadError;

use super::LoadedList;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn decode_utf8(bytes: &[u8]) -> Result<&str, UploadError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|_| UploadError::BadEncoding)
}

/// Load a CSV file. The header is the first line (trailing newline
/// stripped); every subsequent line is kept as-is for the row parser, which
/// runs its own CSV field splitting on each line independently.
pub fn load_csv(bytes: &[u8]) -> Result<LoadedList, UploadError> {
    let text = decode_utf8(bytes)?;

    let mut lines = text.lines();
    let header = lines.next().ok_or(UploadError::Empty)?.to_string();
    let rows = lines.map(|line| line.to_string()).collect();

    Ok(LoadedList { header, rows })
}

//! Parses one raw CSV row against its list's header into typed fields,
//! matching §4.3: recognized columns are `country`, `name`, `address`,
//! `lat`, `lng`, case-insensitive; everything else is ignored.

use crate::country::{self, CountryCode};
use crate::errors::ParseError;
use crate::model::Point;

const NAME_MAX_LEN: usize = 200;
const ADDRESS_MAX_LEN: usize = 1000;

/// A field-scoped validation failure. Multiple may accumulate from a single
/// row; the row is marked `ERROR_PARSING` with one message per offending
/// field, while fields that parsed cleanly are still kept.
#[derive(Clone, Debug)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// The typed result of parsing one row. `field_errors` is empty on a fully
/// clean parse.
#[derive(Clone, Debug, Default)]
pub struct ParsedRow {
    pub country_code: Option<CountryCode>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub geocoded_point: Option<Point>,
    pub pre_geocoded: bool,
    pub field_errors: Vec<FieldError>,
}

impl ParsedRow {
    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }
}

fn split_csv_line(line: &str) -> Result<Vec<String>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(Ok(record)) => Ok(record.iter().map(str::to_string).collect()),
        Some(Err(e)) => Err(ParseError::Other(e.to_string())),
        None => Ok(Vec::new()),
    }
}

fn find<'a>(fields: &[String], values: &'a [String], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .position(|f| f == name)
        .and_then(|i| values.get(i))
        .map(String::as_str)
}

fn validate_length(field: &str, raw: &str, max_len: usize) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError {
            field: field.to_string(),
            message: format!("{field} must not be empty"),
        });
    }
    if trimmed.len() > max_len {
        return Err(FieldError {
            field: field.to_string(),
            message: format!("{field} must be at most {max_len} characters"),
        });
    }
    Ok(trimmed.to_string())
}

/// Parse one row. `header` and `raw_data` are raw CSV text lines, exactly as
/// stored on the `FacilityList`/`FacilityListItem`.
///
/// Returns `Err` only for errors that aren't attributable to a single field
/// (malformed CSV syntax in the line itself); everything else is reported
/// through `ParsedRow::field_errors`.
pub fn parse_row(header: &str, raw_data: &str) -> Result<ParsedRow, ParseError> {
    let fields: Vec<String> = split_csv_line(header)?
        .into_iter()
        .map(|f| f.trim().to_lowercase())
        .collect();
    let values = split_csv_line(raw_data)?;

    let mut field_errors = Vec::new();

    let country_code = match find(&fields, &values, "country") {
        Some(raw) if raw.trim().is_empty() => {
            field_errors.push(FieldError {
                field: "country".to_string(),
                message: "country must not be empty".to_string(),
            });
            None
        }
        Some(raw) => match country::resolve(raw) {
            Ok(code) => Some(code),
            Err(e) => {
                field_errors.push(FieldError {
                    field: "country".to_string(),
                    message: e.to_string(),
                });
                None
            }
        },
        None => None,
    };

    let name = match find(&fields, &values, "name") {
        Some(raw) => match validate_length("name", raw, NAME_MAX_LEN) {
            Ok(v) => Some(v),
            Err(e) => {
                field_errors.push(e);
                None
            }
        },
        None => None,
    };

    let address = match find(&fields, &values, "address") {
        Some(raw) => match validate_length("address", raw, ADDRESS_MAX_LEN) {
            Ok(v) => Some(v),
            Err(e) => {
                field_errors.push(e);
                None
            }
        },
        None => None,
    };

    let (geocoded_point, pre_geocoded) =
        match (find(&fields, &values, "lat"), find(&fields, &values, "lng")) {
            (Some(lat_raw), Some(lng_raw))
                if !lat_raw.trim().is_empty() && !lng_raw.trim().is_empty() =>
            {
                match (lat_raw.trim().parse::<f64>(), lng_raw.trim().parse::<f64>()) {
                    (Ok(lat), Ok(lng)) => (Some(Point { lat, lng }), true),
                    _ => {
                        field_errors.push(FieldError {
                            field: "lat/lng".to_string(),
                            message: format!(
                                "could not parse coordinates: {lat_raw},{lng_raw}"
                            ),
                        });
                        (None, false)
                    }
                }
            }
            _ => (None, false),
        };

    Ok(ParsedRow {
        country_code,
        name,
        address,
        geocoded_point,
        pre_geocoded,
        field_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_clean_row() {
        let parsed = parse_row("country,name,address", "US,Acme Mfg,100 Main St").unwrap();
        assert!(parsed.is_valid());
        assert_eq!(parsed.country_code.unwrap().as_str(), "US");
        assert_eq!(parsed.name.as_deref(), Some("Acme Mfg"));
        assert_eq!(parsed.address.as_deref(), Some("100 Main St"));
        assert!(!parsed.pre_geocoded);
    }

    #[test]
    fn marks_pre_geocoded_when_lat_lng_present() {
        let parsed = parse_row(
            "country,name,address,lat,lng",
            "DE,Beta Werk,Hauptstr 1,52.5,13.4",
        )
        .unwrap();
        assert!(parsed.is_valid());
        assert!(parsed.pre_geocoded);
        let point = parsed.geocoded_point.unwrap();
        assert_eq!(point.lat, 52.5);
        assert_eq!(point.lng, 13.4);
    }

    #[test]
    fn header_is_case_insensitive() {
        let parsed = parse_row("COUNTRY,NAME,ADDRESS", "US,Acme,100 Main St").unwrap();
        assert!(parsed.is_valid());
        assert_eq!(parsed.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn unknown_country_is_a_field_error() {
        let parsed = parse_row("country,name,address", "Narnia,Acme,100 Main St").unwrap();
        assert!(!parsed.is_valid());
        assert_eq!(parsed.field_errors[0].field, "country");
        assert_eq!(
            parsed.field_errors[0].message,
            "Could not find a country code for \"Narnia\""
        );
    }

    #[test]
    fn empty_country_column_is_a_field_error() {
        let parsed = parse_row("country,name,address", ",Acme,100 Main St").unwrap();
        assert!(!parsed.is_valid());
        assert!(parsed.country_code.is_none());
        assert_eq!(parsed.field_errors[0].field, "country");
        assert_eq!(parsed.field_errors[0].message, "country must not be empty");
    }

    #[test]
    fn missing_country_column_is_not_a_field_error() {
        let parsed = parse_row("name,address", "Acme,100 Main St").unwrap();
        assert!(parsed.is_valid());
        assert!(parsed.country_code.is_none());
    }

    #[test]
    fn empty_name_is_a_field_error_but_address_still_parses() {
        let parsed = parse_row("country,name,address", "US,,100 Main St").unwrap();
        assert!(!parsed.is_valid());
        assert!(parsed.name.is_none());
        assert_eq!(parsed.address.as_deref(), Some("100 Main St"));
    }

    #[test]
    fn ignores_unrecognized_columns() {
        let parsed = parse_row("country,name,address,phone", "US,Acme,100 Main St,555-1234").unwrap();
        assert!(parsed.is_valid());
        assert_eq!(parsed.name.as_deref(), Some("Acme"));
    }
}

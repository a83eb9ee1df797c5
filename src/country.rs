//! Resolves a free-text country field (an ISO alpha-2 code or a country
//! name, in any case) to a validated `CountryCode`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::errors::CountryError;

/// A validated ISO-3166 alpha-2 country code. The only way to build one is
/// through `resolve`, so a `CountryCode` in hand is always one of the codes
/// this table recognizes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("country codes are ascii")
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of recognized alpha-2 codes, uppercase. A representative subset
/// of ISO-3166; see DESIGN.md for why the full table isn't reproduced here.
static COUNTRY_CODES: &[&str] = &[
    "US", "CA", "MX", "GB", "FR", "DE", "IT", "ES", "PT", "NL", "BE", "CH",
    "AT", "SE", "NO", "DK", "FI", "IE", "PL", "CZ", "HU", "RO", "BG", "GR",
    "TR", "RU", "UA", "CN", "JP", "KR", "IN", "PK", "BD", "VN", "TH", "ID",
    "PH", "MY", "SG", "AU", "NZ", "ZA", "EG", "NG", "KE", "ET", "MA", "GH",
    "BR", "AR", "CL", "CO", "PE", "VE", "EC", "BO", "PY", "UY", "CR", "PA",
    "GT", "HN", "SV", "NI", "DO", "HT", "CU", "JM", "TT", "IL", "SA", "AE",
    "QA", "KW", "JO", "LB", "IQ", "IR", "LK", "MM", "KH", "LA", "MN",
    "TW", "HK", "NP", "AF",
];

/// Country-name to code lookup, lowercase names. A representative subset
/// mirroring the original implementation's static country-name table.
static COUNTRY_NAMES_TO_CODES: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        let pairs: &[(&str, &str)] = &[
            ("united states", "US"),
            ("united states of america", "US"),
            ("usa", "US"),
            ("canada", "CA"),
            ("mexico", "MX"),
            ("united kingdom", "GB"),
            ("great britain", "GB"),
            ("france", "FR"),
            ("germany", "DE"),
            ("italy", "IT"),
            ("spain", "ES"),
            ("portugal", "PT"),
            ("netherlands", "NL"),
            ("belgium", "BE"),
            ("switzerland", "CH"),
            ("austria", "AT"),
            ("sweden", "SE"),
            ("norway", "NO"),
            ("denmark", "DK"),
            ("finland", "FI"),
            ("ireland", "IE"),
            ("poland", "PL"),
            ("czech republic", "CZ"),
            ("hungary", "HU"),
            ("romania", "RO"),
            ("bulgaria", "BG"),
            ("greece", "GR"),
            ("turkey", "TR"),
            ("russia", "RU"),
            ("ukraine", "UA"),
            ("china", "CN"),
            ("japan", "JP"),
            ("south korea", "KR"),
            ("india", "IN"),
            ("pakistan", "PK"),
            ("bangladesh", "BD"),
            ("vietnam", "VN"),
            ("thailand", "TH"),
            ("indonesia", "ID"),
            ("philippines", "PH"),
            ("malaysia", "MY"),
            ("singapore", "SG"),
            ("australia", "AU"),
            ("new zealand", "NZ"),
            ("south africa", "ZA"),
            ("egypt", "EG"),
            ("nigeria", "NG"),
            ("kenya", "KE"),
            ("ethiopia", "ET"),
            ("morocco", "MA"),
            ("ghana", "GH"),
            ("brazil", "BR"),
            ("argentina", "AR"),
            ("chile", "CL"),
            ("colombia", "CO"),
            ("peru", "PE"),
            ("venezuela", "VE"),
            ("ecuador", "EC"),
            ("bolivia", "BO"),
            ("paraguay", "PY"),
            ("uruguay", "UY"),
            ("costa rica", "CR"),
            ("panama", "PA"),
            ("guatemala", "GT"),
            ("honduras", "HN"),
            ("el salvador", "SV"),
            ("nicaragua", "NI"),
            ("dominican republic", "DO"),
            ("haiti", "HT"),
            ("cuba", "CU"),
            ("jamaica", "JM"),
            ("trinidad and tobago", "TT"),
            ("israel", "IL"),
            ("saudi arabia", "SA"),
            ("united arab emirates", "AE"),
            ("qatar", "QA"),
            ("kuwait", "KW"),
            ("jordan", "JO"),
            ("lebanon", "LB"),
            ("iraq", "IQ"),
            ("iran", "IR"),
            ("sri lanka", "LK"),
            ("myanmar", "MM"),
            ("cambodia", "KH"),
            ("laos", "LA"),
            ("mongolia", "MN"),
            ("taiwan", "TW"),
            ("hong kong", "HK"),
            ("nepal", "NP"),
            ("afghanistan", "AF"),
        ];
        pairs.iter().copied().collect()
    });

fn code_bytes(code: &str) -> Option<[u8; 2]> {
    let bytes = code.as_bytes();
    if bytes.len() == 2 {
        Some([bytes[0], bytes[1]])
    } else {
        None
    }
}

/// Resolve a free-text country field. Tries the uppercased value as a code
/// first, then the lowercased value as a country name, matching the
/// original implementation's `get_country_code` precedence exactly.
pub fn resolve(raw: &str) -> Result<CountryCode, CountryError> {
    let upper = raw.to_uppercase();
    if COUNTRY_CODES.contains(&upper.as_str()) {
        let bytes = code_bytes(&upper).expect("checked against 2-letter table");
        return Ok(CountryCode(bytes));
    }

    let lower = raw.to_lowercase();
    if let Some(code) = COUNTRY_NAMES_TO_CODES.get(lower.as_str()) {
        let bytes = code_bytes(code).expect("table codes are always 2 letters");
        return Ok(CountryCode(bytes));
    }

    Err(CountryError::Unknown(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_code_case_insensitively() {
        assert_eq!(resolve("us").unwrap().as_str(), "US");
        assert_eq!(resolve("US").unwrap().as_str(), "US");
    }

    #[test]
    fn resolves_known_name_case_insensitively() {
        assert_eq!(resolve("United States").unwrap().as_str(), "US");
        assert_eq!(resolve("CANADA").unwrap().as_str(), "CA");
    }

    #[test]
    fn rejects_unknown_country() {
        let err = resolve("Narnia").unwrap_err();
        assert!(matches!(err, CountryError::Unknown(ref s) if s == "Narnia"));
    }
}

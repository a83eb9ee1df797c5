//! Removes punctuation and excess whitespace from a value before it is used
//! to compute match candidates. This must be the same normalization applied
//! when a gazetteer is trained, so that training data and live values are
//! comparable.

use std::fmt;

/// The result of `clean`. An explicit sum type standing in for the "empty
/// string becomes an absent value" sentinel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CleanValue {
    Present(String),
    Absent,
}

impl CleanValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            CleanValue::Present(s) => Some(s.as_str()),
            CleanValue::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CleanValue::Absent)
    }
}

impl fmt::Display for CleanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanValue::Present(s) => s.fmt(f),
            CleanValue::Absent => Ok(()),
        }
    }
}

/// Clean a raw field value: transliterate, strip punctuation, collapse
/// whitespace, lowercase. Order matters and mirrors the original
/// implementation exactly, since gazetteer training data was built against
/// it.
pub fn clean(value: &str) -> CleanValue {
    let transliterated = deunicode::deunicode(value);
    let no_newlines = transliterated.replace('\n', " ");
    let no_dashes = no_newlines.replace('-', "");
    let no_slashes = no_dashes.replace('/', " ");
    let no_apostrophes = no_slashes.replace('\'', "");
    let no_commas = no_apostrophes.replace(',', "");
    let no_colons = no_commas.replace(':', " ");
    let collapsed = collapse_spaces(&no_colons);
    let trimmed = collapsed
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_lowercase();
    let trimmed = trimmed.trim();

    if trimmed.is_empty() {
        CleanValue::Absent
    } else {
        CleanValue::Present(trimmed.to_string())
    }
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_lowercases() {
        assert_eq!(
            clean("O'Brien's Factory, Inc."),
            CleanValue::Present("obriens factory inc.".to_string())
        );
    }

    #[test]
    fn collapses_whitespace_and_newlines() {
        assert_eq!(
            clean("123  Main\nStreet"),
            CleanValue::Present("123 main street".to_string())
        );
    }

    #[test]
    fn replaces_slashes_and_colons_with_space() {
        assert_eq!(
            clean("Unit 4/B: Warehouse"),
            CleanValue::Present("unit 4 b warehouse".to_string())
        );
    }

    #[test]
    fn blank_input_is_absent() {
        assert_eq!(clean("   "), CleanValue::Absent);
        assert_eq!(clean(""), CleanValue::Absent);
    }

    #[test]
    fn strips_outer_quotes() {
        assert_eq!(
            clean("\"Acme Corp\""),
            CleanValue::Present("acme corp".to_string())
        );
    }
}

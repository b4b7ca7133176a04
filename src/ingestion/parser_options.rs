//! Value-level parsing options: null literals, number locale and date/time patterns.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// Null literals recognized when no explicit list is configured.
pub const DEFAULT_NULL_STRINGS: &[&str] = &["", "NA", "N/A", "null", "NULL", "None", "none"];

/// Built-in `chrono` patterns tried for [`crate::types::ColumnType::LocalDate`], in order.
pub const DEFAULT_DATE_PATTERNS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%d-%b-%Y"];

/// Built-in patterns tried for [`crate::types::ColumnType::LocalDateTime`], in order.
pub const DEFAULT_DATE_TIME_PATTERNS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Built-in patterns tried for [`crate::types::ColumnType::LocalTime`], in order.
pub const DEFAULT_TIME_PATTERNS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Decimal and grouping separators used for numeric parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberLocale {
    /// Separator between integer and fractional digits.
    pub decimal_separator: char,
    /// Thousands separator, if the locale uses one.
    pub grouping_separator: Option<char>,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: None,
        }
    }
}

impl NumberLocale {
    /// Create a locale from its separators.
    pub fn new(decimal_separator: char, grouping_separator: Option<char>) -> Self {
        Self {
            decimal_separator,
            grouping_separator,
        }
    }

    /// `1.234,5` style numbers.
    pub fn german() -> Self {
        Self::new(',', Some('.'))
    }

    fn is_plain(&self) -> bool {
        self.decimal_separator == '.' && self.grouping_separator.is_none()
    }

    /// Rewrite a locale-formatted number into `.`-decimal form without grouping.
    ///
    /// Grouping separators are only accepted in the integer part, between groups of exactly three
    /// digits (`1.234.567`). Returns `None` for misplaced grouping, or if the text contains a `.`
    /// that is neither the decimal nor the grouping separator of this locale.
    pub fn normalize<'a>(&self, raw: &'a str) -> Option<Cow<'a, str>> {
        if self.is_plain() {
            return Some(Cow::Borrowed(raw));
        }
        if raw.contains('.') && self.decimal_separator != '.' && self.grouping_separator != Some('.') {
            return None;
        }
        let (int_part, frac_part) = match raw.split_once(self.decimal_separator) {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (raw, None),
        };

        let mut out = String::with_capacity(raw.len());
        match self.grouping_separator {
            Some(g) if int_part.contains(g) => {
                let (sign, digits) = match int_part.strip_prefix(['+', '-']) {
                    Some(digits) => (&int_part[..1], digits),
                    None => ("", int_part),
                };
                if !is_grouped(digits, g) {
                    return None;
                }
                out.push_str(sign);
                out.extend(digits.chars().filter(|&c| c != g));
            }
            _ => out.push_str(int_part),
        }
        if let Some(frac_part) = frac_part {
            if self.grouping_separator.is_some_and(|g| frac_part.contains(g)) {
                return None;
            }
            out.push('.');
            out.push_str(frac_part);
        }
        Some(Cow::Owned(out))
    }
}

/// `1.234.567` style: a leading group of one to three digits, then groups of exactly three.
fn is_grouped(digits: &str, separator: char) -> bool {
    let mut groups = digits.split(separator);
    let all_digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());
    match groups.next() {
        Some(first) if (1..=3).contains(&first.len()) && all_digits(first) => {
            groups.all(|g| g.len() == 3 && all_digits(g))
        }
        _ => false,
    }
}

/// Options controlling how raw strings are turned into typed values.
///
/// One instance applies to the whole read; individual columns may carry their own override
/// through [`crate::ingestion::ReadOptions::column_parser_options`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Values mapped to the missing marker regardless of column type.
    pub null_strings: Vec<String>,
    pub locale: NumberLocale,
    /// Date patterns; `None` uses [`DEFAULT_DATE_PATTERNS`].
    pub date_patterns: Option<Vec<String>>,
    /// Date-time patterns; `None` uses [`DEFAULT_DATE_TIME_PATTERNS`].
    pub date_time_patterns: Option<Vec<String>>,
    /// Time patterns; `None` uses [`DEFAULT_TIME_PATTERNS`].
    pub time_patterns: Option<Vec<String>>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            null_strings: DEFAULT_NULL_STRINGS.iter().map(|s| s.to_string()).collect(),
            locale: NumberLocale::default(),
            date_patterns: None,
            date_time_patterns: None,
            time_patterns: None,
        }
    }
}

impl ParserOptions {
    /// True if `raw` is one of the null literals.
    pub fn is_null(&self, raw: &str) -> bool {
        self.null_strings.iter().any(|n| n == raw)
    }

    /// Date patterns in trial order.
    pub fn date_patterns(&self) -> Vec<String> {
        patterns_or_default(&self.date_patterns, DEFAULT_DATE_PATTERNS)
    }

    /// Date-time patterns in trial order.
    pub fn date_time_patterns(&self) -> Vec<String> {
        patterns_or_default(&self.date_time_patterns, DEFAULT_DATE_TIME_PATTERNS)
    }

    /// Time patterns in trial order.
    pub fn time_patterns(&self) -> Vec<String> {
        patterns_or_default(&self.time_patterns, DEFAULT_TIME_PATTERNS)
    }

    /// Check separators differ and explicit pattern lists are non-empty.
    pub fn validate(&self) -> IngestionResult<()> {
        if Some(self.locale.decimal_separator) == self.locale.grouping_separator {
            return Err(IngestionError::configuration(
                "decimal and grouping separators must differ",
            ));
        }
        for (kind, list) in [
            ("date", &self.date_patterns),
            ("date-time", &self.date_time_patterns),
            ("time", &self.time_patterns),
        ] {
            if list.as_ref().is_some_and(Vec::is_empty) {
                return Err(IngestionError::configuration(format!(
                    "explicit {kind} pattern list must not be empty"
                )));
            }
        }
        Ok(())
    }
}

fn patterns_or_default(explicit: &Option<Vec<String>>, defaults: &[&str]) -> Vec<String> {
    match explicit {
        Some(list) => list.clone(),
        None => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_null_literals() {
        let p = ParserOptions::default();
        assert!(p.is_null(""));
        assert!(p.is_null("NA"));
        assert!(!p.is_null("na "));
        assert!(!p.is_null("0"));
    }

    #[test]
    fn german_locale_normalizes_numbers() {
        let l = NumberLocale::german();
        assert_eq!(l.normalize("1.234,5").as_deref(), Some("1234.5"));
        assert_eq!(NumberLocale::new(',', None).normalize("1.5"), None);
        assert_eq!(NumberLocale::default().normalize("1.5").as_deref(), Some("1.5"));
        assert_eq!(l.normalize("-1.234.567").as_deref(), Some("-1234567"));
    }

    #[test]
    fn grouping_needs_three_digit_groups() {
        let l = NumberLocale::german();
        assert_eq!(l.normalize("15.01.2024"), None);
        assert_eq!(l.normalize("1.23"), None);
        assert_eq!(l.normalize(".123"), None);
        assert_eq!(l.normalize("1234.567"), None);
        assert_eq!(l.normalize("1,2.5"), None);
        assert_eq!(l.normalize("12,5").as_deref(), Some("12.5"));
    }

    #[test]
    fn validation_rejects_clashing_separators_and_empty_patterns() {
        let mut p = ParserOptions::default();
        p.locale = NumberLocale::new(',', Some(','));
        assert!(p.validate().is_err());

        let p = ParserOptions {
            date_patterns: Some(vec![]),
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }
}

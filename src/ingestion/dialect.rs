//! Dialect configuration: the lexical rules used to split text into records and fields.

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// How a physical line is split into fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldLayout {
    /// Fields are separated by a single delimiter character and may be quoted.
    Delimited { delimiter: char },
    /// Fields start at fixed character offsets. No quoting is processed.
    ///
    /// Column `i` spans `boundaries[i]..boundaries[i + 1]`; the last column runs to the end of
    /// the line.
    FixedWidth { boundaries: Vec<usize> },
    /// Fixed-width columns whose boundaries come from the first record line.
    ///
    /// A column starts at offset 0 and at every non-whitespace character that follows
    /// whitespace. The tokenizer replaces this layout with [`FieldLayout::FixedWidth`] once that
    /// line has been read.
    FixedWidthFromHeader,
}

/// Immutable, validated description of a delimited-text dialect.
///
/// Construct one with [`Dialect::csv`], [`Dialect::tsv`], [`Dialect::delimited`],
/// [`Dialect::fixed_width`] or [`Dialect::fixed_width_from_header`] and refine it with the `with_*` methods. Every constructor and
/// modifier that can produce an inconsistent dialect validates and returns
/// [`IngestionError::Configuration`].
///
/// Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DialectConfig", into = "DialectConfig")]
pub struct Dialect {
    layout: FieldLayout,
    quote: char,
    ignore_surrounding_spaces: bool,
    trim_inside_quoted: bool,
    ignore_empty_lines: bool,
    comment: Option<char>,
    allow_unterminated_quote: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::csv()
    }
}

impl Dialect {
    /// Comma-separated values with `"` quoting.
    pub fn csv() -> Self {
        Self {
            layout: FieldLayout::Delimited { delimiter: ',' },
            quote: '"',
            ignore_surrounding_spaces: true,
            trim_inside_quoted: false,
            ignore_empty_lines: false,
            comment: None,
            allow_unterminated_quote: false,
        }
    }

    /// Tab-separated values with `"` quoting.
    pub fn tsv() -> Self {
        Self {
            layout: FieldLayout::Delimited { delimiter: '\t' },
            ..Self::csv()
        }
    }

    /// CSV defaults with a custom delimiter.
    pub fn delimited(delimiter: char) -> IngestionResult<Self> {
        Self {
            layout: FieldLayout::Delimited { delimiter },
            ..Self::csv()
        }
        .validated()
    }

    /// Fixed-width layout from column start offsets (in characters).
    pub fn fixed_width(boundaries: Vec<usize>) -> IngestionResult<Self> {
        Self {
            layout: FieldLayout::FixedWidth { boundaries },
            ..Self::csv()
        }
        .validated()
    }

    /// Fixed-width layout from column widths; the first column starts at offset 0.
    pub fn fixed_widths(widths: &[usize]) -> IngestionResult<Self> {
        if let Some(pos) = widths.iter().position(|&w| w == 0) {
            return Err(IngestionError::configuration(format!(
                "fixed column width at position {pos} must be > 0"
            )));
        }
        let mut boundaries = Vec::with_capacity(widths.len());
        let mut offset = 0usize;
        for w in widths {
            boundaries.push(offset);
            offset += w;
        }
        Self::fixed_width(boundaries)
    }

    /// Fixed-width layout with column boundaries taken from the header line.
    ///
    /// ```
    /// use delimited_ingestion::ingestion::Dialect;
    ///
    /// let d = Dialect::fixed_width_from_header().resolve_boundaries("id   name  score").unwrap();
    /// assert_eq!(d.boundaries(), Some(&[0, 5, 11][..]));
    /// ```
    pub fn fixed_width_from_header() -> Self {
        Self {
            layout: FieldLayout::FixedWidthFromHeader,
            ..Self::csv()
        }
    }

    /// Fix header-derived boundaries from `header_line`.
    ///
    /// Other layouts are returned unchanged. Fails with [`IngestionError::Configuration`] if the
    /// line holds no column names.
    pub fn resolve_boundaries(&self, header_line: &str) -> IngestionResult<Self> {
        if self.layout != FieldLayout::FixedWidthFromHeader {
            return Ok(self.clone());
        }
        let mut boundaries = Vec::new();
        let mut prev_blank = true;
        for (pos, c) in header_line.chars().enumerate() {
            let blank = self.is_trim_char(c);
            if !blank && prev_blank {
                boundaries.push(pos);
            }
            prev_blank = blank;
        }
        if boundaries.is_empty() {
            return Err(IngestionError::configuration(
                "cannot derive fixed-width columns from a blank header line",
            ));
        }
        boundaries[0] = 0;
        Self {
            layout: FieldLayout::FixedWidth { boundaries },
            ..self.clone()
        }
        .validated()
    }

    /// Set the quote character.
    pub fn with_quote(mut self, quote: char) -> IngestionResult<Self> {
        self.quote = quote;
        self.validated()
    }

    /// Set the comment character; lines starting with it are skipped.
    pub fn with_comment(mut self, comment: Option<char>) -> IngestionResult<Self> {
        self.comment = comment;
        self.validated()
    }

    /// Trim spaces and tabs around unquoted fields and outside quotes.
    pub fn with_ignore_surrounding_spaces(mut self, on: bool) -> Self {
        self.ignore_surrounding_spaces = on;
        self
    }

    /// Trim spaces and tabs inside quoted fields.
    pub fn with_trim_inside_quoted(mut self, on: bool) -> Self {
        self.trim_inside_quoted = on;
        self
    }

    /// Skip empty physical lines instead of emitting them as records.
    pub fn with_ignore_empty_lines(mut self, on: bool) -> Self {
        self.ignore_empty_lines = on;
        self
    }

    /// Close a quoted field implicitly at end of input instead of failing.
    pub fn with_allow_unterminated_quote(mut self, on: bool) -> Self {
        self.allow_unterminated_quote = on;
        self
    }

    /// How lines are split into fields.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Field delimiter, or `None` in fixed-width mode.
    pub fn delimiter(&self) -> Option<char> {
        match &self.layout {
            FieldLayout::Delimited { delimiter } => Some(*delimiter),
            FieldLayout::FixedWidth { .. } | FieldLayout::FixedWidthFromHeader => None,
        }
    }

    /// Fixed-width column start offsets, or `None` in delimited mode and before header-derived
    /// boundaries are resolved.
    pub fn boundaries(&self) -> Option<&[usize]> {
        match &self.layout {
            FieldLayout::FixedWidth { boundaries } => Some(boundaries),
            FieldLayout::Delimited { .. } | FieldLayout::FixedWidthFromHeader => None,
        }
    }

    /// True for either fixed-width layout.
    pub fn is_fixed_width(&self) -> bool {
        self.delimiter().is_none()
    }

    /// False until header-derived boundaries have been resolved.
    pub fn has_boundaries_resolved(&self) -> bool {
        self.layout != FieldLayout::FixedWidthFromHeader
    }

    /// Quote character. Ignored in fixed-width mode.
    pub fn quote(&self) -> char {
        self.quote
    }

    /// Whether spaces and tabs around unquoted fields are trimmed.
    pub fn ignore_surrounding_spaces(&self) -> bool {
        self.ignore_surrounding_spaces
    }

    /// Whether spaces and tabs inside quoted fields are trimmed.
    pub fn trim_inside_quoted(&self) -> bool {
        self.trim_inside_quoted
    }

    /// Whether empty physical lines are skipped.
    pub fn ignore_empty_lines(&self) -> bool {
        self.ignore_empty_lines
    }

    /// Comment character, if any.
    pub fn comment(&self) -> Option<char> {
        self.comment
    }

    /// Whether a quote left open at end of input closes implicitly.
    pub fn allow_unterminated_quote(&self) -> bool {
        self.allow_unterminated_quote
    }

    /// Whether `c` is trimmable whitespace under this dialect.
    ///
    /// A tab delimiter is never whitespace.
    pub(crate) fn is_trim_char(&self, c: char) -> bool {
        (c == ' ' || c == '\t') && Some(c) != self.delimiter()
    }

    fn validated(self) -> IngestionResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check the invariants every dialect must hold.
    pub fn validate(&self) -> IngestionResult<()> {
        let is_newline = |c: char| c == '\n' || c == '\r';

        if is_newline(self.quote) {
            return Err(IngestionError::configuration(
                "quote character cannot be a line terminator",
            ));
        }
        match &self.layout {
            FieldLayout::Delimited { delimiter } => {
                if *delimiter == self.quote {
                    return Err(IngestionError::configuration(format!(
                        "delimiter and quote character must differ (both are {delimiter:?})"
                    )));
                }
                if is_newline(*delimiter) {
                    return Err(IngestionError::configuration(
                        "delimiter cannot be a line terminator",
                    ));
                }
                if self.comment == Some(*delimiter) {
                    return Err(IngestionError::configuration(
                        "comment character and delimiter must differ",
                    ));
                }
            }
            FieldLayout::FixedWidth { boundaries } => {
                if boundaries.is_empty() {
                    return Err(IngestionError::configuration(
                        "fixed-width layout needs at least one column boundary",
                    ));
                }
                if let Some(w) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
                    return Err(IngestionError::configuration(format!(
                        "fixed-width boundaries must be strictly increasing ({} then {})",
                        w[0], w[1]
                    )));
                }
            }
            FieldLayout::FixedWidthFromHeader => {}
        }
        if let Some(c) = self.comment {
            if c == self.quote || is_newline(c) {
                return Err(IngestionError::configuration(format!(
                    "invalid comment character {c:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Serialized form of [`Dialect`]; converted through validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DialectConfig {
    delimiter: char,
    fixed_boundaries: Option<Vec<usize>>,
    fixed_from_header: bool,
    quote: char,
    ignore_surrounding_spaces: bool,
    trim_inside_quoted: bool,
    ignore_empty_lines: bool,
    comment: Option<char>,
    allow_unterminated_quote: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Dialect::csv().into()
    }
}

impl From<Dialect> for DialectConfig {
    fn from(d: Dialect) -> Self {
        let (delimiter, fixed_boundaries, fixed_from_header) = match d.layout {
            FieldLayout::Delimited { delimiter } => (delimiter, None, false),
            FieldLayout::FixedWidth { boundaries } => (',', Some(boundaries), false),
            FieldLayout::FixedWidthFromHeader => (',', None, true),
        };
        Self {
            delimiter,
            fixed_boundaries,
            fixed_from_header,
            quote: d.quote,
            ignore_surrounding_spaces: d.ignore_surrounding_spaces,
            trim_inside_quoted: d.trim_inside_quoted,
            ignore_empty_lines: d.ignore_empty_lines,
            comment: d.comment,
            allow_unterminated_quote: d.allow_unterminated_quote,
        }
    }
}

impl TryFrom<DialectConfig> for Dialect {
    type Error = IngestionError;

    fn try_from(c: DialectConfig) -> Result<Self, Self::Error> {
        let layout = match (c.fixed_boundaries, c.fixed_from_header) {
            (Some(_), true) => {
                return Err(IngestionError::configuration(
                    "fixed_boundaries and fixed_from_header are mutually exclusive",
                ));
            }
            (Some(boundaries), false) => FieldLayout::FixedWidth { boundaries },
            (None, true) => FieldLayout::FixedWidthFromHeader,
            (None, false) => FieldLayout::Delimited {
                delimiter: c.delimiter,
            },
        };
        Self {
            layout,
            quote: c.quote,
            ignore_surrounding_spaces: c.ignore_surrounding_spaces,
            trim_inside_quoted: c.trim_inside_quoted,
            ignore_empty_lines: c.ignore_empty_lines,
            comment: c.comment,
            allow_unterminated_quote: c.allow_unterminated_quote,
        }
        .validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(Dialect::csv().validate().is_ok());
        assert_eq!(Dialect::tsv().delimiter(), Some('\t'));
        assert!(Dialect::tsv().is_trim_char(' '));
        assert!(!Dialect::tsv().is_trim_char('\t'));
    }

    #[test]
    fn delimiter_equal_to_quote_is_rejected() {
        let err = Dialect::delimited('"').unwrap_err();
        assert!(matches!(err, IngestionError::Configuration { .. }));

        let err = Dialect::csv().with_quote(',').unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn newline_delimiter_is_rejected() {
        assert!(Dialect::delimited('\n').is_err());
        assert!(Dialect::csv().with_quote('\r').is_err());
    }

    #[test]
    fn fixed_width_boundaries_must_increase() {
        assert!(Dialect::fixed_width(vec![0, 4, 9]).is_ok());
        assert!(Dialect::fixed_width(vec![0, 4, 4]).is_err());
        assert!(Dialect::fixed_width(vec![5, 2]).is_err());
        assert!(Dialect::fixed_width(vec![]).is_err());
    }

    #[test]
    fn fixed_widths_convert_to_boundaries() {
        let d = Dialect::fixed_widths(&[3, 5, 2]).unwrap();
        assert_eq!(d.boundaries(), Some(&[0, 3, 8][..]));
        assert_eq!(d.delimiter(), None);
        assert!(Dialect::fixed_widths(&[3, 0]).is_err());
    }

    #[test]
    fn header_line_defines_fixed_width_columns() {
        let d = Dialect::fixed_width_from_header();
        assert!(d.is_fixed_width());
        assert!(!d.has_boundaries_resolved());
        assert_eq!(d.boundaries(), None);

        let resolved = d.resolve_boundaries("  id name\tscore  ").unwrap();
        assert!(resolved.has_boundaries_resolved());
        assert_eq!(resolved.boundaries(), Some(&[0, 5, 10][..]));

        assert!(d.resolve_boundaries("   ").is_err());
        let csv = Dialect::csv();
        assert_eq!(csv.resolve_boundaries("a   b").unwrap(), csv);
    }

    #[test]
    fn comment_must_not_clash() {
        assert!(Dialect::csv().with_comment(Some('#')).is_ok());
        assert!(Dialect::csv().with_comment(Some(',')).is_err());
        assert!(Dialect::csv().with_comment(Some('"')).is_err());
    }
}

//! Record tokenizer.
//!
//! [`Tokenizer`] turns a buffered character stream into a lazy sequence of [`RawRecord`]s. It
//! reads one physical line at a time and drives a small quote state machine across lines, so a
//! quoted field may contain delimiters and line terminators. Fixed-width dialects bypass the state
//! machine and slice each line at the configured boundaries. Header-derived boundaries are fixed
//! from the first record line the tokenizer reads.
//!
//! The same state machine backs [`find_split_points`], which locates record starts for chunked
//! parsing without materializing any fields.

use std::io::BufRead;
use std::mem;

use crate::error::{IngestionError, IngestionResult};

use super::dialect::Dialect;

/// One logical row of unparsed field strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Field values after quote removal and trimming.
    pub fields: Vec<String>,
    /// 1-based physical line on which the record starts.
    pub line: usize,
}

impl RawRecord {
    /// Create a record starting on `line`.
    pub fn new(fields: Vec<String>, line: usize) -> Self {
        Self { fields, line }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reassembled record text used in diagnostics.
    pub fn display_raw(&self, dialect: &Dialect) -> String {
        let sep = dialect.delimiter().map(String::from).unwrap_or_default();
        self.fields.join(&sep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside quotes; also the state at the start of every field.
    Unquoted,
    /// Inside a quoted field.
    Quoted,
    /// Saw a quote inside a quoted field: either an escaped quote or the closing one.
    QuoteInQuoted,
    /// Closed a quoted field and skipping whitespace before the delimiter.
    AfterQuoted,
}

/// Character-level quote state machine shared by the tokenizer and the split scanner.
///
/// In scanning mode no field text is kept; only the state transitions are tracked.
#[derive(Debug)]
struct RecordMachine {
    delimiter: char,
    quote: char,
    ignore_surrounding_spaces: bool,
    trim_inside_quoted: bool,
    collect: bool,

    state: State,
    quoted: bool,
    field_chars: usize,
    field_blank: bool,
    field: String,
    pending_ws: String,
    fields: Vec<String>,
}

impl RecordMachine {
    fn new(dialect: &Dialect, collect: bool) -> Self {
        Self {
            // Fixed-width dialects never feed the machine; the delimiter is irrelevant there.
            delimiter: dialect.delimiter().unwrap_or(','),
            quote: dialect.quote(),
            ignore_surrounding_spaces: dialect.ignore_surrounding_spaces(),
            trim_inside_quoted: dialect.trim_inside_quoted(),
            collect,
            state: State::Unquoted,
            quoted: false,
            field_chars: 0,
            field_blank: true,
            field: String::new(),
            pending_ws: String::new(),
            fields: Vec::new(),
        }
    }

    fn is_trim_char(&self, c: char) -> bool {
        (c == ' ' || c == '\t') && c != self.delimiter
    }

    fn push(&mut self, c: char) {
        self.field_chars += 1;
        if !self.is_trim_char(c) {
            self.field_blank = false;
        }
        if self.collect {
            self.field.push(c);
        }
    }

    fn can_open_quote(&self) -> bool {
        !self.quoted
            && (self.field_chars == 0 || (self.ignore_surrounding_spaces && self.field_blank))
    }

    fn emit_field(&mut self) {
        if self.collect {
            let raw = mem::take(&mut self.field);
            let trim = if self.quoted {
                self.trim_inside_quoted
            } else {
                self.ignore_surrounding_spaces
            };
            let value = if trim {
                let delimiter = self.delimiter;
                let trimmed = raw.trim_matches(|c: char| (c == ' ' || c == '\t') && c != delimiter);
                if trimmed.len() == raw.len() {
                    raw
                } else {
                    trimmed.to_string()
                }
            } else {
                raw
            };
            self.fields.push(value);
        }
        self.field.clear();
        self.pending_ws.clear();
        self.field_chars = 0;
        self.field_blank = true;
        self.quoted = false;
        self.state = State::Unquoted;
    }

    fn step(&mut self, c: char) {
        match self.state {
            State::Unquoted => {
                if c == self.delimiter {
                    self.emit_field();
                } else if c == self.quote && self.can_open_quote() {
                    self.field.clear();
                    self.field_chars = 0;
                    self.field_blank = true;
                    self.quoted = true;
                    self.state = State::Quoted;
                } else {
                    self.push(c);
                }
            }
            State::Quoted => {
                if c == self.quote {
                    self.state = State::QuoteInQuoted;
                } else {
                    self.push(c);
                }
            }
            State::QuoteInQuoted => {
                if c == self.quote {
                    self.push(self.quote);
                    self.state = State::Quoted;
                } else if c == self.delimiter {
                    self.emit_field();
                } else if self.ignore_surrounding_spaces && self.is_trim_char(c) {
                    self.pending_ws.push(c);
                    self.state = State::AfterQuoted;
                } else {
                    // A lone quote followed by anything else is literal.
                    self.push(self.quote);
                    self.push(c);
                    self.state = State::Quoted;
                }
            }
            State::AfterQuoted => {
                if c == self.delimiter {
                    self.emit_field();
                } else if self.is_trim_char(c) {
                    self.pending_ws.push(c);
                } else {
                    self.push(self.quote);
                    let ws = mem::take(&mut self.pending_ws);
                    for w in ws.chars() {
                        self.push(w);
                    }
                    self.state = State::Quoted;
                    self.step(c);
                }
            }
        }
    }

    fn feed_line(&mut self, content: &str) {
        for c in content.chars() {
            self.step(c);
        }
    }

    /// Handle the end of a physical line. Returns `true` if the record is complete.
    fn end_of_line(&mut self, terminator: &str) -> bool {
        match self.state {
            State::Quoted => {
                for c in terminator.chars() {
                    self.push(c);
                }
                false
            }
            State::Unquoted | State::QuoteInQuoted | State::AfterQuoted => {
                self.emit_field();
                true
            }
        }
    }

    fn take_record(&mut self) -> Vec<String> {
        mem::take(&mut self.fields)
    }

    /// Close the current field at end of input and return whatever was collected.
    fn close_at_eof(&mut self) -> Vec<String> {
        self.emit_field();
        self.take_record()
    }
}

/// Split a line into its content and its terminator (`"\n"`, `"\r\n"` or `""`).
fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

fn slice_fixed_width(content: &str, boundaries: &[usize], dialect: &Dialect) -> Vec<String> {
    let char_len = content.chars().count();
    // Byte offset of every char position, plus the end.
    let byte_at = |pos: usize| -> usize {
        content
            .char_indices()
            .nth(pos)
            .map(|(i, _)| i)
            .unwrap_or(content.len())
    };

    let mut fields = Vec::with_capacity(boundaries.len());
    for (i, &start) in boundaries.iter().enumerate() {
        if start >= char_len {
            break;
        }
        let end = boundaries.get(i + 1).copied().unwrap_or(char_len).min(char_len);
        let slice = &content[byte_at(start)..byte_at(end)];
        let value = if dialect.ignore_surrounding_spaces() {
            slice.trim_matches(|c: char| dialect.is_trim_char(c))
        } else {
            slice
        };
        fields.push(value.to_string());
    }
    fields
}

/// Lazy, forward-only record reader over a buffered character stream.
///
/// The stream is consumed exactly once. Iteration yields `Err` for records that cannot be
/// tokenized; the iterator can continue after such an error.
pub struct Tokenizer<R> {
    reader: R,
    dialect: Dialect,
    machine: RecordMachine,
    buf: String,
    line: usize,
    offset: usize,
    skip: usize,
    remaining: Option<usize>,
    finished: bool,
}

impl<R: BufRead> Tokenizer<R> {
    /// Tokenize `reader` under `dialect`, numbering lines from 1.
    pub fn new(reader: R, dialect: &Dialect) -> Self {
        Self {
            reader,
            dialect: dialect.clone(),
            machine: RecordMachine::new(dialect, true),
            buf: String::new(),
            line: 0,
            offset: 0,
            skip: 0,
            remaining: None,
            finished: false,
        }
    }

    /// Number the first physical line `first_line` instead of 1.
    pub fn with_first_line(mut self, first_line: usize) -> Self {
        self.line = first_line.saturating_sub(1);
        self
    }

    /// Discard `n` physical lines before tokenizing.
    pub fn with_skip_lines(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Stop after emitting `limit` records, leaving the rest of the input unread.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.remaining = limit;
        self
    }

    /// Bytes consumed from the stream so far.
    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    /// Number of the last physical line consumed.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The dialect in effect, with header-derived boundaries resolved once the first record line
    /// has been read.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn read_line(&mut self) -> IngestionResult<bool> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.line += 1;
        self.offset += n;
        Ok(true)
    }

    fn emit(&mut self, fields: Vec<String>, line: usize) -> RawRecord {
        if let Some(r) = self.remaining.as_mut() {
            *r -= 1;
        }
        RawRecord::new(fields, line)
    }

    /// Read the next record, or `None` at end of input or once the limit is reached.
    pub fn next_record(&mut self) -> IngestionResult<Option<RawRecord>> {
        if self.finished || self.remaining == Some(0) {
            self.finished = true;
            return Ok(None);
        }

        loop {
            if !self.read_line()? {
                self.finished = true;
                return Ok(None);
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }

            let start_line = self.line;
            let (content, _) = split_terminator(&self.buf);
            if content.is_empty() {
                if self.dialect.ignore_empty_lines() {
                    continue;
                }
                return Ok(Some(self.emit(vec![String::new()], start_line)));
            }
            if let Some(comment) = self.dialect.comment() {
                if content.starts_with(comment) {
                    continue;
                }
            }

            if !self.dialect.has_boundaries_resolved() {
                self.dialect = self.dialect.resolve_boundaries(content)?;
            }
            let fixed = self
                .dialect
                .boundaries()
                .map(|b| slice_fixed_width(content, b, &self.dialect));
            let fields = match fixed {
                Some(fields) => fields,
                None => self.tokenize_delimited(start_line)?,
            };
            return Ok(Some(self.emit(fields, start_line)));
        }
    }

    fn tokenize_delimited(&mut self, start_line: usize) -> IngestionResult<Vec<String>> {
        loop {
            let (content, terminator) = split_terminator(&self.buf);
            self.machine.feed_line(content);
            if self.machine.end_of_line(terminator) {
                return Ok(self.machine.take_record());
            }
            if !self.read_line()? {
                let fields = self.machine.close_at_eof();
                if self.dialect.allow_unterminated_quote() {
                    return Ok(fields);
                }
                let raw = RawRecord::new(fields, start_line).display_raw(&self.dialect);
                return Err(IngestionError::MalformedRecord {
                    line: start_line,
                    raw,
                    message: "unterminated quoted field at end of input".to_string(),
                });
            }
        }
    }
}

impl<R: BufRead> Iterator for Tokenizer<R> {
    type Item = IngestionResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// A record start chosen as a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SplitPoint {
    /// Byte offset into the scanned text.
    pub offset: usize,
    /// Absolute 1-based line number of the line starting at `offset`.
    pub line: usize,
}

/// Choose up to `parts - 1` record starts that divide `text` into roughly equal pieces.
///
/// Quote state is tracked from the start of `text`, so a split never lands inside a quoted
/// field. Splits always fall right after a `\n`, never between `\r` and `\n`.
pub(crate) fn find_split_points(
    text: &str,
    dialect: &Dialect,
    first_line: usize,
    parts: usize,
) -> Vec<SplitPoint> {
    let mut points: Vec<SplitPoint> = Vec::new();
    if parts < 2 || text.is_empty() {
        return points;
    }

    let mut targets = (1..parts).map(|k| k * text.len() / parts).peekable();
    let mut machine = RecordMachine::new(dialect, false);
    let fixed = dialect.is_fixed_width();
    let mut in_record = false;
    let mut offset = 0usize;
    let mut line = first_line;

    for raw_line in text.split_inclusive('\n') {
        if !in_record {
            let mut reached = false;
            while let Some(&t) = targets.peek() {
                if t > offset {
                    break;
                }
                targets.next();
                reached = true;
            }
            if reached && offset > 0 && points.last().is_none_or(|p| p.offset < offset) {
                points.push(SplitPoint { offset, line });
            }
            if targets.peek().is_none() {
                break;
            }
        }

        let (content, terminator) = split_terminator(raw_line);
        let single_line = !in_record
            && (fixed
                || content.is_empty()
                || dialect.comment().is_some_and(|c| content.starts_with(c)));
        if !single_line {
            machine.feed_line(content);
            in_record = !machine.end_of_line(terminator);
        }

        offset += raw_line.len();
        line += 1;
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str, dialect: &Dialect) -> Vec<Vec<String>> {
        Tokenizer::new(input.as_bytes(), dialect)
            .map(|r| r.unwrap().fields)
            .collect()
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn splits_simple_records() {
        let out = tokenize("a,b,c\n1,2,3\n", &Dialect::csv());
        assert_eq!(out, rows(&[&["a", "b", "c"], &["1", "2", "3"]]));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(tokenize("", &Dialect::csv()).is_empty());
    }

    #[test]
    fn last_line_without_terminator_is_a_record() {
        let out = tokenize("a,b\r\n1,2", &Dialect::csv());
        assert_eq!(out, rows(&[&["a", "b"], &["1", "2"]]));
    }

    #[test]
    fn quoted_fields_keep_delimiters_newlines_and_quotes() {
        let input = "\"x,y\",\"line1\nline2\",\"say \"\"hi\"\"\"\n";
        let out = tokenize(input, &Dialect::csv());
        assert_eq!(out, rows(&[&["x,y", "line1\nline2", "say \"hi\""]]));
    }

    #[test]
    fn crlf_inside_quotes_is_preserved() {
        let out = tokenize("\"a\r\nb\",c\r\n", &Dialect::csv());
        assert_eq!(out, rows(&[&["a\r\nb", "c"]]));
    }

    #[test]
    fn quote_in_the_middle_of_a_field_is_literal() {
        let out = tokenize("ab\"c,d\n", &Dialect::csv());
        assert_eq!(out, rows(&[&["ab\"c", "d"]]));
    }

    #[test]
    fn all_empty_fields_still_form_a_record() {
        let out = tokenize(",,\n", &Dialect::csv());
        assert_eq!(out, rows(&[&["", "", ""]]));
    }

    #[test]
    fn surrounding_spaces_are_trimmed_outside_quotes() {
        let out = tokenize(" a , \" b \" ,c\n", &Dialect::csv());
        assert_eq!(out, rows(&[&["a", " b ", "c"]]));

        let keep = Dialect::csv().with_ignore_surrounding_spaces(false);
        let out = tokenize(" a ,b\n", &keep);
        assert_eq!(out, rows(&[&[" a ", "b"]]));
    }

    #[test]
    fn inside_quote_trimming_is_separate() {
        let d = Dialect::csv().with_trim_inside_quoted(true);
        let out = tokenize("\" b \",c\n", &d);
        assert_eq!(out, rows(&[&["b", "c"]]));
    }

    #[test]
    fn tab_delimiter_is_not_trimmed() {
        let out = tokenize("a\t\tb\n", &Dialect::tsv());
        assert_eq!(out, rows(&[&["a", "", "b"]]));
    }

    #[test]
    fn comments_and_blank_lines() {
        let d = Dialect::csv().with_comment(Some('#')).unwrap();
        let records: Vec<RawRecord> = Tokenizer::new("# note\na,b\n\n1,2\n".as_bytes(), &d)
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].fields, vec![String::new()]);
        assert_eq!(records[2].line, 4);

        let d = d.with_ignore_empty_lines(true);
        let out = tokenize("# note\na,b\n\n1,2\n", &d);
        assert_eq!(out, rows(&[&["a", "b"], &["1", "2"]]));
    }

    #[test]
    fn record_line_numbers_point_at_record_start() {
        let input = "h\n\"multi\nline\"\nnext\n";
        let lines: Vec<usize> = Tokenizer::new(input.as_bytes(), &Dialect::csv())
            .map(|r| r.unwrap().line)
            .collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn unterminated_quote_fails_by_default() {
        let mut tok = Tokenizer::new("a\n\"open,x\n".as_bytes(), &Dialect::csv());
        assert!(tok.next().unwrap().is_ok());
        let err = tok.next().unwrap().unwrap_err();
        match err {
            IngestionError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tok.next().is_none());
    }

    #[test]
    fn unterminated_quote_can_close_implicitly() {
        let d = Dialect::csv().with_allow_unterminated_quote(true);
        let out = tokenize("\"open,x\n", &d);
        assert_eq!(out, rows(&[&["open,x\n"]]));
    }

    #[test]
    fn skip_and_limit() {
        let tok = Tokenizer::new("junk\njunk\na\nb\nc\n".as_bytes(), &Dialect::csv())
            .with_skip_lines(2)
            .with_limit(Some(2));
        let records: Vec<RawRecord> = tok.map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields, vec!["a".to_string()]);
        assert_eq!(records[0].line, 3);
    }

    #[test]
    fn fixed_width_slices_lines() {
        let d = Dialect::fixed_widths(&[3, 4, 2]).unwrap();
        let out = tokenize("ab 1234xy\nc  5\n", &d);
        assert_eq!(out, rows(&[&["ab", "1234", "xy"], &["c", "5"]]));
    }

    #[test]
    fn fixed_width_ignores_quotes() {
        let d = Dialect::fixed_widths(&[2, 2]).unwrap();
        let out = tokenize("\"a,b\n", &d);
        assert_eq!(out, rows(&[&["\"a", ",b"]]));
    }

    #[test]
    fn fixed_width_boundaries_from_first_record_line() {
        let d = Dialect::fixed_width_from_header()
            .with_comment(Some('#'))
            .unwrap();
        let mut tok = Tokenizer::new("# widths follow\nid  name   n\n7   Ada    1\n12  Grace  \n".as_bytes(), &d);
        let records: Vec<Vec<String>> = tok.by_ref().map(|r| r.unwrap().fields).collect();
        assert_eq!(
            records,
            rows(&[&["id", "name", "n"], &["7", "Ada", "1"], &["12", "Grace"]])
        );
        assert_eq!(tok.dialect().boundaries(), Some(&[0, 4, 11][..]));
    }

    #[test]
    fn split_points_never_land_inside_quotes() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!("{i},\"multi\nline {i}\"\n"));
        }
        let points = find_split_points(&text, &Dialect::csv(), 1, 8);
        assert!(!points.is_empty());
        for p in &points {
            let rest = &text[p.offset..];
            let head = rest.split(',').next().unwrap();
            assert!(head.parse::<usize>().is_ok(), "split at {} starts with {head:?}", p.offset);
            assert_eq!(p.line % 2, 1);
        }
        assert!(points.windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[test]
    fn split_points_empty_when_one_part() {
        assert!(find_split_points("a\nb\n", &Dialect::csv(), 1, 1).is_empty());
    }
}

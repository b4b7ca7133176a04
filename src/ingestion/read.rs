//! Read entry points and options.
//!
//! Most callers should use [`read_csv_path`] or [`read_delim_path`], which read a delimited file
//! into an in-memory [`crate::types::Table`] with inferred column types.
//!
//! - If [`ReadOptions::parse_parallel`] is set (the default), the input is split at record
//!   boundaries and parsed on a rayon pool. The result does not depend on the chunking.
//! - If an [`IngestionObserver`] is provided, success/failure/alerts are reported to it.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{ColumnType, Table};

use super::assemble::{self, Assembled};
use super::dialect::Dialect;
use super::header::HeaderMode;
use super::infer::InferenceOptions;
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::parser_options::ParserOptions;

/// What to do with a record the tokenizer or the column policy rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MalformedRowPolicy {
    /// Abort the read with [`IngestionError::MalformedRecord`].
    #[default]
    Fail,
    /// Drop the record, log a warning and keep going.
    Skip,
}

/// Chunking parameters for parallel reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    /// Worker threads for a dedicated pool. `None` runs on the global rayon pool.
    pub num_threads: Option<usize>,
    /// Chunks are never smaller than this many bytes, so small inputs stay single-chunk.
    pub min_chunk_bytes: usize,
    /// Number of chunks to aim for. `None` uses one per worker thread.
    pub target_chunks: Option<usize>,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_chunk_bytes: 1 << 20,
            target_chunks: None,
        }
    }
}

impl ParallelOptions {
    pub fn validate(&self) -> IngestionResult<()> {
        if self.num_threads == Some(0) {
            return Err(IngestionError::configuration("num_threads must be > 0 when set"));
        }
        if self.target_chunks == Some(0) {
            return Err(IngestionError::configuration("target_chunks must be > 0 when set"));
        }
        if self.min_chunk_bytes == 0 {
            return Err(IngestionError::configuration("min_chunk_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a caller and a running read.
///
/// Workers poll the flag between chunks and periodically within a chunk; a cancelled read returns
/// [`IngestionError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`CancellationToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options controlling a delimited read.
///
/// Use [`Default`] (comma-separated, header in the first record, inferred types) for common
/// cases. All fields except the observer and the cancellation token can be loaded from any serde
/// format.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Lexical rules for splitting records.
    pub dialect: Dialect,
    /// Where column names come from.
    pub header: HeaderMode,
    /// Explicit types by column name. Bypasses inference for those columns.
    pub column_types: HashMap<String, ColumnType>,
    /// Type applied to every column without an entry in `column_types`.
    pub default_column_type: Option<ColumnType>,
    /// Null literals, locale and date/time patterns for every column.
    pub parser_options: ParserOptions,
    /// Per-column parser options replacing `parser_options` for that column.
    pub column_parser_options: HashMap<String, ParserOptions>,
    pub inference: InferenceOptions,
    /// Physical lines discarded before the header.
    pub skip_lines: usize,
    /// Maximum number of rows in the table. Records dropped by [`MalformedRowPolicy::Skip`] do
    /// not count, and input after the last kept row is left unread.
    pub read_lines: Option<usize>,
    /// Pad short records with missing values instead of failing.
    pub allow_missing_columns: bool,
    /// Drop extra trailing fields instead of failing.
    pub ignore_excess_columns: bool,
    /// Fail the read or skip the record on a malformed row.
    pub on_malformed: MalformedRowPolicy,
    /// Split in-memory input into chunks parsed on rayon.
    pub parse_parallel: bool,
    pub parallel: ParallelOptions,
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
    /// Optional observer for logging/alerts.
    #[serde(skip)]
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    #[serde(skip, default = "default_alert_threshold")]
    pub alert_at_or_above: IngestionSeverity,
}

fn default_alert_threshold() -> IngestionSeverity {
    IngestionSeverity::Critical
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("dialect", &self.dialect)
            .field("header", &self.header)
            .field("column_types", &self.column_types)
            .field("default_column_type", &self.default_column_type)
            .field("parser_options", &self.parser_options)
            .field("column_parser_options", &self.column_parser_options)
            .field("inference", &self.inference)
            .field("skip_lines", &self.skip_lines)
            .field("read_lines", &self.read_lines)
            .field("allow_missing_columns", &self.allow_missing_columns)
            .field("ignore_excess_columns", &self.ignore_excess_columns)
            .field("on_malformed", &self.on_malformed)
            .field("parse_parallel", &self.parse_parallel)
            .field("parallel", &self.parallel)
            .field("cancellation_set", &self.cancellation.is_some())
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::csv(),
            header: HeaderMode::FirstRecord,
            column_types: HashMap::new(),
            default_column_type: None,
            parser_options: ParserOptions::default(),
            column_parser_options: HashMap::new(),
            inference: InferenceOptions::default(),
            skip_lines: 0,
            read_lines: None,
            allow_missing_columns: true,
            ignore_excess_columns: true,
            on_malformed: MalformedRowPolicy::Fail,
            parse_parallel: true,
            parallel: ParallelOptions::default(),
            cancellation: None,
            observer: None,
            alert_at_or_above: default_alert_threshold(),
        }
    }
}

impl ReadOptions {
    /// Comma-separated defaults.
    pub fn csv() -> Self {
        Self::default()
    }

    /// Tab-separated defaults.
    pub fn tsv() -> Self {
        Self {
            dialect: Dialect::tsv(),
            ..Self::default()
        }
    }

    /// Check every option for consistency. Called by all read entry points before any input is
    /// consumed.
    pub fn validate(&self) -> IngestionResult<()> {
        self.dialect.validate()?;
        self.parser_options.validate()?;
        for (column, parser) in &self.column_parser_options {
            parser.validate().map_err(|e| {
                IngestionError::configuration(format!("parser options for column '{column}': {e}"))
            })?;
        }
        self.inference.validate()?;
        self.parallel.validate()?;
        if matches!(&self.header, HeaderMode::Explicit(names) if names.is_empty()) {
            return Err(IngestionError::configuration(
                "explicit header must name at least one column",
            ));
        }
        if self.default_column_type == Some(ColumnType::Nothing)
            || self.column_types.values().any(|t| *t == ColumnType::Nothing)
        {
            return Err(IngestionError::configuration(
                "Nothing cannot be requested as a column type",
            ));
        }
        Ok(())
    }

    fn runs_parallel(&self) -> bool {
        self.parse_parallel && self.read_lines.is_none()
    }
}

/// Read a delimited file from `path`.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with row/column/chunk stats
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// # Examples
///
/// ```no_run
/// use delimited_ingestion::ingestion::{read_delim_path, Dialect, ReadOptions};
///
/// # fn main() -> Result<(), delimited_ingestion::IngestionError> {
/// let opts = ReadOptions {
///     dialect: Dialect::delimited(';')?,
///     ..Default::default()
/// };
/// let table = read_delim_path("export.csv", &opts)?;
/// println!("rows={} columns={:?}", table.row_count(), table.column_names());
/// # Ok(())
/// # }
/// ```
///
/// ## Observability (stderr logging + alert threshold)
///
/// ```no_run
/// use std::sync::Arc;
///
/// use delimited_ingestion::ingestion::{
///     read_delim_path, IngestionSeverity, ReadOptions, StdErrObserver,
/// };
///
/// let opts = ReadOptions {
///     observer: Some(Arc::new(StdErrObserver::default())),
///     alert_at_or_above: IngestionSeverity::Critical,
///     ..Default::default()
/// };
///
/// // Missing files are treated as Critical and will trigger `on_alert` at this threshold.
/// let _err = read_delim_path("does_not_exist.csv", &opts).unwrap_err();
/// ```
pub fn read_delim_path(path: impl AsRef<Path>, options: &ReadOptions) -> IngestionResult<Table> {
    let path = path.as_ref();
    let ctx = IngestionContext::for_path(path, options.runs_parallel());
    let result = options.validate().and_then(|()| {
        let file = File::open(path)?;
        read_buffered(BufReader::new(file), options)
    });
    report(options, &ctx, result)
}

/// Read delimited text from any reader.
pub fn read_delim_reader<R: Read>(reader: R, options: &ReadOptions) -> IngestionResult<Table> {
    let ctx = IngestionContext::new("<reader>", options.runs_parallel());
    let result = options
        .validate()
        .and_then(|()| read_buffered(BufReader::new(reader), options));
    report(options, &ctx, result)
}

/// Read delimited text held in memory.
pub fn read_delim_str(text: &str, options: &ReadOptions) -> IngestionResult<Table> {
    let ctx = IngestionContext::new("<str>", options.runs_parallel());
    let result = options.validate().and_then(|()| {
        if options.runs_parallel() {
            assemble::read_parallel(text, options)
        } else {
            assemble::read_sequential(text.as_bytes(), options)
        }
    });
    report(options, &ctx, result)
}

/// Read a comma-separated file. `options.dialect` is replaced by [`Dialect::csv`].
pub fn read_csv_path(path: impl AsRef<Path>, options: &ReadOptions) -> IngestionResult<Table> {
    read_delim_path(path, &with_dialect(options, Dialect::csv()))
}

/// Read comma-separated text. `options.dialect` is replaced by [`Dialect::csv`].
pub fn read_csv_str(text: &str, options: &ReadOptions) -> IngestionResult<Table> {
    read_delim_str(text, &with_dialect(options, Dialect::csv()))
}

/// Read a tab-separated file. `options.dialect` is replaced by [`Dialect::tsv`].
pub fn read_tsv_path(path: impl AsRef<Path>, options: &ReadOptions) -> IngestionResult<Table> {
    read_delim_path(path, &with_dialect(options, Dialect::tsv()))
}

/// Read tab-separated text. `options.dialect` is replaced by [`Dialect::tsv`].
pub fn read_tsv_str(text: &str, options: &ReadOptions) -> IngestionResult<Table> {
    read_delim_str(text, &with_dialect(options, Dialect::tsv()))
}

fn with_dialect(options: &ReadOptions, dialect: Dialect) -> ReadOptions {
    ReadOptions {
        dialect,
        ..options.clone()
    }
}

fn read_buffered<R: BufRead>(mut reader: R, options: &ReadOptions) -> IngestionResult<Assembled> {
    if options.runs_parallel() {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        assemble::read_parallel(&text, options)
    } else {
        assemble::read_sequential(reader, options)
    }
}

fn report(
    options: &ReadOptions,
    ctx: &IngestionContext,
    result: IngestionResult<Assembled>,
) -> IngestionResult<Table> {
    if let Some(obs) = &options.observer {
        match &result {
            Ok(out) => obs.on_success(
                ctx,
                IngestionStats {
                    rows: out.table.row_count(),
                    columns: out.table.column_count(),
                    skipped_rows: out.skipped_rows,
                    chunks: out.chunks,
                },
            ),
            Err(e) => {
                let sev = IngestionSeverity::of(e);
                obs.on_failure(ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(ctx, sev, e);
                }
            }
        }
    }
    result.map(|out| out.table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let o = ReadOptions::default();
        assert!(o.allow_missing_columns);
        assert!(o.ignore_excess_columns);
        assert!(o.parse_parallel);
        assert_eq!(o.on_malformed, MalformedRowPolicy::Fail);
        assert_eq!(o.header, HeaderMode::FirstRecord);
        assert_eq!(o.alert_at_or_above, IngestionSeverity::Critical);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn invalid_options_are_rejected_before_reading() {
        let o = ReadOptions {
            header: HeaderMode::Explicit(vec![]),
            ..Default::default()
        };
        assert!(matches!(o.validate(), Err(IngestionError::Configuration { .. })));

        let o = ReadOptions {
            parallel: ParallelOptions {
                num_threads: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(read_delim_str("a\n1\n", &o).is_err());

        let o = ReadOptions {
            default_column_type: Some(ColumnType::Nothing),
            ..Default::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn cancelled_token_aborts_read() {
        let token = CancellationToken::new();
        token.cancel();
        let o = ReadOptions {
            cancellation: Some(token.clone()),
            ..Default::default()
        };
        let err = read_delim_str("a\n1\n", &o).unwrap_err();
        assert!(matches!(err, IngestionError::Cancelled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn tsv_entry_point_overrides_dialect() {
        let t = read_tsv_str("a\tb\n1\tx\n", &ReadOptions::default()).unwrap();
        assert_eq!(t.column_names(), vec!["a", "b"]);
        assert_eq!(t.column("a").unwrap().data_type(), ColumnType::Integer);
    }
}

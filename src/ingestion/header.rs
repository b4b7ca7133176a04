//! Header resolution and row reconciliation.
//!
//! [`resolve_columns`] decides column names (from the first record, caller-supplied names, or
//! generated ones), makes them unique, and attaches per-column overrides. [`reconcile`] then fits
//! every body record to the fixed column count.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IngestionError, IngestionResult};
use crate::types::ColumnType;

use super::dialect::Dialect;
use super::parser_options::ParserOptions;
use super::read::ReadOptions;
use super::tokenizer::RawRecord;

/// Name used for blank header cells before de-duplication.
pub const UNTITLED_COLUMN: &str = "untitled";

/// Where column names come from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeaderMode {
    /// The first record holds the column names.
    #[default]
    FirstRecord,
    /// Caller-supplied names; the first record is data.
    Explicit(Vec<String>),
    /// No header; columns are named `column1`, `column2`, ...
    Generated,
}

/// A resolved column: its unique name and caller overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Unique column name.
    pub name: String,
    /// Forced type; `None` means infer.
    pub type_override: Option<ColumnType>,
    /// Column-specific parser options.
    pub parser: Option<ParserOptions>,
}

/// Result of header resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHeader {
    /// Columns in positional order.
    pub columns: Vec<ColumnSpec>,
    /// Whether the first record was consumed as the header.
    pub header_consumed: bool,
}

impl ResolvedHeader {
    /// Number of columns every body record is reconciled to.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// How records whose field count differs from the header are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCountPolicy {
    /// Pad short records with missing values.
    pub allow_missing_columns: bool,
    /// Drop trailing fields of long records.
    pub ignore_excess_columns: bool,
}

/// Append an increasing numeric suffix to repeated names, keeping first-seen order.
pub fn make_unique(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let unique = if seen.contains(&name) {
            (1..)
                .map(|k| format!("{name}{k}"))
                .find(|candidate| !seen.contains(candidate))
                .unwrap_or_default()
        } else {
            name
        };
        seen.insert(unique.clone());
        out.push(unique);
    }
    out
}

/// Determine the columns of a read from the header mode and the first record.
pub fn resolve_columns(
    mode: &HeaderMode,
    first: Option<&RawRecord>,
    options: &ReadOptions,
) -> IngestionResult<ResolvedHeader> {
    let (names, header_consumed) = match mode {
        HeaderMode::FirstRecord => (
            first.map(|r| r.fields.clone()).unwrap_or_default(),
            first.is_some(),
        ),
        HeaderMode::Explicit(names) => {
            if let Some(record) = first {
                if names.len() < record.len() && !options.allow_missing_columns {
                    return Err(IngestionError::HeaderMismatch {
                        message: format!(
                            "{} column names supplied but line {} has {} fields",
                            names.len(),
                            record.line,
                            record.len()
                        ),
                    });
                }
            }
            (names.clone(), false)
        }
        HeaderMode::Generated => {
            let width = first.map(RawRecord::len).unwrap_or(0);
            ((1..=width).map(|i| format!("column{i}")).collect(), false)
        }
    };

    let names = names
        .into_iter()
        .map(|n| {
            if n.is_empty() {
                UNTITLED_COLUMN.to_string()
            } else {
                n
            }
        })
        .collect();
    let names = make_unique(names);

    for key in options
        .column_types
        .keys()
        .chain(options.column_parser_options.keys())
    {
        if !names.contains(key) {
            warn!(column = %key, "override names a column that is not in the header");
        }
    }

    let columns = names
        .into_iter()
        .map(|name| ColumnSpec {
            type_override: options
                .column_types
                .get(&name)
                .copied()
                .or(options.default_column_type),
            parser: options.column_parser_options.get(&name).cloned(),
            name,
        })
        .collect();

    Ok(ResolvedHeader {
        columns,
        header_consumed,
    })
}

/// Fit a record to `width` columns. Missing trailing fields become `None`.
pub fn reconcile(
    record: RawRecord,
    width: usize,
    policy: FieldCountPolicy,
    dialect: &Dialect,
) -> IngestionResult<Vec<Option<String>>> {
    let len = record.len();
    if len < width && !policy.allow_missing_columns {
        return Err(IngestionError::MalformedRecord {
            line: record.line,
            raw: record.display_raw(dialect),
            message: format!("expected {width} fields, found {len}"),
        });
    }
    if len > width && !policy.ignore_excess_columns {
        return Err(IngestionError::MalformedRecord {
            line: record.line,
            raw: record.display_raw(dialect),
            message: format!("expected {width} fields, found {len}"),
        });
    }

    let mut out: Vec<Option<String>> = record.fields.into_iter().take(width).map(Some).collect();
    out.resize(width, None);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str], line: usize) -> RawRecord {
        RawRecord::new(fields.iter().map(|s| s.to_string()).collect(), line)
    }

    fn names(h: &ResolvedHeader) -> Vec<&str> {
        h.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let out = make_unique(vec!["a".into(), "a".into()]);
        assert_eq!(out, vec!["a", "a1"]);

        let out = make_unique(vec!["a".into(), "a".into(), "a".into(), "b".into()]);
        assert_eq!(out, vec!["a", "a1", "a2", "b"]);

        let out = make_unique(vec!["a1".into(), "a".into(), "a".into()]);
        assert_eq!(out, vec!["a1", "a", "a2"]);
    }

    #[test]
    fn first_record_header_with_blank_names() {
        let opts = ReadOptions::default();
        let first = record(&["id", "", ""], 1);
        let h = resolve_columns(&HeaderMode::FirstRecord, Some(&first), &opts).unwrap();
        assert!(h.header_consumed);
        assert_eq!(names(&h), vec!["id", "untitled", "untitled1"]);
    }

    #[test]
    fn generated_names_follow_first_record_width() {
        let opts = ReadOptions::default();
        let first = record(&["1", "2"], 1);
        let h = resolve_columns(&HeaderMode::Generated, Some(&first), &opts).unwrap();
        assert!(!h.header_consumed);
        assert_eq!(names(&h), vec!["column1", "column2"]);
    }

    #[test]
    fn explicit_names_shorter_than_record() {
        let first = record(&["1", "2", "3"], 1);
        let mode = HeaderMode::Explicit(vec!["a".into(), "b".into()]);

        let strict = ReadOptions {
            allow_missing_columns: false,
            ..Default::default()
        };
        let err = resolve_columns(&mode, Some(&first), &strict).unwrap_err();
        assert!(matches!(err, IngestionError::HeaderMismatch { .. }));

        let lenient = ReadOptions::default();
        let h = resolve_columns(&mode, Some(&first), &lenient).unwrap();
        assert_eq!(h.width(), 2);
    }

    #[test]
    fn overrides_are_attached_by_name() {
        let mut opts = ReadOptions::default();
        opts.column_types.insert("b".into(), ColumnType::String);
        opts.default_column_type = Some(ColumnType::Long);
        let first = record(&["a", "b"], 1);
        let h = resolve_columns(&HeaderMode::FirstRecord, Some(&first), &opts).unwrap();
        assert_eq!(h.columns[0].type_override, Some(ColumnType::Long));
        assert_eq!(h.columns[1].type_override, Some(ColumnType::String));
    }

    #[test]
    fn reconcile_pads_truncates_or_fails() {
        let dialect = Dialect::csv();
        let lenient = FieldCountPolicy {
            allow_missing_columns: true,
            ignore_excess_columns: true,
        };
        let strict = FieldCountPolicy {
            allow_missing_columns: false,
            ignore_excess_columns: false,
        };

        let out = reconcile(record(&["1", "2"], 5), 3, lenient, &dialect).unwrap();
        assert_eq!(out, vec![Some("1".to_string()), Some("2".to_string()), None]);

        let out = reconcile(record(&["1", "2", "3", "4"], 5), 3, lenient, &dialect).unwrap();
        assert_eq!(out.len(), 3);

        let err = reconcile(record(&["1", "2"], 5), 3, strict, &dialect).unwrap_err();
        match err {
            IngestionError::MalformedRecord { line, raw, .. } => {
                assert_eq!(line, 5);
                assert_eq!(raw, "1,2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(reconcile(record(&["1", "2", "3", "4"], 6), 3, strict, &dialect).is_err());
    }
}

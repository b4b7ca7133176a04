//! Delimited-text ingestion.
//!
//! Most callers should use [`read_csv_path`] / [`read_delim_path`] (from [`read`]) which:
//!
//! - tokenize the input under a configurable [`Dialect`] (delimiter, quote, comment, fixed width)
//! - resolve column names from the first record, caller-supplied names, or generated ones
//! - infer a [`crate::types::ColumnType`] per column, or apply caller overrides
//! - optionally parse in parallel chunks and report success/failure/alerts to an
//!   [`IngestionObserver`]
//!
//! The stages are also usable on their own:
//! - [`tokenizer`]
//! - [`header`]
//! - [`infer`]

mod assemble;
pub mod dialect;
pub mod header;
pub mod infer;
pub mod observability;
pub mod parser_options;
pub mod read;
pub mod tokenizer;

pub use dialect::{Dialect, FieldLayout};
pub use header::{ColumnSpec, HeaderMode};
pub use infer::{InferenceOptions, WideningPolicy};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    StdErrObserver,
};
pub use parser_options::{NumberLocale, ParserOptions};
pub use read::{
    read_csv_path, read_csv_str, read_delim_path, read_delim_reader, read_delim_str, read_tsv_path, read_tsv_str,
    CancellationToken, MalformedRowPolicy, ParallelOptions, ReadOptions,
};
pub use tokenizer::{RawRecord, Tokenizer};

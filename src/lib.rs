//! `delimited-ingestion` reads delimited text (CSV, TSV, any single-character delimiter, or
//! fixed-width columns) into an in-memory columnar [`types::Table`] with inferred column types.
//!
//! The primary entrypoints are [`ingestion::read_csv_path`] and [`ingestion::read_delim_path`],
//! configured through [`ingestion::ReadOptions`].
//!
//! ## What you get
//!
//! **Dialects:** delimiter, quote character, comment lines, blank-line handling, whitespace
//! trimming, and fixed-width layouts (see [`ingestion::Dialect`]).
//!
//! **Column types:** every column is inferred as the narrowest type that accepts all of its
//! non-missing values, trying in order:
//!
//! - [`types::ColumnType::Boolean`] (`true`/`false`, case-insensitive)
//! - [`types::ColumnType::Integer`], [`types::ColumnType::Long`], [`types::ColumnType::BigInteger`]
//! - [`types::ColumnType::Double`] (and [`types::ColumnType::BigDecimal`] when exact decimals are
//!   requested)
//! - [`types::ColumnType::LocalDate`], [`types::ColumnType::LocalDateTime`],
//!   [`types::ColumnType::LocalTime`]
//! - [`types::ColumnType::String`] otherwise
//!
//! Configured null literals (by default `""`, `NA`, `N/A`, `null`, `NULL`, `None`, `none`) map to
//! [`types::Value::Null`]. A column with no values at all is [`types::ColumnType::Nothing`].
//!
//! ## Quick example
//!
//! ```rust
//! use delimited_ingestion::ingestion::{read_csv_str, ReadOptions};
//! use delimited_ingestion::types::{ColumnType, Value};
//!
//! # fn main() -> Result<(), delimited_ingestion::IngestionError> {
//! let table = read_csv_str("id,score,name\n1,2.5,Ann\n2,NA,\"Lee, B\"\n", &ReadOptions::default())?;
//!
//! assert_eq!(table.row_count(), 2);
//! assert_eq!(table.column("id").unwrap().data_type(), ColumnType::Integer);
//! assert_eq!(table.column("score").unwrap().data_type(), ColumnType::Double);
//! assert_eq!(table.column("score").unwrap().get(1), Some(&Value::Null));
//! assert_eq!(
//!     table.column("name").unwrap().get(1),
//!     Some(&Value::String("Lee, B".to_string()))
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Explicit types and headers
//!
//! ```rust
//! use delimited_ingestion::ingestion::{read_csv_str, HeaderMode, ReadOptions};
//! use delimited_ingestion::types::ColumnType;
//!
//! # fn main() -> Result<(), delimited_ingestion::IngestionError> {
//! let mut opts = ReadOptions {
//!     header: HeaderMode::Explicit(vec!["zip".into(), "city".into()]),
//!     ..Default::default()
//! };
//! opts.column_types.insert("zip".into(), ColumnType::String);
//!
//! let table = read_csv_str("01234,Boston\n", &opts)?;
//! assert_eq!(table.column("zip").unwrap().data_type(), ColumnType::String);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: read entrypoints, dialects, tokenizer, header resolution and type inference
//! - [`types`]: column types, values and the in-memory table
//! - [`error`]: error types used across ingestion

pub mod error;
pub mod ingestion;
pub mod types;

pub use error::{IngestionError, IngestionResult};

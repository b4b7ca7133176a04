use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion functions.
///
/// This is a single error enum shared by the dialect, tokenizer, header, inference and assembly
/// stages. Every record-level variant carries the 1-based source line it was raised for.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied, invalid UTF-8 in the stream).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The dialect or read options are inconsistent. Raised before any input is consumed.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Header names do not fit the data under a strict column policy.
    #[error("header mismatch: {message}")]
    HeaderMismatch { message: String },

    /// A record could not be tokenized or has a field count the column policy rejects.
    #[error("malformed record at line {line}: {message} (raw='{raw}')")]
    MalformedRecord {
        line: usize,
        raw: String,
        message: String,
    },

    /// A value could not be represented by an explicitly requested column type.
    #[error("cannot coerce value at line {line} column '{column}' to {target} (raw='{raw}')")]
    TypeCoercion {
        line: usize,
        column: String,
        raw: String,
        target: String,
    },

    /// The read was cancelled through its [`crate::ingestion::CancellationToken`].
    #[error("read cancelled")]
    Cancelled,
}

impl IngestionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The source line this error refers to, if it is a record-level error.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedRecord { line, .. } | Self::TypeCoercion { line, .. } => Some(*line),
            _ => None,
        }
    }
}

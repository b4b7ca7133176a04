use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IngestionError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, or caller-initiated like cancellation).
    Warning,
    /// Error-level event (malformed input, configuration or coercion failures).
    Error,
    /// Critical error (I/O failures).
    Critical,
}

impl IngestionSeverity {
    /// Classify an error for observer reporting.
    pub fn of(error: &IngestionError) -> Self {
        match error {
            IngestionError::Io(_) => Self::Critical,
            IngestionError::Cancelled => Self::Warning,
            IngestionError::Configuration { .. }
            | IngestionError::HeaderMismatch { .. }
            | IngestionError::MalformedRecord { .. }
            | IngestionError::TypeCoercion { .. } => Self::Error,
        }
    }
}

/// Context about a read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    /// Human-readable description of the source (a path, or `<reader>`/`<str>`).
    pub source: String,
    /// Whether chunked parallel parsing was requested.
    pub parallel: bool,
}

impl IngestionContext {
    /// Context for an arbitrary source label.
    pub fn new(source: impl Into<String>, parallel: bool) -> Self {
        Self {
            source: source.into(),
            parallel,
        }
    }

    /// Context labelled with a file path.
    pub fn for_path(path: &Path, parallel: bool) -> Self {
        Self::new(path.display().to_string(), parallel)
    }
}

/// Stats reported on a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of rows in the resulting table.
    pub rows: usize,
    /// Number of columns in the resulting table.
    pub columns: usize,
    /// Rows dropped under [`crate::ingestion::MalformedRowPolicy::Skip`].
    pub skipped_rows: usize,
    /// Number of chunks the input was parsed in.
    pub chunks: usize,
}

/// Observer interface for read outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a read succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when a read fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a read failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs read outcomes to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl IngestionObserver for StdErrObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        eprintln!(
            "[read][ok] source={} rows={} columns={} skipped={} chunks={}",
            ctx.source, stats.rows, stats.columns, stats.skipped_rows, stats.chunks
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        eprintln!("[read][{severity:?}] source={} err={error}", ctx.source);
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        eprintln!("[ALERT][read][{severity:?}] source={} err={error}", ctx.source);
    }
}

/// Appends read outcomes to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok source={} rows={} columns={} skipped={}",
            unix_ts(),
            ctx.source,
            stats.rows,
            stats.columns,
            stats.skipped_rows
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} source={} err={error}",
            unix_ts(),
            ctx.source
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} source={} err={error}",
            unix_ts(),
            ctx.source
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{LotError, LotResult};

use super::unified::SourceFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    Info,
    Warning,
    /// The source is malformed or does not match its schema.
    Error,
    /// I/O and other infrastructure failures.
    Critical,
}

impl LoadSeverity {
    fn as_str(self) -> &'static str {
        match self {
            LoadSeverity::Info => "info",
            LoadSeverity::Warning => "warning",
            LoadSeverity::Error => "error",
            LoadSeverity::Critical => "critical",
        }
    }
}

/// The source a load event is about.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Configured name of the source (e.g. `parcels`, `addresses`).
    pub source_name: String,
    pub path: PathBuf,
    pub format: SourceFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: usize,
}

/// Observer interface for source load outcomes.
pub trait LoadObserver: Send + Sync {
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    fn on_failure(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &LotError) {}

    /// Called after [`Self::on_failure`] when the severity meets the alert threshold.
    fn on_alert(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &LotError) {}
}

/// Fans every event out to each member observer in order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }

    pub fn with(mut self, observer: impl LoadObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.observers.iter().for_each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        self.observers.iter().for_each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        self.observers.iter().for_each(|o| o.on_alert(ctx, severity, error));
    }
}

/// Emits load events as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        tracing::info!(
            source = %ctx.source_name,
            format = ?ctx.format,
            path = %ctx.path.display(),
            rows = stats.rows,
            "source loaded"
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        tracing::error!(
            source = %ctx.source_name,
            severity = severity.as_str(),
            path = %ctx.path.display(),
            %error,
            "source failed to load"
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        tracing::error!(
            alert = true,
            source = %ctx.source_name,
            severity = severity.as_str(),
            %error,
            "source load alert"
        );
    }
}

/// Header of the CSV written by [`LoadLog`].
pub const LOAD_LOG_HEADER: [&str; 8] =
    ["unix_ts", "event", "severity", "source", "format", "path", "rows", "error"];

/// Appends one CSV record per load event, so successive builds leave an audit trail of which
/// extracts were read and how many rows each held.
#[derive(Debug)]
pub struct LoadLog {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl LoadLog {
    /// Open `path` for appending, writing the header if the file is new or empty.
    pub fn open(path: impl AsRef<Path>) -> LotResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(LOAD_LOG_HEADER)?;
            writer.flush()?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(
        &self,
        event: &str,
        severity: Option<LoadSeverity>,
        ctx: &LoadContext,
        rows: Option<usize>,
        error: Option<&LotError>,
    ) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        let record = [
            unix_ts().to_string(),
            event.to_string(),
            severity.map(|s| s.as_str().to_string()).unwrap_or_default(),
            ctx.source_name.clone(),
            format!("{:?}", ctx.format).to_lowercase(),
            ctx.path.display().to_string(),
            rows.map(|r| r.to_string()).unwrap_or_default(),
            error.map(ToString::to_string).unwrap_or_default(),
        ];
        // Logging never fails a build.
        let written = writer
            .write_record(&record)
            .and_then(|()| writer.flush().map_err(csv::Error::from));
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), error = %e, "could not append to load log");
        }
    }
}

impl LoadObserver for LoadLog {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.record("loaded", None, ctx, Some(stats.rows), None);
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        self.record("failed", Some(severity), ctx, None, Some(error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &LotError) {
        self.record("alert", Some(severity), ctx, None, Some(error));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

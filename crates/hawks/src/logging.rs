//! Structured logging for the courier process.
//!
//! Every event is written as one JSON object per line to
//! `~/.unbound/logs/hawks.jsonl` so it can be tailed alongside the daemon's
//! logs, and optionally mirrored to stderr in compact form. `RUST_LOG`
//! overrides the default level.

use crate::error::HawksResult;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const SERVICE_NAME: &str = "hawks";

/// Logging setup for the binary.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    /// Level used when `RUST_LOG` is unset.
    pub default_level: String,
    /// JSONL destination; `None` disables the file layer.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl LogConfig {
    pub fn new(debug: bool, log_path: Option<PathBuf>) -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            default_level: if debug { "debug" } else { "info" }.to_string(),
            log_path,
            also_stderr: true,
        }
    }
}

/// One JSONL record.
#[derive(Debug, Clone, Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    level: &'static str,
    service: &'a str,
    pid: u32,
    target: &'a str,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<&'static str, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span: Option<&'static str>,
}

#[derive(Default)]
struct FieldVisitor {
    fields: BTreeMap<&'static str, serde_json::Value>,
    message: Option<String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.insert(field, serde_json::Value::String(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }
}

/// Layer rendering events as JSONL.
pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            level: level_name(*metadata.level()),
            service: &self.service_name,
            pid: self.pid,
            target: metadata.target(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            span: ctx.event_span(event).map(|span| span.name()),
        };

        if let Ok(json) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{json}");
        }
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}

/// Append-only log file shared by every writer handle.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        // Whole lines reach the file immediately so tailing tools see them.
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for CentralLogWriter {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Fails if the log file cannot be opened; a second call in the same process
/// is ignored.
pub fn init(config: &LogConfig) -> HawksResult<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let writer = CentralLogWriter::new(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let _ = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init();

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "Logging initialized");
    }

    Ok(())
}

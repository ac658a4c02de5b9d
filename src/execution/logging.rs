//! Structured log correlation.
//!
//! When execution-id logging is enabled, every line written through a
//! [`LogCorrelator`] while a request context is active becomes a JSON object
//! carrying the execution id label and span id. The tracing subscriber
//! installed by [`init_tracing`] writes through correlators, INFO and below
//! to stdout and WARN and above to stderr.

use crate::execution::context::{self, ExecutionContext};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Structured-logging field holding the labels object.
pub const LOGGING_LABELS_FIELD: &str = "logging.googleapis.com/labels";
/// Structured-logging field holding the span id.
pub const LOGGING_SPAN_ID_FIELD: &str = "logging.googleapis.com/spanId";

static LOG_EXECUTION_ID: AtomicBool = AtomicBool::new(false);

/// Turn execution-id log correlation on or off for the process.
pub fn set_enabled(enabled: bool) {
    LOG_EXECUTION_ID.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    LOG_EXECUTION_ID.load(Ordering::Relaxed)
}

/// Writer that wraps lines with the current request's correlation fields.
pub struct LogCorrelator<W: Write> {
    inner: W,
    enabled: bool,
}

impl<W: Write> LogCorrelator<W> {
    /// Wrap `inner`, following the process-wide toggle.
    pub fn new(inner: W) -> Self {
        Self::with_enabled(inner, is_enabled())
    }

    pub fn with_enabled(inner: W, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LogCorrelator<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.enabled {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }
        if buf == b"\n" {
            return Ok(buf.len());
        }
        let text = String::from_utf8_lossy(buf);
        let line = correlate(&text, context::current().as_ref());
        self.inner.write_all(line.as_bytes())?;
        self.inner.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Render one write for the given context.
///
/// Without a context the text passes through, newline-terminated. With one,
/// a JSON object payload is extended in place and anything else is wrapped
/// as `{"message": text}`.
pub fn correlate(text: &str, context: Option<&ExecutionContext>) -> String {
    let Some(context) = context else {
        return if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{}\n", text)
        };
    };

    let message = text.strip_suffix('\n').unwrap_or(text);
    let mut payload = match serde_json::from_str::<Value>(message) {
        Ok(Value::Object(object)) => object,
        _ => {
            let mut object = Map::new();
            object.insert("message".into(), Value::String(message.to_string()));
            object
        }
    };

    let labels = payload
        .entry(LOGGING_LABELS_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Value::Object(labels) = labels {
        labels.insert(
            "execution_id".into(),
            Value::String(context.execution_id().to_string()),
        );
    }
    if let Some(span_id) = context.span_id() {
        payload.insert(LOGGING_SPAN_ID_FIELD.into(), Value::String(span_id.to_string()));
    }

    format!("{}\n", Value::Object(payload))
}

/// Correlated handle on the process stdout.
pub fn stdout() -> LogCorrelator<io::Stdout> {
    LogCorrelator::new(io::stdout())
}

/// Correlated handle on the process stderr.
pub fn stderr() -> LogCorrelator<io::Stderr> {
    LogCorrelator::new(io::stderr())
}

/// Either standard stream.
pub enum StdStream {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

impl Write for StdStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StdStream::Stdout(out) => out.write(buf),
            StdStream::Stderr(err) => err.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StdStream::Stdout(out) => out.flush(),
            StdStream::Stderr(err) => err.flush(),
        }
    }
}

/// `MakeWriter` for the standard streams, INFO and below to stdout and WARN
/// and above to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdStreams;

impl<'a> MakeWriter<'a> for StdStreams {
    type Writer = StdStream;

    fn make_writer(&'a self) -> Self::Writer {
        StdStream::Stdout(io::stdout())
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        if routes_to_stderr(meta.level()) {
            StdStream::Stderr(io::stderr())
        } else {
            self.make_writer()
        }
    }
}

/// `MakeWriter` wrapping every writer of `M` in a correlator that follows the
/// process-wide toggle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelatedWriter<M = StdStreams> {
    inner: M,
}

impl<M> CorrelatedWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for CorrelatedWriter<M> {
    type Writer = LogCorrelator<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        LogCorrelator::new(self.inner.make_writer())
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        LogCorrelator::new(self.inner.make_writer_for(meta))
    }
}

fn routes_to_stderr(level: &Level) -> bool {
    *level <= Level::WARN
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info` (or `debug` in
/// debug mode). Calling this twice keeps the first subscriber.
pub fn init_tracing(debug: bool, log_execution_id: bool) {
    set_enabled(log_execution_id);
    let default_level = if debug { "debug" } else { "info" };
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(!log_execution_id)
        .with_writer(CorrelatedWriter::new(StdStreams))
        .try_init();
    if let Err(err) = result {
        tracing::debug!("tracing subscriber already installed: {}", err);
    }
}

//! Structured event hook.
//!
//! The engine reports what it did through a [`LogSink`]. Nothing is emitted
//! unless a sink is installed; [`TracingSink`] bridges events into `tracing`.

use std::fmt;
use std::sync::Arc;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Debug => f.write_str("DEBUG"),
            Level::Info => f.write_str("INFO"),
            Level::Error => f.write_str("ERROR"),
        }
    }
}

/// One key/value pair attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl fmt::Display) -> Self {
        Self { key, value: value.to_string() }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Receiver for leveled, structured events.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &[Field]);

    fn debug(&self, message: &str, fields: &[Field]) {
        self.log(Level::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field]) {
        self.log(Level::Info, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field]) {
        self.log(Level::Error, message, fields);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn log(&self, _level: Level, _message: &str, _fields: &[Field]) {}
}

/// A sink that prepends fixed fields to every event.
#[derive(Clone)]
pub struct ScopedSink {
    inner: Arc<dyn LogSink>,
    fields: Vec<Field>,
}

impl ScopedSink {
    /// Derive a sub-sink with extra fields; the parent is left unchanged.
    pub fn with(&self, fields: impl IntoIterator<Item = Field>) -> ScopedSink {
        let mut all = self.fields.clone();
        all.extend(fields);
        ScopedSink { inner: Arc::clone(&self.inner), fields: all }
    }
}

impl LogSink for ScopedSink {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        if self.fields.is_empty() {
            return self.inner.log(level, message, fields);
        }
        let mut all = self.fields.clone();
        all.extend_from_slice(fields);
        self.inner.log(level, message, &all);
    }
}

/// Wrap `sink` so every event also carries `fields`.
pub fn scoped(sink: Arc<dyn LogSink>, fields: impl IntoIterator<Item = Field>) -> ScopedSink {
    ScopedSink { inner: sink, fields: fields.into_iter().collect() }
}

/// Forwards events to the `tracing` macros.
///
/// Fields are rendered into a single `fields` value since their keys are
/// only known at runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let rendered = fields.iter().map(Field::to_string).collect::<Vec<_>>().join(" ");
        match level {
            Level::Debug => tracing::debug!(fields = %rendered, "{}", message),
            Level::Info => tracing::info!(fields = %rendered, "{}", message),
            Level::Error => tracing::error!(fields = %rendered, "{}", message),
        }
    }
}

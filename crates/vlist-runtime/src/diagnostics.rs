#![forbid(unsafe_code)]

//! Injected diagnostics.
//!
//! The engine never panics on bad input and never returns errors for data
//! problems. It reports them as [`Diagnostic`]s through the sink it was
//! constructed with. [`TracingSink`] is the default; [`MemorySink`] captures
//! diagnostics for tests and for hosts that want to surface them.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::config::ConfigError;

/// Severity of a diagnostic, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "state-persistence",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum LogLevel {
    /// Step-by-step engine decisions.
    Debug,
    /// Notable but expected events.
    Info,
    /// Suspicious input the engine worked around.
    #[default]
    Warn,
    /// Input the engine had to reject.
    Error,
}

impl LogLevel {
    /// Lowercase name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::new(
                "log_level",
                s,
                "expected one of debug, info, warn, error",
            )),
        }
    }
}

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub level: LogLevel,
    /// Engine component that raised it.
    pub target: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.target, self.message)
    }
}

/// Destination for diagnostics.
pub trait DiagnosticSink: Send {
    /// Record one diagnostic.
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let target = diagnostic.target;
        let message = diagnostic.message.as_str();
        match diagnostic.level {
            LogLevel::Debug => tracing::debug!(component = target, "{message}"),
            LogLevel::Info => tracing::info!(component = target, "{message}"),
            LogLevel::Warn => tracing::warn!(component = target, "{message}"),
            LogLevel::Error => tracing::error!(component = target, "{message}"),
        }
    }
}

/// Drops every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: &Diagnostic) {}
}

/// Shared in-memory capture. Clones see the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Captured diagnostics at `level`.
    #[must_use]
    pub fn at_level(&self, level: LogLevel) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.level == level)
            .collect()
    }

    /// Whether any captured message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|d| d.message.contains(needle))
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(diagnostic.clone()),
            Err(poisoned) => poisoned.into_inner().push(diagnostic.clone()),
        }
    }
}

/// A sink paired with a minimum level.
pub struct Logger {
    sink: Box<dyn DiagnosticSink>,
    level: LogLevel,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Box::new(TracingSink), LogLevel::default())
    }
}

impl Logger {
    /// Pair `sink` with `level`.
    #[must_use]
    pub fn new(sink: Box<dyn DiagnosticSink>, level: LogLevel) -> Self {
        Self { sink, level }
    }

    /// Current minimum level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Change the minimum level.
    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// Whether diagnostics at `level` reach the sink.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    /// Emit a diagnostic; `message` is only built when `level` is enabled.
    pub fn log(&self, level: LogLevel, target: &'static str, message: impl FnOnce() -> String) {
        if !self.enabled(level) {
            return;
        }
        self.sink.emit(&Diagnostic {
            level,
            target,
            message: message(),
        });
    }

    /// Emit at [`LogLevel::Debug`].
    pub fn debug(&self, target: &'static str, message: impl FnOnce() -> String) {
        self.log(LogLevel::Debug, target, message);
    }

    /// Emit at [`LogLevel::Info`].
    pub fn info(&self, target: &'static str, message: impl FnOnce() -> String) {
        self.log(LogLevel::Info, target, message);
    }

    /// Emit at [`LogLevel::Warn`].
    pub fn warn(&self, target: &'static str, message: impl FnOnce() -> String) {
        self.log(LogLevel::Warn, target, message);
    }

    /// Emit at [`LogLevel::Error`].
    pub fn error(&self, target: &'static str, message: impl FnOnce() -> String) {
        self.log(LogLevel::Error, target, message);
    }
}

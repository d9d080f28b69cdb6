//! Structured records of what happened during a build.
//!
//! The sequencer reports through a [`DiagnosticSink`] it is handed rather
//! than logging directly, so callers decide where records go.

use std::fmt::{Debug, Display};

use log::Level;
use parking_lot::Mutex;

/// A step of the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Load,
    Resolve,
    Masters,
    CompatibilityCheck,
    Interpolate,
    Filter,
    Features,
    Convert,
    Subset,
    ProductionNames,
    Assemble,
    Write,
    Autohint,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Masters => "masters",
            Stage::CompatibilityCheck => "compatibility check",
            Stage::Interpolate => "interpolate",
            Stage::Filter => "filter",
            Stage::Features => "features",
            Stage::Convert => "convert",
            Stage::Subset => "subset",
            Stage::ProductionNames => "production names",
            Stage::Assemble => "assemble",
            Stage::Write => "write",
            Stage::Autohint => "autohint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<Severity> for Level {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Debug => Level::Debug,
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warn,
            Severity::Error => Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    /// What the record is about: a master, an instance, a file, a glyph
    pub entity: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        stage: Stage,
        entity: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic {
            stage,
            entity: entity.into(),
            severity,
            message: message.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.entity, self.message)
    }
}

pub trait DiagnosticSink: Debug + Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Forwards records to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, diagnostic: Diagnostic) {
        log::log!(Level::from(diagnostic.severity), "{diagnostic}");
    }
}

/// Logs and keeps every record
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        Default::default()
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Diagnostic> {
        self.records
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .cloned()
            .collect()
    }

    pub fn at_stage(&self, stage: Stage) -> Vec<Diagnostic> {
        self.records
            .lock()
            .iter()
            .filter(|d| d.stage == stage)
            .cloned()
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: Diagnostic) {
        LogSink.record(diagnostic.clone());
        self.records.lock().push(diagnostic);
    }
}

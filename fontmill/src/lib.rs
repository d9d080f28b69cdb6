//! Builds fonts from UFO and designspace sources.
//!
//! A [`BuildRequest`] describes the build; a [`StageSequencer`] runs it and
//! reports through a [`DiagnosticSink`].

mod args;
mod config;
mod diagnostics;
mod error;
mod output;
mod request;
mod sequencer;
mod timing;

pub use args::{Args, InterpolationEngine, OutputFormat, Verbosity};
pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, RecordingSink, Severity, Stage};
pub use error::Error;
pub use output::{font_stem, require_dir, OutputKind, OutputLayout};
pub use request::{BuildRequest, ChainOverrides, Input, InstanceSelection};
pub use sequencer::{BuildReport, BuildState, StageSequencer};
pub use timing::{StageTime, StageTimer};

use std::{io, path::PathBuf};

use millcore::{types::GlyphName, variations::DeltaError};
use thiserror::Error;
use write_fonts::{tables::glyf::MalformedPath, BuilderError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to resolve filter '{name}': {reason}")]
    FilterResolution { name: String, reason: String },
    #[error("Unable to resolve feature writer '{name}': {reason}")]
    FeatureWriterResolution { name: String, reason: String },
    #[error("Bad declaration '{text}': {reason}")]
    Declaration { text: String, reason: String },
    #[error("Filter '{filter}' failed on '{glyph}': {reason}")]
    Filter {
        filter: String,
        glyph: GlyphName,
        reason: String,
    },
    #[error("No layer named '{0}'")]
    MissingLayer(String),
    #[error("{0} outlines are not supported")]
    UnsupportedFlavor(String),
    #[error("'{glyph}' {reason}")]
    Outline { glyph: GlyphName, reason: String },
    #[error("'{glyph_name}' {kurbo_problem:?} {context}")]
    KurboError {
        glyph_name: GlyphName,
        kurbo_problem: MalformedPath,
        context: String,
    },
    #[error("'{glyph}' references {referenced_glyph}, {problem}")]
    ComponentError {
        glyph: GlyphName,
        referenced_glyph: GlyphName,
        problem: String,
    },
    #[error("Unable to build {table}: {reason}")]
    Table { table: String, reason: String },
    #[error("Unable to assemble font: {0}")]
    Builder(#[from] BuilderError),
    #[error("Failed to compute deltas for '{0}': {1}")]
    GlyphDeltaError(GlyphName, DeltaError),
    #[error("ttfautohint failed on '{path}' with exit code {exit_code:?}")]
    TTFA {
        path: PathBuf,
        exit_code: Option<i32>,
    },
    #[error("ttfautohint not found on PATH")]
    AutohintNotFound,
    #[error(transparent)]
    Ir(#[from] millir::Error),
    #[error(transparent)]
    Coords(#[from] millcore::Error),
}

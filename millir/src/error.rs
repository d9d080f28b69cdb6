use kurbo::Point;
use millcore::{coords::DesignLocation, types::GlyphName, variations::DeltaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed designspace, {entity}: {reason}")]
    MalformedDesignSpace { entity: String, reason: String },
    #[error("No default source; no master sits at the default location {0:?}")]
    NoDefaultSource(DesignLocation),
    #[error("Instance {instance}: unsupported interpolation, {reason}")]
    UnsupportedInterpolation { instance: String, reason: String },
    #[error("Incompatible masters, glyph '{glyph}': {problem}")]
    IncompatibleMasters { glyph: GlyphName, problem: String },
    #[error("Failed to interpolate glyph '{glyph}': {reason}")]
    GlyphInterpolation { glyph: GlyphName, reason: String },
    #[error("Glyph '{0}' not found")]
    GlyphNotFound(GlyphName),
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Bad contour in glyph '{glyph}': {source}")]
    Path {
        glyph: GlyphName,
        #[source]
        source: PathConversionError,
    },
    #[error(transparent)]
    Coords(#[from] millcore::Error),
    #[error(transparent)]
    Delta(#[from] DeltaError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathConversionError {
    #[error("Too many offcurve points ({num_offcurve}) before {points:?}")]
    TooManyOffcurvePoints {
        num_offcurve: usize,
        points: Vec<Point>,
    },
    #[error("A 'move' at {point:?} is only legal as the first point of a contour")]
    MoveAfterFirstPoint { point: Point },
    #[error("Unsupported path element {0}")]
    Unsupported(String),
}

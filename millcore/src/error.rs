use thiserror::Error;

use crate::types::Tag;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Axis {tag}: {reason}")]
    InvalidAxis { tag: Tag, reason: String },
    #[error("Location involved undefined axis {0}")]
    UnknownAxis(Tag),
    #[error("Mapping is not monotonic: {0:?}")]
    NonMonotonicMapping(Vec<(f64, f64)>),
    #[error("Mapping has no knots")]
    EmptyMapping,
    #[error("{value} is outside the range of axis {tag}")]
    OutOfRange { tag: Tag, value: f64 },
}

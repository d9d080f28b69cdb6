//! In-memory fonts and the designspace machinery that produces them.

pub mod compatibility;
pub mod designspace;
mod error;
pub mod font;
pub mod instancer;
pub mod path;
pub mod rules;

pub use error::{Error, PathConversionError};

//! The back half of a build: filters, feature writers and binary assembly.
//!
//! Everything here operates on a single [`millir::font::Font`] (or, for
//! variable fonts, the masters of a designspace) and produces either a
//! modified font or the bytes of a TrueType binary.

pub mod autohint;
mod cmap;
pub mod declaration;
mod error;
pub mod features;
pub mod filters;
pub mod font;
mod fvar;
mod glyphs;
mod head;
mod hmetrics;
mod maxp;
mod name;
mod os2;
pub mod outline;
mod post;
pub mod postprocess;

pub use error::Error;

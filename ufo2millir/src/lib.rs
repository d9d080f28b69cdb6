//! Converting from [Unified Font Object][UFO] files to millir fonts.
//!
//! [UFO]: http://unifiedfontobject.org

mod error;
mod fromir;
mod labels;
mod source;
mod toir;

pub use error::Error;
pub use fromir::{save_ufo, DesignSpaceWriter};
pub use source::{load_designspace, load_ufo, load_ufo_as_model};

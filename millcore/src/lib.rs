//! Types shared across the fontmill crates.
//!
//! Everything here is independent of any particular source format: axes,
//! the three coordinate spaces and conversions between them, and the
//! variation model used both to interpolate instances and to compute
//! deltas for variable fonts.

pub mod coords;
mod error;
pub mod piecewise_linear_map;
pub mod resolver;
pub mod types;
pub mod variations;

pub use error::Error;

//! Remaps values using a series of linear mappings.
//!
//! Used for designspace : userspace mapping, and for design : normalized.
//! For example, from a <https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html#location>
//! xvalue to a userspace (fvar) value.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Error;

/// What to do with a value that falls outside the first or last knot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutOfRange {
    /// Pin to the output of the nearest knot
    #[default]
    Clamp,
    /// Continue along the slope of the nearest segment
    Extrapolate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiecewiseLinearMap {
    // these two mappings have identical lengths, by construction
    from: Vec<OrderedFloat<f64>>, // sorted, ||'s to
    to: Vec<OrderedFloat<f64>>,   // sorted, ||'s from
    out_of_range: OutOfRange,
}

impl PiecewiseLinearMap {
    /// Create a new map from a series of (from, to) values.
    ///
    /// Knots are sorted by input. Both inputs and outputs must then be strictly
    /// increasing, otherwise the map could not be reversed.
    pub fn new(
        mut mappings: Vec<(OrderedFloat<f64>, OrderedFloat<f64>)>,
        out_of_range: OutOfRange,
    ) -> Result<PiecewiseLinearMap, Error> {
        if mappings.is_empty() {
            return Err(Error::EmptyMapping);
        }
        mappings.sort();
        mappings.dedup();
        let monotonic = mappings
            .windows(2)
            .all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1);
        if !monotonic {
            return Err(Error::NonMonotonicMapping(
                mappings.iter().map(|(f, t)| (f.0, t.0)).collect(),
            ));
        }
        let (from, to): (Vec<_>, Vec<_>) = mappings.into_iter().unzip();
        Ok(PiecewiseLinearMap {
            from,
            to,
            out_of_range,
        })
    }

    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    pub fn out_of_range(&self) -> OutOfRange {
        self.out_of_range
    }

    pub fn with_out_of_range(mut self, out_of_range: OutOfRange) -> Self {
        self.out_of_range = out_of_range;
        self
    }

    pub fn reverse(&self) -> PiecewiseLinearMap {
        // outputs are strictly increasing so the swapped knots are already sorted
        PiecewiseLinearMap {
            from: self.to.clone(),
            to: self.from.clone(),
            out_of_range: self.out_of_range,
        }
    }

    /// An iterator over (from, to) values.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.from
            .iter()
            .zip(self.to.iter())
            .map(|(from, to)| (from.0, to.0))
    }

    /// Is value within the first and last knot, inclusive
    pub fn contains(&self, value: OrderedFloat<f64>) -> bool {
        match (self.from.first(), self.from.last()) {
            (Some(min), Some(max)) => *min <= value && value <= *max,
            _ => false,
        }
    }

    /// Based on <https://github.com/fonttools/fonttools/blob/5a0dc4bc8dfaa0c7da146cf902395f748b3cebe5/Lib/fontTools/varLib/models.py#L502>
    ///
    /// A value exactly at a knot returns that knot's output, untouched by arithmetic.
    pub fn map(&self, value: OrderedFloat<f64>) -> OrderedFloat<f64> {
        match self.from.binary_search(&value) {
            Ok(idx) => self.to[idx], // This value is just right
            Err(idx) => {
                // idx is where we would insert from.
                // Interpolate between the values left/right of it, if any.
                let value = value.into_inner();
                let last = self.from.len() - 1;

                // This value is too small
                if idx == 0 {
                    return match self.out_of_range {
                        OutOfRange::Clamp => self.to[0],
                        OutOfRange::Extrapolate => self.extrapolate(value, 0, 1.min(last)),
                    };
                }
                // This value is too big
                if idx == self.from.len() {
                    return match self.out_of_range {
                        OutOfRange::Clamp => self.to[last],
                        OutOfRange::Extrapolate => {
                            self.extrapolate(value, last, last.saturating_sub(1))
                        }
                    };
                }

                // This value is between two known values and we must lerp
                let from_lhs = self.from[idx - 1].into_inner();
                let from_rhs = self.from[idx].into_inner();
                lerp(
                    self.to[idx - 1].into_inner(),
                    self.to[idx].into_inner(),
                    (value - from_lhs) / (from_rhs - from_lhs),
                )
                .into()
            }
        }
    }

    /// Continue the segment between knots `anchor` and `other` out to value.
    ///
    /// With a single knot there is no slope; like fontTools we shift by the
    /// knot's offset instead.
    fn extrapolate(&self, value: f64, anchor: usize, other: usize) -> OrderedFloat<f64> {
        let (x0, y0) = (self.from[anchor].0, self.to[anchor].0);
        if anchor == other {
            return (value + y0 - x0).into();
        }
        let (x1, y1) = (self.from[other].0, self.to[other].0);
        (y0 + (value - x0) * (y1 - y0) / (x1 - x0)).into()
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    debug_assert!((0_f64..=1_f64).contains(&t));
    a + t * (b - a)
}

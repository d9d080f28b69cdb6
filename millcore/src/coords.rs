//! Using confusable types for coords is an endless source of confusion; don't.
//!
//! A designspace has three coordinate spaces. User coordinates are what a
//! font user sees (CSS font-weight 400). Design coordinates are what the
//! designer drew in (stem width 84). Normalized coordinates are the `-1..=1`
//! space the interpolation math works in, with the default at 0.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Write},
    marker::PhantomData,
    ops::Sub,
};

use ordered_float::OrderedFloat;
use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize};
use write_fonts::types::{F2Dot14, Fixed, Tag};

use crate::{
    piecewise_linear_map::{OutOfRange, PiecewiseLinearMap},
    types::Axes,
    Error,
};

/// A trait for converting coordinates between coordinate spaces.
///
/// Implemented on the marker types for the spaces themselves. You don't
/// need to use this directly; see [`Coord::convert`] and [`Location::convert`].
pub trait ConvertSpace<ToSpace>: Sized {
    /// Convert a coord from our space to the target space.
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<ToSpace>;
}

/// The coordinate space used by the type designer/editing software.
///
/// In a [.designspace file][dspace], this is an 'xvalue'.
///
/// [dspace]: https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html#dimension-element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DesignSpace;

/// A coordinate space that may be visible to the end user.
///
/// In a [.designspace file][dspace], this is a 'uservalue'.
///
/// [dspace]: https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html#dimension-element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserSpace;

/// A space containing values in the range `-1..=1`, default at `0`.
///
/// Extrapolating models may produce values beyond that range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedSpace;

/// A coordinate in some coordinate space.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord<Space> {
    coord: OrderedFloat<f64>,
    // covariant but also Send + Sync, see
    // <https://doc.rust-lang.org/1.74.0/nomicon/phantom-data.html#table-of-phantomdata-patterns>
    space: PhantomData<fn() -> Space>,
}

/// A coordinate in design space.
pub type DesignCoord = Coord<DesignSpace>;
/// A coordinate in user space
pub type UserCoord = Coord<UserSpace>;
/// A coordinate in normalized space
pub type NormalizedCoord = Coord<NormalizedSpace>;

impl<Space> Coord<Space> {
    /// Create a new coordinate.
    ///
    /// Note that we do *not* impl From because we want conversion to be explicit.
    pub fn new(value: impl Into<OrderedFloat<f64>>) -> Self {
        Coord {
            coord: value.into(),
            space: PhantomData,
        }
    }

    pub fn into_inner(self) -> OrderedFloat<f64> {
        self.coord
    }

    pub fn to_f64(&self) -> f64 {
        self.coord.into_inner()
    }

    /// Convert this coordinate into the target space.
    pub fn convert<ToSpace>(&self, converter: &CoordConverter) -> Coord<ToSpace>
    where
        Space: ConvertSpace<ToSpace>,
    {
        Space::convert_coord(*self, converter)
    }
}

/// A set of per-axis coordinates that define a specific location in a coordinate system.
///
/// Hashable so it can be the key for a map of sources by location.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location<Space>(BTreeMap<Tag, Coord<Space>>);

/// A location in [`DesignSpace`].
pub type DesignLocation = Location<DesignSpace>;
/// A location in [`UserSpace`].
pub type UserLocation = Location<UserSpace>;
/// A location in [`NormalizedSpace`].
pub type NormalizedLocation = Location<NormalizedSpace>;

// a little helper to generate methods on coord for specific conversions
macro_rules! convert_convenience_methods {
    ($space:ident, $fn_name:ident) => {
        impl<Space> Coord<Space>
        where
            Space: ConvertSpace<$space>,
        {
            pub fn $fn_name(&self, converter: &CoordConverter) -> Coord<$space> {
                self.convert(converter)
            }
        }

        impl<Space> Location<Space>
        where
            Space: ConvertSpace<$space>,
        {
            pub fn $fn_name(&self, axes: &Axes) -> Result<Location<$space>, Error> {
                self.convert(axes)
            }
        }
    };
}
convert_convenience_methods!(NormalizedSpace, to_normalized);
convert_convenience_methods!(UserSpace, to_user);
convert_convenience_methods!(DesignSpace, to_design);

/// Converts between Design, User, and Normalized coordinates.
// Stores `PiecewiseLinearMap`'s in several directions. Sources
// suggest <= 10 mappings is typical, we can afford the bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CoordConverter {
    default: DesignCoord,
    user_to_design: PiecewiseLinearMap,
    design_to_user: PiecewiseLinearMap,
    design_to_normalized: PiecewiseLinearMap,
    normalized_to_design: PiecewiseLinearMap,
}

impl CoordConverter {
    /// Initialize a converter from the User:Design examples source files typically provide.
    ///
    /// `default_idx` identifies the mapping that holds the default.
    pub fn new(
        mut mappings: Vec<(UserCoord, DesignCoord)>,
        default_idx: usize,
    ) -> Result<CoordConverter, Error> {
        if mappings.is_empty() {
            mappings.push((UserCoord::new(0.0), DesignCoord::new(0.0)));
        }
        let Some((_, design_default)) = mappings.get(default_idx).copied() else {
            return Err(Error::EmptyMapping);
        };
        let user_to_design = PiecewiseLinearMap::new(
            mappings
                .iter()
                .map(|(u, d)| (u.into_inner(), d.into_inner()))
                .collect(),
            OutOfRange::Clamp,
        )?;

        let design_min = mappings.iter().map(|(_, d)| *d).min().unwrap_or_default();
        let design_max = mappings.iter().map(|(_, d)| *d).max().unwrap_or_default();

        let mut examples = Vec::new();
        if design_min < design_default {
            examples.push((design_min.into_inner(), (-1.0).into())); // leftmost of default *must* be -1
        }
        examples.push((design_default.into_inner(), 0.0.into())); // default *must* land at 0
        if design_max > design_default {
            examples.push((design_max.into_inner(), 1.0.into())); // right of default *must* be +1
        }
        let design_to_normalized = PiecewiseLinearMap::new(examples, OutOfRange::Clamp)?;

        let design_to_user = user_to_design.reverse();
        let normalized_to_design = design_to_normalized.reverse();

        Ok(CoordConverter {
            default: design_default,
            user_to_design,
            design_to_user,
            design_to_normalized,
            normalized_to_design,
        })
    }

    /// Initialize a converter from just min/default/max user coords, e.g. an axis with no mapping
    pub fn unmapped(
        min: UserCoord,
        default: UserCoord,
        max: UserCoord,
    ) -> Result<CoordConverter, Error> {
        let mut mappings = vec![
            (min, DesignCoord::new(min.into_inner())),
            (default, DesignCoord::new(default.into_inner())),
            (max, DesignCoord::new(max.into_inner())),
        ];
        mappings.dedup();
        let default_idx = mappings
            .iter()
            .position(|(u, _)| *u == default)
            .unwrap_or_default();
        CoordConverter::new(mappings, default_idx)
    }

    /// A copy of this converter that treats values beyond the mapped range as specified.
    pub fn with_out_of_range(&self, out_of_range: OutOfRange) -> CoordConverter {
        CoordConverter {
            default: self.default,
            user_to_design: self.user_to_design.clone().with_out_of_range(out_of_range),
            design_to_user: self.design_to_user.clone().with_out_of_range(out_of_range),
            design_to_normalized: self
                .design_to_normalized
                .clone()
                .with_out_of_range(out_of_range),
            normalized_to_design: self
                .normalized_to_design
                .clone()
                .with_out_of_range(out_of_range),
        }
    }

    pub fn out_of_range(&self) -> OutOfRange {
        self.user_to_design.out_of_range()
    }

    /// Walk the vertices of the mappings, viewing the user/design/normalized value at each stop.
    pub fn iter(&self) -> impl Iterator<Item = (UserCoord, DesignCoord, NormalizedCoord)> + '_ {
        self.user_to_design.iter().map(|(user, design)| {
            let user = UserCoord::new(user);
            let design = DesignCoord::new(design);
            let normalized = design.to_normalized(self);
            (user, design, normalized)
        })
    }

    /// The default, in design space
    pub fn default_design(&self) -> DesignCoord {
        self.default
    }

    /// Is the design coordinate within the mapped range
    pub fn contains_design(&self, coord: DesignCoord) -> bool {
        self.design_to_user.contains(coord.into_inner())
    }

    /// How many mapping points exist
    pub fn len(&self) -> usize {
        self.user_to_design.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_to_design.is_empty()
    }
}

impl From<UserCoord> for Fixed {
    fn from(value: UserCoord) -> Self {
        Fixed::from_f64(value.to_f64())
    }
}

impl From<NormalizedCoord> for F2Dot14 {
    fn from(value: NormalizedCoord) -> Self {
        F2Dot14::from_f32(value.to_f64() as f32)
    }
}

impl<Space> Sub<Coord<Space>> for Coord<Space> {
    type Output = Coord<Space>;

    fn sub(self, rhs: Coord<Space>) -> Self::Output {
        Coord::new(self.to_f64() - rhs.to_f64())
    }
}

impl<Space> FromIterator<(Tag, Coord<Space>)> for Location<Space> {
    fn from_iter<I: IntoIterator<Item = (Tag, Coord<Space>)>>(iter: I) -> Self {
        Location(iter.into_iter().collect())
    }
}

impl<Space> From<Vec<(Tag, Coord<Space>)>> for Location<Space> {
    fn from(value: Vec<(Tag, Coord<Space>)>) -> Self {
        value.into_iter().collect()
    }
}

impl<Space> Location<Space> {
    pub fn new() -> Location<Space> {
        Location(Default::default())
    }

    /// For testing only, make a location from raw tags + values
    #[doc(hidden)]
    pub fn for_pos(positions: &[(&str, f64)]) -> Self {
        positions
            .iter()
            .map(|(tag, value)| (Tag::new_checked(tag.as_bytes()).unwrap(), Coord::new(*value)))
            .collect()
    }

    pub fn insert(&mut self, tag: Tag, pos: Coord<Space>) -> &mut Location<Space> {
        self.0.insert(tag, pos);
        self
    }

    pub fn remove(&mut self, tag: Tag) {
        self.0.remove(&tag);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Coord<Space>)> {
        self.0.iter()
    }

    pub fn axis_tags(&self) -> impl Iterator<Item = &Tag> {
        self.0.keys()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<Coord<Space>> {
        self.0.get(&tag).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn retain(&mut self, pred: impl Fn(&Tag, &mut Coord<Space>) -> bool) {
        self.0.retain(pred);
    }

    /// Does this location have exactly the given axes, no more, no less
    pub fn has_exact_axes(&self, axis_order: &[Tag]) -> bool {
        self.0.len() == axis_order.len() && axis_order.iter().all(|tag| self.0.contains_key(tag))
    }

    /// Drop axes not in axis_order, add missing ones at 0
    pub fn fit_to_axes(&mut self, axis_order: &[Tag]) {
        self.0.retain(|tag, _| axis_order.contains(tag));
        for tag in axis_order {
            self.0.entry(*tag).or_insert_with(|| Coord::new(0.0));
        }
    }

    pub fn convert<ToSpace>(&self, axes: &Axes) -> Result<Location<ToSpace>, Error>
    where
        Space: ConvertSpace<ToSpace>,
    {
        self.0
            .iter()
            .map(|(tag, coord)| {
                let axis = axes.get(tag).ok_or(Error::UnknownAxis(*tag))?;
                Ok((*tag, coord.convert(&axis.converter)))
            })
            .collect()
    }
}

// methods we only want available on NormalizedSpace
impl Location<NormalizedSpace> {
    pub fn has_non_zero(&self, tag: Tag) -> bool {
        self.get(tag).unwrap_or_default().to_f64() != 0.0
    }

    pub fn has_any_non_zero(&self) -> bool {
        self.0.values().any(|v| v.to_f64() != 0.0)
    }

    /// Returns true if all normalized coordinates are zero
    pub fn is_default(&self) -> bool {
        !self.has_any_non_zero()
    }
}

impl ConvertSpace<UserSpace> for DesignSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<UserSpace> {
        Coord::new(converter.design_to_user.map(coord.coord))
    }
}

impl ConvertSpace<NormalizedSpace> for DesignSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<NormalizedSpace> {
        Coord::new(converter.design_to_normalized.map(coord.coord))
    }
}

impl ConvertSpace<DesignSpace> for UserSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<DesignSpace> {
        Coord::new(converter.user_to_design.map(coord.coord))
    }
}

impl ConvertSpace<NormalizedSpace> for UserSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<NormalizedSpace> {
        let dspace: DesignCoord = UserSpace::convert_coord(coord, converter);
        DesignSpace::convert_coord(dspace, converter)
    }
}

impl ConvertSpace<DesignSpace> for NormalizedSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<DesignSpace> {
        Coord::new(converter.normalized_to_design.map(coord.coord))
    }
}

impl ConvertSpace<UserSpace> for NormalizedSpace {
    fn convert_coord(coord: Coord<Self>, converter: &CoordConverter) -> Coord<UserSpace> {
        let dspace: DesignCoord = NormalizedSpace::convert_coord(coord, converter);
        DesignSpace::convert_coord(dspace, converter)
    }
}

// we need to manually implement this bc of phantomdata:
// <https://stackoverflow.com/questions/31371027/copy-trait-and-phantomdata-should-this-really-move>
impl<T> Clone for Coord<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Coord<T> {}

impl<Space> PartialEq<f64> for Coord<Space> {
    fn eq(&self, other: &f64) -> bool {
        self.coord.as_ref() == other
    }
}

impl<Space> Serialize for Location<Space> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            seq.serialize_element(&(key, value.to_f64()))?;
        }
        seq.end()
    }
}

impl<'de, Space> Deserialize<'de> for Location<Space> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries: Vec<(Tag, f64)> = Deserialize::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|(tag, value)| (tag, Coord::new(value)))
            .collect())
    }
}

impl<Space> Debug for Location<Space> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Location {")?;
        for (i, (tag, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, " {tag}: {}", value.to_f64())?;
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn wght_converter() -> CoordConverter {
        // 100..900 with 400 at design 40, a typical non-linear mapping
        CoordConverter::new(
            vec![
                (UserCoord::new(100.0), DesignCoord::new(10.0)),
                (UserCoord::new(400.0), DesignCoord::new(40.0)),
                (UserCoord::new(700.0), DesignCoord::new(140.0)),
                (UserCoord::new(900.0), DesignCoord::new(200.0)),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn default_is_zero() {
        let converter = wght_converter();
        assert_eq!(
            NormalizedCoord::new(0.0),
            UserCoord::new(400.0).to_normalized(&converter)
        );
        assert_eq!(DesignCoord::new(40.0), converter.default_design());
    }

    #[test]
    fn extremes_are_plus_minus_one() {
        let converter = wght_converter();
        assert_eq!(
            NormalizedCoord::new(-1.0),
            UserCoord::new(100.0).to_normalized(&converter)
        );
        assert_eq!(
            NormalizedCoord::new(1.0),
            UserCoord::new(900.0).to_normalized(&converter)
        );
    }

    #[test]
    fn clamp_or_extrapolate_beyond_max() {
        let converter = wght_converter();
        assert_eq!(
            NormalizedCoord::new(1.0),
            DesignCoord::new(260.0).to_normalized(&converter)
        );
        let converter = converter.with_out_of_range(OutOfRange::Extrapolate);
        assert_eq!(
            NormalizedCoord::new(1.375),
            DesignCoord::new(260.0).to_normalized(&converter)
        );
    }

    #[test]
    fn iter_visits_every_knot() {
        let converter = wght_converter();
        assert_eq!(
            vec![(100.0, 10.0), (400.0, 40.0), (700.0, 140.0), (900.0, 200.0)],
            converter
                .iter()
                .map(|(u, d, _)| (u.to_f64(), d.to_f64()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn fit_to_axes_fills_and_trims() {
        let mut loc = NormalizedLocation::for_pos(&[("wght", 0.5), ("XXXX", 1.0)]);
        let axes = [Tag::new(b"wght"), Tag::new(b"wdth")];
        assert!(!loc.has_exact_axes(&axes));
        loc.fit_to_axes(&axes);
        assert_eq!(
            NormalizedLocation::for_pos(&[("wght", 0.5), ("wdth", 0.0)]),
            loc
        );
        assert!(loc.has_exact_axes(&axes));
    }
}

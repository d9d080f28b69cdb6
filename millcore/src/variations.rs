//! Master weights and deltas over a set of master locations.
//!
//! Static instances are built by weighting master values with
//! [`VariationModel::master_weights`]; variable fonts store the result of
//! [`VariationModel::deltas`]. Both views come from the same region split,
//! so a static instance and the variable font agree at any location.
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    fmt::{Debug, Display},
    ops::{Mul, RangeInclusive, Sub},
};

use log::{log_enabled, trace};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use write_fonts::{tables::gvar, types::Tag};

use crate::coords::{NormalizedCoord, NormalizedLocation};

/// Different ways of rounding values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundingBehaviour {
    /// Don't round values
    None,
    /// Round half-way values to the nearest even number. See [`RoundTiesEven`].
    RoundTiesEven,
}

impl RoundingBehaviour {
    fn apply<T: RoundTiesEven>(self, value: T) -> T {
        match self {
            RoundingBehaviour::None => value,
            RoundingBehaviour::RoundTiesEven => value.round_ties_even(),
        }
    }
}

/// Rounds half-way values to the nearest even number.
///
/// For example, 2.5 rounds to 2.0, 3.5 rounds to 4.0, and -2.5 rounds to -2.0.
/// Matches Python's `round`, which fontTools uses when computing deltas, and
/// avoids drift when many rounded deltas are summed.
pub trait RoundTiesEven {
    fn round_ties_even(self) -> Self;
}

impl RoundTiesEven for f64 {
    #[inline]
    fn round_ties_even(self) -> f64 {
        f64::round_ties_even(self)
    }
}

impl RoundTiesEven for kurbo::Vec2 {
    #[inline]
    fn round_ties_even(self) -> kurbo::Vec2 {
        kurbo::Vec2::new(self.x.round_ties_even(), self.y.round_ties_even())
    }
}

const ZERO: OrderedFloat<f64> = OrderedFloat(0.0);
const ONE: OrderedFloat<f64> = OrderedFloat(1.0);

/// Deltas covering various regions to form a variation space.
///
/// The deltas sum to calculate the value at a given location, with magnitude
/// derived from the relative position to the region. The default region is
/// applied everywhere.
///
/// See <https://learn.microsoft.com/en-us/typography/opentype/spec/otvaroverview#variation-data>
pub type ModelDeltas<V> = Vec<(VariationRegion, Vec<V>)>;

/// A model of how variation space is subdivided into regions.
///
/// Given a set of master locations, figures out a set of regions and the weights each
/// region assigns to each master.
///
/// See `class VariationModel` in <https://github.com/fonttools/fonttools/blob/main/Lib/fontTools/varLib/models.py>
#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VariationModel {
    pub default: NormalizedLocation,

    /// Non-point axes
    axis_order: Vec<Tag>,

    // All Vec's have same length and items at the same index refer to the same master
    locations: Vec<NormalizedLocation>,
    influence: Vec<VariationRegion>,

    // [n] gives a vec of (master index, scale for deltas from that master)
    delta_weights: Vec<Vec<(usize, OrderedFloat<f64>)>>,
    // if the model supports extrapolation, these are the min/max supported positions,
    // per-tag.
    axis_ranges_for_extrapolation: Option<HashMap<Tag, RangeInclusive<OrderedFloat<f64>>>>,
}

impl VariationModel {
    /// Create a model of variation space subdivision.
    ///
    /// Axis order should not include point axes.
    pub fn new(locations: HashSet<NormalizedLocation>, axis_order: Vec<Tag>) -> Self {
        let default = axis_order
            .iter()
            .map(|axis| (*axis, NormalizedCoord::new(ZERO)))
            .collect();

        let mut expanded_locations = HashSet::new();
        for mut location in locations.into_iter() {
            location.fit_to_axes(&axis_order);
            expanded_locations.insert(location);
        }

        // sort locations such that [i..N] cannot influence [0..i-1]
        let mut locations: Vec<_> = expanded_locations.into_iter().collect();
        let sorting_hat = LocationSortingHat::new(&locations, &axis_order);
        locations.sort_by_cached_key(|loc| sorting_hat.key_for(loc));

        let regions = regions_for(&axis_order, &locations);
        let influence = master_influence(&axis_order, &regions);
        let delta_weights = delta_weights(&locations, &influence);

        if log_enabled!(log::Level::Trace) {
            trace!("Model");
            for (loc, region) in locations.iter().zip(regions.iter()) {
                trace!("  {loc:?} {region:?}");
            }
        }

        VariationModel {
            default,
            axis_order,
            locations,
            influence,
            delta_weights,
            axis_ranges_for_extrapolation: None,
        }
    }

    /// A variation model that supports extrapolation beyond the masters.
    ///
    /// <https://github.com/fonttools/fonttools/blob/03a3c8ed/Lib/fontTools/varLib/models.py#L306>
    pub fn new_extrapolating(locations: HashSet<NormalizedLocation>, axis_order: Vec<Tag>) -> Self {
        let mut this = Self::new(locations, axis_order);
        let ranges = this
            .axis_order
            .iter()
            .map(|axis| {
                let (min, max) = this
                    .locations
                    .iter()
                    .filter_map(|loc| loc.get(*axis))
                    .fold((f64::MAX, f64::MIN), |(min, max), val| {
                        (min.min(val.to_f64()), max.max(val.to_f64()))
                    });
                (*axis, min.into()..=max.into())
            })
            .collect();
        this.axis_ranges_for_extrapolation = Some(ranges);
        this
    }

    /// Unique master locations for model, in model order
    pub fn locations(&self) -> impl Iterator<Item = &NormalizedLocation> {
        self.locations.iter()
    }

    /// The axes in the model, in order
    pub fn axis_order(&self) -> &[Tag] {
        &self.axis_order
    }

    /// Per axis min/max over the master locations.
    pub fn hull(&self) -> BTreeMap<Tag, (f64, f64)> {
        self.axis_order
            .iter()
            .map(|tag| {
                let (min, max) = self
                    .locations
                    .iter()
                    .filter_map(|loc| loc.get(*tag))
                    .fold((0.0_f64, 0.0_f64), |(min, max), v| {
                        (min.min(v.to_f64()), max.max(v.to_f64()))
                    });
                (*tag, (min, max))
            })
            .collect()
    }

    /// The contribution of each master to a value at location.
    ///
    /// Returned in the same order as [`Self::locations`]. A value at location is
    /// the sum of master values times these weights. At a master location
    /// the result is exactly one for that master and zero for every other.
    ///
    /// Rust version of `getMasterScalars` in
    /// <https://github.com/fonttools/fonttools/blob/03a3c8ed/Lib/fontTools/varLib/models.py#L576>
    pub fn master_weights(&self, location: &NormalizedLocation) -> Vec<f64> {
        let mut location = location.clone();
        location.fit_to_axes(&self.axis_order);

        if let Some(idx) = self.locations.iter().position(|l| *l == location) {
            let mut weights = vec![0.0; self.locations.len()];
            weights[idx] = 1.0;
            return weights;
        }

        let mut weights: Vec<f64> = self
            .influence
            .iter()
            .map(|region| {
                region
                    .scalar_at_with_args(&location, self.axis_ranges_for_extrapolation.as_ref())
                    .into_inner()
            })
            .collect();
        for idx in (0..weights.len()).rev() {
            let own = weights[idx];
            for (master_idx, weight) in self.delta_weights[idx].iter() {
                weights[*master_idx] -= own * weight.into_inner();
            }
        }
        trace!("master weights at {location:?}: {weights:?}");
        weights
    }

    /// Convert absolute positions at master locations to offsets.
    ///
    /// All keys in points must be known to the variation model and all point
    /// vectors must have the same length. It is NOT required to provide a point
    /// sequence for every location known to the model.
    ///
    /// P is the point type, V the vector type; for 2d [kurbo::Point] and
    /// [kurbo::Vec2] would be typical, for 1d a float.
    ///
    /// Rust version of <https://github.com/fonttools/fonttools/blob/3b9a73ff837/Lib/fontTools/varLib/models.py#L449-L461>
    pub fn deltas<P, V>(
        &self,
        point_seqs: &HashMap<NormalizedLocation, Vec<P>>,
    ) -> Result<ModelDeltas<V>, DeltaError>
    where
        P: Copy + Default + Sub<P, Output = V>,
        V: Copy + Mul<f64, Output = V> + Sub<V, Output = V> + RoundTiesEven,
    {
        self.deltas_with_rounding(point_seqs, RoundingBehaviour::RoundTiesEven)
    }

    /// Like [`deltas`] but with control over rounding behaviour.
    ///
    /// [`deltas`]: Self::deltas
    pub fn deltas_with_rounding<P, V>(
        &self,
        point_seqs: &HashMap<NormalizedLocation, Vec<P>>,
        rounding: RoundingBehaviour,
    ) -> Result<ModelDeltas<V>, DeltaError>
    where
        P: Copy + Default + Sub<P, Output = V>,
        V: Copy + Mul<f64, Output = V> + Sub<V, Output = V> + RoundTiesEven,
    {
        let point_seqs: HashMap<NormalizedLocation, &Vec<P>> = point_seqs
            .iter()
            .map(|(loc, points)| {
                let mut loc = loc.clone();
                loc.fit_to_axes(&self.axis_order);
                (loc, points)
            })
            .collect();
        let Some(point_seq_len) = point_seqs.values().next().map(|pts| pts.len()) else {
            return Ok(Vec::new());
        };
        if point_seqs.values().any(|pts| pts.len() != point_seq_len) {
            return Err(DeltaError::InconsistentNumbersOfPoints);
        }
        if let Some(loc) = point_seqs.keys().find(|loc| !self.locations.contains(loc)) {
            return Err(DeltaError::UnknownLocation(loc.clone()));
        }
        if !point_seqs.contains_key(&self.default) {
            return Err(DeltaError::DefaultUndefined);
        }

        let mut result: ModelDeltas<V> = Vec::new();
        let mut model_idx_to_result_idx = HashMap::new();

        // The fields of self are sorted such that[i] is only influenced by[i+1..N]
        // so we know subsequent spins won't invalidate our delta if we go in the same order
        for (model_idx, region, points) in self
            .influence
            .iter()
            .zip(self.locations.iter())
            .enumerate()
            .filter_map(|(idx, (region, loc))| {
                point_seqs.get(loc).map(|points| (idx, region, *points))
            })
        {
            let master_influences = &self.delta_weights[model_idx];
            let mut deltas = Vec::with_capacity(points.len());

            for (idx, point) in points.iter().enumerate() {
                let initial_vector: V = *point - Default::default();
                // Any master with influence on us was processed already; subtract
                // away their contributions and what's left is our delta.
                let delta = master_influences
                    .iter()
                    .filter_map(|(master_idx, master_weight)| {
                        let result_idx = model_idx_to_result_idx.get(master_idx)?;
                        let (_, master_deltas): &(VariationRegion, Vec<V>) =
                            result.get(*result_idx)?;
                        let delta = master_deltas.get(idx)?;
                        Some((delta, master_weight.into_inner()))
                    })
                    .fold(initial_vector, |acc, (other, other_weight)| {
                        acc - *other * other_weight
                    });

                // round here, not at the end, so errors don't compound where
                // master influences overlap. Matches
                // https://github.com/fonttools/fonttools/pull/2214
                deltas.push(rounding.apply(delta));
            }
            model_idx_to_result_idx.insert(model_idx, result.len());
            result.push((region.clone(), deltas));
        }

        Ok(result)
    }
}

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("The default must have a point sequence")]
    DefaultUndefined,
    #[error("Every point sequence must have the same length")]
    InconsistentNumbersOfPoints,
    #[error("{0:?} is not present in the variation model")]
    UnknownLocation(NormalizedLocation),
}

/// Gryffindor!
///
/// Sorts locations, and thus the resulting regions, from most to least
/// influential: the default master, then masters on an axis, and finally any
/// other masters (sometimes referred to as knockout or fixup masters).
/// Further keys break ties deterministically.
///
/// Rust version of FontTools getMasterLocationsSortKeyFunc.
/// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L295>
struct LocationSortingHat<'a> {
    axis_order: &'a Vec<Tag>,
    on_axis_points: HashMap<Tag, HashSet<NormalizedCoord>>,
}

impl<'a> LocationSortingHat<'a> {
    fn new(locations: &[NormalizedLocation], axis_order: &'a Vec<Tag>) -> LocationSortingHat<'a> {
        // Location is on-axis if it has exactly 1 non-zero coordinate
        let mut on_axis_points: HashMap<Tag, HashSet<NormalizedCoord>> = HashMap::new();
        'location: for location in locations {
            let mut on_axis: Option<(Tag, NormalizedCoord)> = None;
            for (tag, pos) in location.iter() {
                if pos.into_inner() == ZERO {
                    continue;
                }
                if on_axis.is_some() {
                    continue 'location; // multiple non-zero coords, bail out
                }
                on_axis = Some((*tag, *pos));
            }
            if let Some((tag, pos)) = on_axis {
                on_axis_points.entry(tag).or_default().insert(pos);
            }
        }
        LocationSortingHat {
            axis_order,
            on_axis_points,
        }
    }

    fn key_for(&self, location: &NormalizedLocation) -> LocationSortKey {
        let mut rank = 0;
        let mut on_axis_points: i16 = 0;
        let mut ordered_axes = Vec::new();
        let mut non_zero_axes = Vec::new();

        // index of every non-zero axis in the user specified axis order
        let mut known_axes = Vec::new();
        for (idx, tag) in self.axis_order.iter().enumerate() {
            if location.has_non_zero(*tag) {
                known_axes.push(idx);
                ordered_axes.push(*tag);
            }
        }

        for (tag, pos) in location.iter() {
            if pos.into_inner() != ZERO {
                rank += 1;
                // an axis with no assigned order sorts after every ordered one
                if !self.axis_order.contains(tag) {
                    known_axes.push(0x10000);
                }
                non_zero_axes.push(*tag);
            }
            // -1 for every position that matches a location directly on an axis
            on_axis_points += self
                .on_axis_points
                .get(tag)
                .map(|on_axis| on_axis.get(pos).map_or(0, |_| -1))
                .unwrap_or_default();
        }

        let mut unordered_axes: Vec<Tag> = non_zero_axes
            .into_iter()
            .filter(|tag| !ordered_axes.contains(tag))
            .collect();
        unordered_axes.sort();
        ordered_axes.extend(unordered_axes);

        let axis_value_signs = ordered_axes
            .iter()
            .map(|tag| {
                location
                    .get(*tag)
                    .map(|coord| match coord.into_inner().cmp(&ZERO) {
                        Ordering::Greater => 1_i8,
                        Ordering::Less => -1_i8,
                        Ordering::Equal => 0_i8,
                    })
                    .unwrap_or_default()
            })
            .collect();

        let axis_value_abs = ordered_axes
            .iter()
            .map(|tag| {
                location
                    .get(*tag)
                    .map(|coord| OrderedFloat(coord.to_f64().abs()))
                    .unwrap_or_default()
            })
            .collect();

        LocationSortKey {
            rank,
            on_axis_points,
            known_axes,
            ordered_axes,
            axis_value_signs,
            axis_value_abs,
        }
    }
}

/// Sort key for a location; only axes with a non-zero value matter.
///
/// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L326>
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct LocationSortKey {
    // 1 for every non-zero entry in the map
    rank: usize,
    // -1 for every axis:value entry where some other location sits on that axis at that value
    on_axis_points: i16,
    // index in user-specified axis order, otherwise 0x10000
    known_axes: Vec<usize>,
    ordered_axes: Vec<Tag>,
    axis_value_signs: Vec<i8>,
    axis_value_abs: Vec<OrderedFloat<f64>>,
}

/// A chunk of variation space characterized by a set of per-axis tents.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct VariationRegion {
    axis_tents: BTreeMap<Tag, Tent>,
    active_axes: HashSet<Tag>,
}

impl VariationRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scalar multiplier for the provided location for this region.
    pub fn scalar_at(&self, location: &NormalizedLocation) -> OrderedFloat<f64> {
        self.scalar_at_with_args(location, None)
    }

    /// The scalar multiplier for location, optionally extrapolating.
    ///
    /// `axis_ranges` implies extrapolation: the allowed range of input values
    /// per axis. Without it only `-1.0..=1.0` is meaningful.
    ///
    /// Based on varLib.supportScalar
    /// <https://github.com/fonttools/fonttools/blob/2f1f5e5e/Lib/fontTools/varLib/models.py#L123>.
    pub fn scalar_at_with_args(
        &self,
        location: &NormalizedLocation,
        axis_ranges: Option<&HashMap<Tag, RangeInclusive<OrderedFloat<f64>>>>,
    ) -> OrderedFloat<f64> {
        self.axis_tents
            .iter()
            .filter(|(_, ar)| ar.validate())
            .fold(ONE, |scalar, (tag, tent)| {
                let v = location
                    .get(*tag)
                    .map(|v| v.into_inner())
                    .unwrap_or_default();
                let min = tent.min.into_inner();
                let peak = tent.peak.into_inner();
                let max = tent.max.into_inner();

                // If we're at the peak by definition we have full influence
                if v == peak {
                    return scalar;
                }

                // If the Tent is 0,0,0 it's always in full effect
                if (min, peak, max) == (ZERO, ZERO, ZERO) {
                    return scalar;
                }

                // https://github.com/fonttools/fonttools/blob/03a3c8ed/Lib/fontTools/varLib/models.py#L181
                if let Some(range) = axis_ranges.and_then(|ranges| ranges.get(tag)) {
                    let axis_min = *range.start();
                    let axis_max = *range.end();
                    if v < axis_min && min <= axis_min {
                        if peak <= axis_min && peak < max {
                            return scalar * (v - max) / (peak - max);
                        } else if axis_min < peak {
                            return scalar * (v - min) / (peak - min);
                        }
                    } else if axis_max < v && axis_max <= max {
                        if axis_max <= peak && min < peak {
                            return scalar * (v - min) / (peak - min);
                        } else if peak < axis_max {
                            return scalar * (v - max) / (peak - max);
                        }
                    }
                }

                if v <= min || max <= v {
                    return ZERO;
                }

                let subtract_me = if v < peak { min } else { max };
                scalar * (v - subtract_me) / (peak - subtract_me)
            })
    }

    pub fn insert(&mut self, tag: Tag, tent: Tent) {
        if tent.has_non_zero() {
            self.active_axes.insert(tag);
        }
        self.axis_tents.insert(tag, tent);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Tent)> {
        self.axis_tents.iter()
    }

    pub fn is_default(&self) -> bool {
        self.active_axes.is_empty()
    }

    pub fn get(&self, tag: &Tag) -> Option<&Tent> {
        self.axis_tents.get(tag)
    }

    /// Tents in the order of the given axes, for the gvar table.
    ///
    /// Axes the region doesn't mention are treated as not participating.
    pub fn to_gvar_tents(&self, axis_order: &[Tag]) -> Vec<gvar::Tent> {
        axis_order
            .iter()
            .map(|tag| (*self.get(tag).unwrap_or(&Tent::zeroes())).into())
            .collect()
    }
}

/// The min/peak/max of a masters influence.
///
/// Visualize as a tent of influence, starting at min, peaking at peak,
/// and dropping off to zero at max.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tent {
    pub min: NormalizedCoord,
    pub peak: NormalizedCoord,
    pub max: NormalizedCoord,
}

impl Tent {
    pub fn new(mut min: NormalizedCoord, peak: NormalizedCoord, mut max: NormalizedCoord) -> Self {
        let zero = NormalizedCoord::new(0.0);
        if peak > zero {
            min = zero;
        } else {
            max = zero;
        }
        Tent { min, peak, max }
    }

    pub fn zeroes() -> Tent {
        let zero = NormalizedCoord::new(0.0);
        Tent::new(zero, zero, zero)
    }

    /// OT-specific validation of whether we could have any influence
    ///
    /// (0,0,0) IS valid, meaning apply my deltas at full scale always
    ///
    /// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L162>
    fn validate(&self) -> bool {
        let min = self.min.into_inner();
        let peak = self.peak.into_inner();
        let max = self.max.into_inner();

        if min > peak || peak > max {
            return false;
        }
        if min < ZERO && max > ZERO {
            return false;
        }
        true
    }

    pub fn has_non_zero(&self) -> bool {
        let zero = NormalizedCoord::new(0.0);
        (zero, zero, zero) != (self.min, self.peak, self.max)
    }
}

impl Debug for Tent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl Display for Tent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let comment = if self.validate() { "" } else { " (invalid)" };
        write!(
            f,
            "Tent {{{}, {}, {}{}}}",
            self.min.to_f64(),
            self.peak.to_f64(),
            self.max.to_f64(),
            comment
        )
    }
}

impl From<(f64, f64, f64)> for Tent {
    fn from(value: (f64, f64, f64)) -> Self {
        Tent::new(
            NormalizedCoord::new(value.0),
            NormalizedCoord::new(value.1),
            NormalizedCoord::new(value.2),
        )
    }
}

impl From<Tent> for gvar::Tent {
    fn from(val: Tent) -> Self {
        let Tent { peak, min, max } = val;
        gvar::Tent::new(peak.into(), Some((min.into(), max.into())))
    }
}

/// Split space into regions.
///
/// VariationModel::_locationsToRegions in Python.
/// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L416>
fn regions_for(axis_order: &[Tag], locations: &[NormalizedLocation]) -> Vec<VariationRegion> {
    let mut minmax = HashMap::<Tag, (NormalizedCoord, NormalizedCoord)>::new();
    for location in locations.iter() {
        for (tag, value) in location.iter() {
            let (min, max) = minmax.entry(*tag).or_default();
            if value < min {
                *min = *value;
            }
            if value > max {
                *max = *value;
            }
        }
    }

    locations
        .iter()
        .map(|location| {
            let mut region = VariationRegion::new();
            for tag in axis_order {
                // locations were fit to the axes so this is always present
                let value = location.get(*tag).unwrap_or_default();

                // Python scrubs 0's out of the location; we store representative tents.
                let (min, max) = if value.into_inner() == ZERO {
                    (NormalizedCoord::new(ZERO), NormalizedCoord::new(ZERO))
                } else {
                    minmax.get(tag).copied().unwrap_or_default()
                };
                region.insert(*tag, Tent::new(min, value, max));
            }
            region
        })
        .collect()
}

/// Compute the influence of each master, if any, on each region.
///
/// The regions must have been sorted by the [LocationSortingHat] so that for
/// each region we only need to look at preceding regions for overlaps.
///
/// VariationModel::_computeMasterSupports in Python.
/// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L360>
fn master_influence(axis_order: &[Tag], regions: &[VariationRegion]) -> Vec<VariationRegion> {
    let mut influence: Vec<VariationRegion> = Vec::new();
    for region in regions.iter() {
        let mut region = region.clone();
        // Python walks regions[:i] as modified by earlier iterations; the
        // influences computed so far are exactly that.
        for prev_region in influence.iter() {
            if region.active_axes != prev_region.active_axes {
                continue;
            }
            // If prev doesn't overlap current we aren't interested
            let overlap = region.iter().all(|(axis_name, tent)| {
                let prev_peak = prev_region.axis_tents[axis_name].peak;
                prev_peak == tent.peak || (tent.min < prev_peak && prev_peak < tent.max)
            });
            if !overlap {
                continue;
            }

            // Split the box for the new master in the direction with the largest
            // range ratio, across multiple axes if they tie.
            // https://github.com/fonttools/fonttools/commit/7ee81c8821671157968b097f3e55309a1faa511e#commitcomment-31054804
            let mut axis_regions: HashMap<Tag, Tent> = HashMap::new();
            let mut best_ratio = OrderedFloat(-1.0);
            for tag in axis_order.iter() {
                if !region.active_axes.contains(tag) {
                    continue;
                }
                let prev_peak = prev_region.axis_tents[tag].peak;
                let mut axis_region = region.axis_tents[tag];
                let ratio;
                match prev_peak.cmp(&axis_region.peak) {
                    Ordering::Less => {
                        ratio = (prev_peak - axis_region.peak).into_inner()
                            / (axis_region.min - axis_region.peak).into_inner();
                        axis_region.min = prev_peak;
                    }
                    Ordering::Greater => {
                        ratio = (prev_peak - axis_region.peak).into_inner()
                            / (axis_region.max - axis_region.peak).into_inner();
                        axis_region.max = prev_peak;
                    }
                    Ordering::Equal => continue, // can't split in this direction
                }
                if ratio > best_ratio {
                    axis_regions.clear();
                    best_ratio = ratio;
                }
                if ratio == best_ratio {
                    axis_regions.insert(*tag, axis_region);
                }
            }
            for (tag, tent) in axis_regions {
                region.insert(tag, tent);
            }
        }
        influence.push(region);
    }
    influence
}

/// Figure out the multipliers to use when applying for deltas from masters.
///
/// VariationModel::_computeDeltaWeights in Python.
/// <https://github.com/fonttools/fonttools/blob/2f1f5e5e7be331d960a0e30d537c2b4c70d89285/Lib/fontTools/varLib/models.py#L438>
fn delta_weights(
    locations: &[NormalizedLocation],
    influencers: &[VariationRegion],
) -> Vec<Vec<(usize, OrderedFloat<f64>)>> {
    let mut weights = Vec::new();
    for (loc_idx, location) in locations.iter().enumerate() {
        let loc_weights: Vec<_> = influencers[..loc_idx]
            .iter()
            .enumerate()
            .filter_map(|(inf_idx, influence)| {
                let scalar = influence.scalar_at(location);
                (scalar != ZERO).then_some((inf_idx, scalar))
            })
            .collect();
        trace!("delta weights {loc_idx} {loc_weights:?}");
        weights.push(loc_weights);
    }
    weights
}

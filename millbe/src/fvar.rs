//! Generates [fvar](https://learn.microsoft.com/en-us/typography/opentype/spec/fvar) and
//! [avar](https://learn.microsoft.com/en-us/typography/opentype/spec/avar) tables.

use log::{debug, trace};
use millcore::{
    coords::{CoordConverter, NormalizedCoord, UserLocation},
    types::{Axes, Axis},
};
use write_fonts::{
    tables::{
        avar::{Avar, AxisValueMap, SegmentMaps},
        fvar::{AxisInstanceArrays, Fvar, InstanceRecord, VariationAxisRecord},
    },
    types::{F2Dot14, Fixed},
};

use crate::{error::Error, name::NameBuilder};

const HIDDEN_AXIS: u16 = 0x0001;

/// A named instance of a variable font
#[derive(Debug, Clone)]
pub(crate) struct NamedInstance {
    pub(crate) subfamily: String,
    pub(crate) postscript_name: Option<String>,
    pub(crate) location: UserLocation,
}

/// Axes that actually vary, point axes excluded
fn variable_axes(axes: &Axes) -> impl Iterator<Item = &Axis> {
    axes.iter().filter(|a| !a.is_point())
}

pub(crate) fn build_fvar(
    axes: &Axes,
    instances: &[NamedInstance],
    names: &mut NameBuilder,
) -> Option<Fvar> {
    // Guard clause: don't produce fvar for a static font
    if variable_axes(axes).next().is_none() {
        trace!("Skip fvar; this is not a variable font");
        return None;
    }

    let axis_records = variable_axes(axes)
        .map(|axis| {
            let mut flags = 0;
            if axis.hidden {
                flags |= HIDDEN_AXIS;
            }
            VariationAxisRecord {
                axis_tag: axis.tag,
                min_value: Fixed::from_f64(axis.min.to_f64()),
                default_value: Fixed::from_f64(axis.default.to_f64()),
                max_value: Fixed::from_f64(axis.max.to_f64()),
                flags,
                axis_name_id: names.add_font_specific(&axis.name),
            }
        })
        .collect();

    // postscript names for every instance or for none
    let with_postscript_names = !instances.is_empty()
        && instances.iter().all(|i| i.postscript_name.is_some());
    let instance_records = instances
        .iter()
        .map(|instance| InstanceRecord {
            subfamily_name_id: names.add_font_specific(&instance.subfamily),
            flags: 0,
            coordinates: variable_axes(axes)
                .map(|axis| {
                    let user = instance.location.get(axis.tag).unwrap_or(axis.default);
                    Fixed::from_f64(user.to_f64())
                })
                .collect(),
            post_script_name_id: instance
                .postscript_name
                .as_deref()
                .filter(|_| with_postscript_names)
                .map(|name| names.add_font_specific(name)),
        })
        .collect();

    Some(Fvar {
        axis_instance_arrays: AxisInstanceArrays {
            axes: axis_records,
            instances: instance_records,
        }
        .into(),
    })
}

/// Return a default avar SegmentMaps containing the required {-1:-1, 0:0, 1:1} maps
fn default_segment_map() -> SegmentMaps {
    // Some implementations want the 3 required maps present even when the
    // default normalization for an axis was not modified, as fontTools does.
    SegmentMaps::new(vec![
        AxisValueMap::new(F2Dot14::from_f32(-1.0), F2Dot14::from_f32(-1.0)),
        AxisValueMap::new(F2Dot14::from_f32(0.0), F2Dot14::from_f32(0.0)),
        AxisValueMap::new(F2Dot14::from_f32(1.0), F2Dot14::from_f32(1.0)),
    ])
}

/// (default normalization, actual normalization) at each knot of the axis mapping
fn normalization_pairs(axis: &Axis) -> Result<Vec<(NormalizedCoord, NormalizedCoord)>, Error> {
    let default_converter = CoordConverter::unmapped(axis.min, axis.default, axis.max)?;

    let mut mappings: Vec<(NormalizedCoord, NormalizedCoord)> = axis
        .converter
        .iter()
        .map(|(user, _, norm)| (user.to_normalized(&default_converter), norm))
        .collect();

    // Conversion MUST have a default, but it might only extend in one direction from it.
    // For example, weight 400-700 with default 400 will have no entry for -1
    let (min, max) = mappings
        .iter()
        .map(|(n1, n2)| (n1.to_f64(), n2.to_f64()))
        .fold((0.0_f64, 0.0_f64), |(min, max), (a, b)| {
            (min.min(a).min(b), max.max(a).max(b))
        });
    if min != -1.0 {
        mappings.insert(0, (NormalizedCoord::new(-1.0), NormalizedCoord::new(-1.0)));
    }
    if max != 1.0 {
        mappings.push((NormalizedCoord::new(1.0), NormalizedCoord::new(1.0)));
    }
    Ok(mappings)
}

fn to_segment_map(axis: &Axis) -> Result<(SegmentMaps, bool), Error> {
    let mappings = normalization_pairs(axis)?;
    // All identity mappings are not interesting so we return the default mapping.
    if mappings.iter().all(|(k, v)| k == v) {
        return Ok((default_segment_map(), true));
    }
    let maps = mappings
        .iter()
        .map(|(default_norm, actual_norm)| {
            AxisValueMap::new(
                F2Dot14::from_f32(default_norm.to_f64() as f32),
                F2Dot14::from_f32(actual_norm.to_f64() as f32),
            )
        })
        .collect();
    Ok((SegmentMaps::new(maps), false))
}

/// avar, when any axis maps user coordinates other than linearly
pub(crate) fn build_avar(axes: &Axes) -> Result<Option<Avar>, Error> {
    let maps = variable_axes(axes)
        .map(to_segment_map)
        .collect::<Result<Vec<_>, _>>()?;
    // only when all the segment maps are uninteresting, we can omit avar
    if maps.iter().all(|(_, identity)| *identity) {
        debug!("Skip avar; every axis normalizes linearly");
        return Ok(None);
    }
    Ok(Some(Avar {
        axis_segment_maps: maps.into_iter().map(|(m, _)| m).collect(),
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use millcore::coords::{DesignCoord, UserCoord};
    use write_fonts::types::{NameId, Tag};

    use super::*;

    fn mapped_axis(mappings: Vec<(f64, f64)>, default: f64) -> Axis {
        let min = mappings.iter().map(|(u, _)| *u).fold(f64::INFINITY, f64::min);
        let max = mappings.iter().map(|(u, _)| *u).fold(f64::NEG_INFINITY, f64::max);
        Axis::new(
            "Weight",
            Tag::new(b"wght"),
            UserCoord::new(min),
            UserCoord::new(default),
            UserCoord::new(max),
            mappings
                .into_iter()
                .map(|(u, d)| (UserCoord::new(u), DesignCoord::new(d)))
                .collect(),
        )
        .unwrap()
    }

    fn round4(v: f32) -> f32 {
        (v * 10000.0).round() / 10000.0
    }

    fn dump(segmap: &SegmentMaps) -> Vec<(f32, f32)> {
        segmap
            .axis_value_maps
            .iter()
            .map(|av| (av.from_coordinate.to_f32(), av.to_coordinate.to_f32()))
            .map(|(from, to)| (round4(from), round4(to)))
            .collect()
    }

    fn names() -> NameBuilder {
        NameBuilder::default()
    }

    #[test]
    fn no_fvar_for_point_axes() {
        let axes = Axes::new(vec![Axis::for_test("wght", 400.0, 400.0, 400.0)]).unwrap();
        assert!(build_fvar(&axes, &[], &mut names()).is_none());
    }

    #[test]
    fn fvar_axes_and_instances() {
        let mut wdth = Axis::for_test("wdth", 75.0, 100.0, 100.0);
        wdth.hidden = true;
        let axes = Axes::new(vec![Axis::for_test("wght", 100.0, 400.0, 900.0), wdth]).unwrap();
        let instances = vec![
            NamedInstance {
                subfamily: "Thin".to_string(),
                postscript_name: Some("Test-Thin".to_string()),
                location: UserLocation::for_pos(&[("wght", 100.0)]),
            },
            NamedInstance {
                subfamily: "Black Condensed".to_string(),
                postscript_name: None,
                location: UserLocation::for_pos(&[("wght", 900.0), ("wdth", 75.0)]),
            },
        ];
        let mut names = names();
        let fvar = build_fvar(&axes, &instances, &mut names).unwrap();
        let arrays = &fvar.axis_instance_arrays;
        assert_eq!(2, arrays.axes.len());
        assert_eq!(HIDDEN_AXIS, arrays.axes[1].flags);
        assert_eq!(NameId::new(256), arrays.axes[0].axis_name_id);
        assert_eq!(
            vec![Fixed::from_f64(100.0), Fixed::from_f64(100.0)],
            arrays.instances[0].coordinates
        );
        assert_eq!(
            vec![Fixed::from_f64(900.0), Fixed::from_f64(75.0)],
            arrays.instances[1].coordinates
        );
        // not every instance has one so none get one
        assert!(arrays.instances.iter().all(|i| i.post_script_name_id.is_none()));
        assert_eq!(Some("Black Condensed"), names.get(259));
    }

    #[test]
    fn linear_axis_has_no_avar() {
        let axes = Axes::new(vec![Axis::for_test("wght", 100.0, 400.0, 900.0)]).unwrap();
        assert!(build_avar(&axes).unwrap().is_none());
    }

    #[test]
    fn up_to_three_points_does_nothing() {
        let axis = mapped_axis(vec![(100.0, -10.0), (400.0, 0.0), (700.0, 20.0)], 400.0);
        let (segmap, identity) = to_segment_map(&axis).unwrap();
        assert!(identity);
        assert_eq!(vec![(-1.0, -1.0), (0.0, 0.0), (1.0, 1.0)], dump(&segmap));
    }

    #[test]
    fn intermediate_knot_is_mapped() {
        let axis = mapped_axis(
            vec![(100.0, 20.0), (400.0, 80.0), (600.0, 120.0), (900.0, 200.0)],
            400.0,
        );
        let (segmap, identity) = to_segment_map(&axis).unwrap();
        assert!(!identity);
        // 600 is 0.4 of the way to 900 in user space but 0.3333 in design space
        assert_eq!(
            vec![(-1.0, -1.0), (0.0, 0.0), (0.4, 0.3333), (1.0, 1.0)],
            dump(&segmap)
        );
        let axes = Axes::new(vec![axis]).unwrap();
        assert_eq!(1, build_avar(&axes).unwrap().unwrap().axis_segment_maps.len());
    }
}

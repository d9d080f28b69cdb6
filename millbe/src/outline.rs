//! Outline format conversion: cubic to quadratic and contour reversal.
//!
//! Conversion works on one contour across any number of masters at once so
//! the results stay point compatible. With a single master it is just plain
//! conversion.

use std::collections::HashSet;

use kurbo::{cubics_to_quadratic_splines, BezPath, CubicBez, ParamCurve, PathEl, PathSeg, Point};
use log::trace;
use millcore::types::GlyphName;
use millir::font::{Font, Glyph};

use crate::error::Error;

/// Maximum error, relative to the em, of a converted curve
pub const DEFAULT_CONVERSION_ERROR: f64 = 0.001;

fn outline_error(glyph: &GlyphName, reason: impl Into<String>) -> Error {
    Error::Outline {
        glyph: glyph.clone(),
        reason: reason.into(),
    }
}

fn path_el_type(el: &PathEl) -> &'static str {
    match el {
        PathEl::MoveTo(..) => "M",
        PathEl::LineTo(..) => "L",
        PathEl::QuadTo(..) => "Q",
        PathEl::CurveTo(..) => "C",
        PathEl::ClosePath => "Z",
    }
}

/// Convert a contour, drawn once per master, to quadratics.
///
/// The masters' contours must have identical element types; the results do
/// too. accuracy is in font units.
pub fn quadratic_contours(
    glyph: &GlyphName,
    paths: &[&BezPath],
    accuracy: f64,
) -> Result<Vec<BezPath>, Error> {
    let Some(first) = paths.first() else {
        return Ok(Vec::new());
    };
    let num_elements = first.elements().len();
    if let Some(other) = paths.iter().find(|p| p.elements().len() != num_elements) {
        return Err(outline_error(
            glyph,
            format!(
                "contours have {} and {} elements",
                num_elements,
                other.elements().len()
            ),
        ));
    }

    let mut new_paths = vec![BezPath::new(); paths.len()];
    let mut subpath_start_pts = vec![Point::ZERO; paths.len()];
    let mut prev_el_end_pts = vec![Point::ZERO; paths.len()];

    for el_idx in 0..num_elements {
        let elements: Vec<_> = paths.iter().map(|p| p.elements()[el_idx]).collect();
        let el_type = path_el_type(&elements[0]);
        if let Some(other) = elements.iter().find(|el| path_el_type(el) != el_type) {
            return Err(outline_error(
                glyph,
                format!(
                    "element {el_idx} is {el_type} in one master and {} in another",
                    path_el_type(other)
                ),
            ));
        }

        if let PathEl::CurveTo(..) = elements[0] {
            let cubics: Vec<_> = elements
                .iter()
                .zip(&prev_el_end_pts)
                .filter_map(|(el, p0)| match el {
                    PathEl::CurveTo(p1, p2, p3) => Some(CubicBez {
                        p0: *p0,
                        p1: *p1,
                        p2: *p2,
                        p3: *p3,
                    }),
                    _ => None,
                })
                .collect();

            let Some(quad_splines) = cubics_to_quadratic_splines(&cubics, accuracy) else {
                return Err(outline_error(
                    glyph,
                    format!("unable to convert {cubics:?} to quadratic within {accuracy}"),
                ));
            };
            if quad_splines.len() != new_paths.len() {
                return Err(outline_error(
                    glyph,
                    format!(
                        "needed {} splines, got {}",
                        new_paths.len(),
                        quad_splines.len()
                    ),
                ));
            }
            for (bez, quad_spline) in new_paths.iter_mut().zip(&quad_splines) {
                for quad in quad_spline.to_quads() {
                    bez.quad_to(quad.p1, quad.p2);
                }
            }
        } else {
            for (bez, el) in new_paths.iter_mut().zip(&elements) {
                bez.push(*el);
            }
        }

        for ((el, prev_end), start) in elements
            .iter()
            .zip(prev_el_end_pts.iter_mut())
            .zip(subpath_start_pts.iter_mut())
        {
            *prev_end = match el {
                PathEl::MoveTo(p) => {
                    *start = *p;
                    *p
                }
                PathEl::LineTo(p) | PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => *p,
                PathEl::ClosePath => *start,
            };
        }
    }

    Ok(new_paths)
}

/// Reverse the direction of a contour, keeping its start point
pub fn reverse_contour(path: &BezPath) -> BezPath {
    let closed = path.elements().last() == Some(&PathEl::ClosePath);
    let segments: Vec<PathSeg> = path.segments().collect();
    let mut reversed = BezPath::new();
    let Some(start) = path.elements().first().and_then(|el| match el {
        PathEl::MoveTo(p) => Some(*p),
        _ => None,
    }) else {
        return path.clone();
    };

    if closed {
        reversed.move_to(start);
    } else {
        match segments.last() {
            Some(seg) => reversed.move_to(seg.end()),
            None => reversed.move_to(start),
        }
    }
    for (idx, seg) in segments.iter().rev().enumerate() {
        // the closing line is implied by closepath
        if closed && idx == segments.len() - 1 && matches!(seg, PathSeg::Line(..)) {
            break;
        }
        match seg.reverse() {
            PathSeg::Line(line) => reversed.line_to(line.p1),
            PathSeg::Quad(quad) => reversed.quad_to(quad.p1, quad.p2),
            PathSeg::Cubic(cubic) => reversed.curve_to(cubic.p1, cubic.p2, cubic.p3),
        }
    }
    if closed {
        reversed.close_path();
    }
    reversed
}

/// Convert every contour of a glyph to quadratic, optionally reversing.
///
/// Returns true if any contour was touched.
pub fn convert_glyph(glyph: &mut Glyph, accuracy: f64, reverse_direction: bool) -> Result<bool, Error> {
    if glyph.contours.is_empty() {
        return Ok(false);
    }
    let mut contours = Vec::with_capacity(glyph.contours.len());
    for contour in glyph.contours.iter() {
        let mut converted = quadratic_contours(&glyph.name, &[contour], accuracy)?;
        let converted = converted.pop().unwrap_or_default();
        contours.push(if reverse_direction {
            reverse_contour(&converted)
        } else {
            converted
        });
    }
    glyph.contours = contours;
    Ok(true)
}

/// Convert the default layer of several masters compatibly.
///
/// Glyphs are matched by name; a glyph missing from some masters is converted
/// across the masters that have it. Returns the number of glyphs converted.
pub fn convert_compatible(
    fonts: &mut [Font],
    conversion_error: f64,
    reverse_direction: bool,
) -> Result<usize, Error> {
    let Some(first) = fonts.first() else {
        return Ok(0);
    };
    let upem = first.info.units_per_em();
    let accuracy = conversion_error * upem;
    // every glyph any master has, first seen first
    let mut seen = HashSet::new();
    let names: Vec<GlyphName> = fonts
        .iter()
        .flat_map(|f| f.glyph_order())
        .filter(|name| seen.insert(*name))
        .cloned()
        .collect();

    let mut converted = 0;
    for name in names {
        let holders: Vec<usize> = fonts
            .iter()
            .enumerate()
            .filter(|(_, f)| f.glyphs.contains_key(&name))
            .map(|(i, _)| i)
            .collect();
        let num_contours = fonts[holders[0]].glyphs[&name].contours.len();
        if num_contours == 0 {
            continue;
        }
        if let Some(idx) = holders
            .iter()
            .find(|i| fonts[**i].glyphs[&name].contours.len() != num_contours)
        {
            return Err(outline_error(
                &name,
                format!(
                    "{} contours in one master, {} in master {idx}",
                    num_contours,
                    fonts[*idx].glyphs[&name].contours.len()
                ),
            ));
        }
        trace!("Convert '{name}' to quadratic across {} masters", holders.len());

        let mut per_master: Vec<Vec<BezPath>> = vec![Vec::with_capacity(num_contours); holders.len()];
        for contour_idx in 0..num_contours {
            let paths: Vec<&BezPath> = holders
                .iter()
                .map(|i| &fonts[*i].glyphs[&name].contours[contour_idx])
                .collect();
            let quads = quadratic_contours(&name, &paths, accuracy)?;
            for (contours, quad) in per_master.iter_mut().zip(quads) {
                contours.push(if reverse_direction {
                    reverse_contour(&quad)
                } else {
                    quad
                });
            }
        }
        for (i, contours) in holders.iter().zip(per_master) {
            if let Some(glyph) = fonts[*i].glyphs.get_mut(&name) {
                glyph.contours = contours;
            }
        }
        converted += 1;
    }
    Ok(converted)
}

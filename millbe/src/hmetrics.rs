//! Generates the [hmtx](https://learn.microsoft.com/en-us/typography/opentype/spec/hmtx) and
//! [hhea](https://learn.microsoft.com/en-us/typography/opentype/spec/hhea) tables, and gathers
//! the limits [maxp](crate::maxp) needs along the way.

use std::{
    cmp::{max, min},
    collections::{HashMap, HashSet},
};

use millir::font::FontInfo;
use write_fonts::{
    tables::{
        glyf::{Contour, Glyph},
        hhea::Hhea,
        hmtx::{Hmtx, LongMetric},
    },
    types::{FWord, GlyphId16, UfWord},
    OtRound,
};

use crate::{error::Error, glyphs::glyph_bbox};

/// Font-wide, or global, limits
#[derive(Debug, Default)]
pub(crate) struct FontLimits {
    min_left_side_bearing: Option<i16>,
    min_right_side_bearing: Option<i16>,
    x_max_extent: Option<i16>,
    advance_width_max: u16,
    pub(crate) max_points: u16,
    pub(crate) max_contours: u16,
    pub(crate) max_component_elements: u16,
    glyph_info: HashMap<GlyphId16, GlyphInfo>,
}

#[derive(Debug)]
struct GlyphInfo {
    /// For simple glyphs always present. For composites, set by [`FontLimits::composite_limits`]
    limits: Option<GlyphLimits>,
    components: Option<HashSet<GlyphId16>>,
}

/// Limits of a single glyph
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub(crate) struct GlyphLimits {
    pub(crate) max_points: u16,
    pub(crate) max_contours: u16,
    pub(crate) max_depth: u16,
}

impl GlyphLimits {
    fn max(&self, other: GlyphLimits) -> GlyphLimits {
        GlyphLimits {
            max_points: self.max_points.max(other.max_points),
            max_contours: self.max_contours.max(other.max_contours),
            max_depth: self.max_depth.max(other.max_depth),
        }
    }
}

impl FontLimits {
    fn update(&mut self, id: GlyphId16, advance: u16, glyph: &Glyph) {
        // min side bearings are only for non-empty glyphs
        if let Some(bbox) = glyph_bbox(glyph) {
            let left_side_bearing = bbox.x_min;
            let right_side_bearing: i16 = match advance as i32 - bbox.x_max as i32 {
                value if value < i16::MIN as i32 => i16::MIN,
                value if value > i16::MAX as i32 => i16::MAX,
                value => value as i16,
            };
            self.min_left_side_bearing = self
                .min_left_side_bearing
                .map(|v| min(v, left_side_bearing))
                .or(Some(left_side_bearing));
            self.min_right_side_bearing = self
                .min_right_side_bearing
                .map(|v| min(v, right_side_bearing))
                .or(Some(right_side_bearing));
            self.x_max_extent = self
                .x_max_extent
                .map(|v| max(v, bbox.x_max))
                .or(Some(bbox.x_max));
        }
        self.advance_width_max = max(self.advance_width_max, advance);

        match glyph {
            Glyph::Simple(simple) => {
                let num_points = simple.contours.iter().map(Contour::len).sum::<usize>() as u16;
                let num_contours = simple.contours.len() as u16;
                self.max_points = max(self.max_points, num_points);
                self.max_contours = max(self.max_contours, num_contours);
                self.glyph_info.insert(
                    id,
                    GlyphInfo {
                        limits: Some(GlyphLimits {
                            max_points: num_points,
                            max_contours: num_contours,
                            max_depth: 0,
                        }),
                        components: None,
                    },
                );
            }
            Glyph::Composite(composite) => {
                let num_components = composite.components().len() as u16;
                self.max_component_elements = max(self.max_component_elements, num_components);
                let components = Some(composite.components().iter().map(|c| c.glyph).collect());
                self.glyph_info.insert(
                    id,
                    GlyphInfo {
                        limits: None,
                        components,
                    },
                );
            }
            Glyph::Empty => {
                self.glyph_info.insert(
                    id,
                    GlyphInfo {
                        limits: Some(GlyphLimits::default()),
                        components: None,
                    },
                );
            }
        };
    }

    /// The totals of composites, summed through nested components
    pub(crate) fn composite_limits(&mut self) -> GlyphLimits {
        let mut pending: Vec<GlyphId16> = self
            .glyph_info
            .iter()
            .filter(|(_, info)| info.components.is_some())
            .map(|(gid, _)| *gid)
            .collect();
        let mut overall_max = GlyphLimits::default();
        while !pending.is_empty() {
            let size_before = pending.len();
            let mut resolved = Vec::new();
            pending.retain(|gid| {
                let Some(components) = self.glyph_info.get(gid).and_then(|i| i.components.as_ref())
                else {
                    return false;
                };
                // If we contain components whose limits are not yet known we can't proceed
                let known: Option<Vec<GlyphLimits>> = components
                    .iter()
                    .map(|c| self.glyph_info.get(c).and_then(|i| i.limits))
                    .collect();
                let Some(known) = known else {
                    return true;
                };
                let limit = known.iter().fold(GlyphLimits::default(), |acc, e| GlyphLimits {
                    max_points: acc.max_points.saturating_add(e.max_points),
                    max_contours: acc.max_contours.saturating_add(e.max_contours),
                    max_depth: acc.max_depth.max(e.max_depth + 1),
                });
                resolved.push((*gid, limit));
                false
            });
            for (gid, limit) in resolved {
                if let Some(info) = self.glyph_info.get_mut(&gid) {
                    info.limits = Some(limit);
                }
                overall_max = overall_max.max(limit);
            }
            // a component we know nothing about never resolves
            if pending.len() == size_before {
                break;
            }
        }
        overall_max
    }
}

fn info_or(info: &FontInfo, key: &str, default: f64) -> f64 {
    info.get_f64(key).unwrap_or(default)
}

/// The vertical metrics every table agrees on, with the defaults a font without them gets
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VerticalMetrics {
    pub(crate) ascender: f64,
    pub(crate) descender: f64,
    pub(crate) typo_line_gap: f64,
    pub(crate) hhea_ascender: f64,
    pub(crate) hhea_descender: f64,
    pub(crate) hhea_line_gap: f64,
    pub(crate) cap_height: f64,
    pub(crate) x_height: f64,
}

impl VerticalMetrics {
    pub(crate) fn new(info: &FontInfo) -> VerticalMetrics {
        let upem = info.units_per_em();
        let ascender = info_or(info, "ascender", upem * 0.75);
        let descender = info_or(info, "descender", -upem * 0.25);
        let typo_line_gap = info_or(
            info,
            "openTypeOS2TypoLineGap",
            (upem * 1.2 - ascender + descender).max(0.0),
        );
        VerticalMetrics {
            ascender,
            descender,
            typo_line_gap,
            hhea_ascender: info_or(info, "openTypeHheaAscender", ascender + typo_line_gap),
            hhea_descender: info_or(info, "openTypeHheaDescender", descender),
            hhea_line_gap: info_or(info, "openTypeHheaLineGap", 0.0),
            cap_height: info_or(info, "capHeight", upem * 0.7),
            x_height: info_or(info, "xHeight", upem * 0.5),
        }
    }
}

pub(crate) struct HorizontalMetrics {
    pub(crate) hhea: Hhea,
    pub(crate) hmtx: Hmtx,
    pub(crate) limits: FontLimits,
}

/// Build hmtx and hhea for glyphs in glyph order with their advances
pub(crate) fn build_hmetrics(
    info: &FontInfo,
    glyphs: &[Glyph],
    advances: &[f64],
) -> Result<HorizontalMetrics, Error> {
    let mut limits = FontLimits::default();
    let mut long_metrics: Vec<LongMetric> = glyphs
        .iter()
        .zip(advances.iter())
        .enumerate()
        .map(|(gid, (glyph, advance))| {
            let advance: u16 = advance.max(0.0).ot_round();
            limits.update(GlyphId16::new(gid as u16), advance, glyph);
            LongMetric {
                advance,
                side_bearing: glyph_bbox(glyph).map(|b| b.x_min).unwrap_or_default(),
            }
        })
        .collect();

    // If there's a run at the end with matching advances we can save some bytes
    let num_lsb_only = match long_metrics.last() {
        Some(last) => {
            let last_advance = last.advance;
            let lsb_run = long_metrics
                .iter()
                .rev()
                .take_while(|m| m.advance == last_advance)
                .count();
            // Carve 1 less than the length of the run off so the last metric retained has the advance
            // that repeats
            lsb_run - 1
        }
        None => 0,
    };
    let lsbs = long_metrics
        .split_off(long_metrics.len() - num_lsb_only)
        .into_iter()
        .map(|metric| metric.side_bearing)
        .collect();

    let metrics = VerticalMetrics::new(info);
    // an italic font slopes its caret with the italic angle
    let italic_angle = info_or(info, "italicAngle", 0.0);
    let caret_slope_rise = match info.get_f64("openTypeHheaCaretSlopeRise") {
        Some(rise) => rise,
        None if italic_angle != 0.0 => info.units_per_em(),
        None => 1.0,
    };
    let caret_slope_run = match info.get_f64("openTypeHheaCaretSlopeRun") {
        Some(run) => run,
        None => (-italic_angle).to_radians().tan() * caret_slope_rise,
    };
    let number_of_h_metrics = long_metrics.len().try_into().map_err(|_| Error::Table {
        table: "hhea".to_string(),
        reason: format!("{} long metrics is too many", long_metrics.len()),
    })?;
    let hhea = Hhea {
        ascender: FWord::new(metrics.hhea_ascender.ot_round()),
        descender: FWord::new(metrics.hhea_descender.ot_round()),
        line_gap: FWord::new(metrics.hhea_line_gap.ot_round()),
        advance_width_max: UfWord::new(limits.advance_width_max),
        min_left_side_bearing: FWord::new(limits.min_left_side_bearing.unwrap_or_default()),
        min_right_side_bearing: FWord::new(limits.min_right_side_bearing.unwrap_or_default()),
        x_max_extent: FWord::new(limits.x_max_extent.unwrap_or_default()),
        caret_slope_rise: caret_slope_rise.ot_round(),
        caret_slope_run: caret_slope_run.ot_round(),
        caret_offset: info_or(info, "openTypeHheaCaretOffset", 0.0).ot_round(),
        number_of_h_metrics,
    };

    Ok(HorizontalMetrics {
        hhea,
        hmtx: Hmtx::new(long_metrics, lsbs),
        limits,
    })
}

#[cfg(test)]
mod tests {
    use kurbo::BezPath;
    use write_fonts::tables::glyf::SimpleGlyph;

    use super::*;

    fn simple(svg: &str) -> Glyph {
        Glyph::Simple(SimpleGlyph::from_bezpath(&BezPath::from_svg(svg).unwrap()).unwrap())
    }

    // advance 0, bbox (-437,611) => (-334, 715)
    #[test]
    fn negative_xmax_does_not_crash() {
        let mut limits = FontLimits::default();
        limits.update(
            GlyphId16::new(0),
            0,
            &simple("M-437,611 L-334,715 L-334,611 Z"),
        );
        assert_eq!(
            (Some(-437), Some(334)),
            (limits.min_left_side_bearing, limits.min_right_side_bearing)
        );
    }

    #[test]
    fn trailing_run_becomes_lsbs() {
        let glyphs = vec![
            Glyph::Empty,
            simple("M10,0 L100,0 L100,100 Z"),
            simple("M20,0 L100,0 L100,100 Z"),
            Glyph::Empty,
        ];
        let metrics =
            build_hmetrics(&FontInfo::default(), &glyphs, &[500.0, 600.0, 600.0, 600.0]).unwrap();
        assert_eq!(2, metrics.hhea.number_of_h_metrics);
        assert_eq!(vec![20, 0], metrics.hmtx.left_side_bearings);
        assert_eq!(600, metrics.hhea.advance_width_max.to_u16());
        assert_eq!(10, metrics.hhea.min_left_side_bearing.to_i16());
        assert_eq!(500, metrics.hhea.min_right_side_bearing.to_i16());
        assert_eq!(100, metrics.hhea.x_max_extent.to_i16());
    }

    #[test]
    fn default_vertical_metrics() {
        let metrics = VerticalMetrics::new(&FontInfo::default());
        assert_eq!(750.0, metrics.ascender);
        assert_eq!(-250.0, metrics.descender);
        assert_eq!(200.0, metrics.typo_line_gap);
        assert_eq!(950.0, metrics.hhea_ascender);
        assert_eq!(-250.0, metrics.hhea_descender);
        assert_eq!(0.0, metrics.hhea_line_gap);
        assert_eq!(700.0, metrics.cap_height);
        assert_eq!(500.0, metrics.x_height);
    }

    #[test]
    fn upright_caret() {
        let metrics = build_hmetrics(&FontInfo::default(), &[Glyph::Empty], &[500.0]).unwrap();
        assert_eq!((1, 0), (metrics.hhea.caret_slope_rise, metrics.hhea.caret_slope_run));
    }

    #[test]
    fn caret_follows_italic_angle() {
        let mut info = FontInfo::default();
        info.set("italicAngle", plist::Value::Real(-10.0));
        let metrics = build_hmetrics(&info, &[Glyph::Empty], &[500.0]).unwrap();
        assert_eq!(1000, metrics.hhea.caret_slope_rise);
        assert_eq!(176, metrics.hhea.caret_slope_run);
    }

    #[test]
    fn nested_composite_limits() {
        let mut limits = FontLimits::default();
        limits.update(GlyphId16::new(0), 0, &simple("M0,0 L100,0 L100,100 Z"));
        limits.glyph_info.insert(
            GlyphId16::new(1),
            GlyphInfo {
                limits: None,
                components: Some(HashSet::from([GlyphId16::new(0)])),
            },
        );
        limits.glyph_info.insert(
            GlyphId16::new(2),
            GlyphInfo {
                limits: None,
                components: Some(HashSet::from([GlyphId16::new(0), GlyphId16::new(1)])),
            },
        );
        assert_eq!(
            GlyphLimits {
                max_points: 6,
                max_contours: 2,
                max_depth: 2,
            },
            limits.composite_limits()
        );
    }
}

//! Static instances from a designspace.
//!
//! Every value of an instance is a weighted sum of the values of the
//! masters that define it. Weights come from a [`VariationModel`] over the
//! contributing masters' normalized locations so an instance agrees with a
//! variable font built from the same masters.
//!
//! Two engines implement [`InstanceGenerator`]: [`MinimalEngine`] refuses
//! to extrapolate or to interpolate anisotropically, [`ExtendedEngine`]
//! does both.

use std::collections::{BTreeMap, HashMap, HashSet};

use kurbo::{Affine, BezPath, PathEl, Point};
use log::{debug, trace, warn};
use millcore::{
    coords::{DesignLocation, NormalizedLocation, UserCoord},
    piecewise_linear_map::{OutOfRange, PiecewiseLinearMap},
    types::{GlyphName, Tag},
    variations::VariationModel,
};
use ordered_float::OrderedFloat;

use crate::{
    designspace::{DesignSpaceModel, Instance},
    error::Error,
    font::{ot_round, Anchor, Component, Font, FontInfo, Glyph, KernPair},
    rules::apply_rules,
};

/// Info values that interpolate as numbers
const NUMERIC_INFO_KEYS: &[&str] = &[
    "unitsPerEm",
    "descender",
    "xHeight",
    "capHeight",
    "ascender",
    "italicAngle",
    "openTypeHheaAscender",
    "openTypeHheaDescender",
    "openTypeHheaLineGap",
    "openTypeHheaCaretSlopeRise",
    "openTypeHheaCaretSlopeRun",
    "openTypeHheaCaretOffset",
    "openTypeOS2WidthClass",
    "openTypeOS2WeightClass",
    "openTypeOS2TypoAscender",
    "openTypeOS2TypoDescender",
    "openTypeOS2TypoLineGap",
    "openTypeOS2WinAscent",
    "openTypeOS2WinDescent",
    "openTypeOS2SubscriptXSize",
    "openTypeOS2SubscriptYSize",
    "openTypeOS2SubscriptXOffset",
    "openTypeOS2SubscriptYOffset",
    "openTypeOS2SuperscriptXSize",
    "openTypeOS2SuperscriptYSize",
    "openTypeOS2SuperscriptXOffset",
    "openTypeOS2SuperscriptYOffset",
    "openTypeOS2StrikeoutSize",
    "openTypeOS2StrikeoutPosition",
    "openTypeVheaVertTypoAscender",
    "openTypeVheaVertTypoDescender",
    "openTypeVheaVertTypoLineGap",
    "openTypeVheaCaretSlopeRise",
    "openTypeVheaCaretSlopeRun",
    "openTypeVheaCaretOffset",
    "postscriptSlantAngle",
    "postscriptUnderlineThickness",
    "postscriptUnderlinePosition",
    "postscriptBlueFuzz",
    "postscriptBlueShift",
    "postscriptBlueScale",
    "postscriptDefaultWidthX",
    "postscriptNominalWidthX",
];

/// Info values that interpolate as lists of numbers of equal length
const NUMERIC_LIST_INFO_KEYS: &[&str] = &[
    "postscriptBlueValues",
    "postscriptOtherBlues",
    "postscriptFamilyBlues",
    "postscriptFamilyOtherBlues",
    "postscriptStemSnapH",
    "postscriptStemSnapV",
];

/// Info values every instance copies from the default source
pub const INFO_KEYS_TO_COPY: &[&str] = &[
    "copyright",
    "familyName",
    "note",
    "openTypeGaspRangeRecords",
    "openTypeHeadCreated",
    "openTypeHeadFlags",
    "openTypeNameDescription",
    "openTypeNameDesigner",
    "openTypeNameDesignerURL",
    "openTypeNameLicense",
    "openTypeNameLicenseURL",
    "openTypeNameManufacturer",
    "openTypeNameManufacturerURL",
    "openTypeNameRecords",
    "openTypeNameSampleText",
    "openTypeNameVersion",
    "openTypeOS2CodePageRanges",
    "openTypeOS2FamilyClass",
    "openTypeOS2Selection",
    "openTypeOS2Type",
    "openTypeOS2UnicodeRanges",
    "openTypeOS2VendorID",
    "postscriptDefaultCharacter",
    "postscriptForceBold",
    "postscriptIsFixedPitch",
    "postscriptWindowsCharacterSet",
    "trademark",
    "versionMajor",
    "versionMinor",
    "woffMajorVersion",
    "woffMetadataCopyright",
    "woffMetadataCredits",
    "woffMetadataDescription",
    "woffMetadataExtensions",
    "woffMetadataLicense",
    "woffMetadataLicensee",
    "woffMetadataTrademark",
    "woffMetadataUniqueID",
    "woffMetadataVendor",
    "woffMinorVersion",
];

pub const DESIGNSPACE_LOCATION: &str = "designspace.location";

/// Produces a static font for an instance of a designspace.
pub trait InstanceGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, model: &DesignSpaceModel, instance: &Instance) -> Result<Font, Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Engine {
    #[default]
    Minimal,
    Extended,
}

impl Engine {
    pub fn generator(self, options: InstanceOptions) -> Box<dyn InstanceGenerator> {
        match self {
            Engine::Minimal => Box::new(MinimalEngine { options }),
            Engine::Extended => Box::new(ExtendedEngine { options }),
        }
    }

    /// How the engine treats locations beyond the axis ranges
    pub fn out_of_range(self) -> OutOfRange {
        match self {
            Engine::Minimal => OutOfRange::Clamp,
            Engine::Extended => OutOfRange::Extrapolate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Round geometry to integers once interpolated
    pub round_geometry: bool,
    /// Copy a master's data outright when the instance sits on it
    pub reuse_masters: bool,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        InstanceOptions {
            round_geometry: true,
            reuse_masters: true,
        }
    }
}

/// Interpolates within the masters' bounds, isotropically.
#[derive(Debug, Default)]
pub struct MinimalEngine {
    options: InstanceOptions,
}

impl MinimalEngine {
    pub fn new(options: InstanceOptions) -> Self {
        MinimalEngine { options }
    }
}

impl InstanceGenerator for MinimalEngine {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn generate(&self, model: &DesignSpaceModel, instance: &Instance) -> Result<Font, Error> {
        let unsupported = |reason: String| Error::UnsupportedInterpolation {
            instance: instance.display_name(),
            reason,
        };
        if instance.is_anisotropic() {
            return Err(unsupported(format!(
                "anisotropic location x {:?} y {:?}",
                instance.location, instance.y_location
            )));
        }
        let weighting = Weighting::new(model, instance, OutOfRange::Extrapolate, false)?;
        if let Some((tag, value, (min, max))) = weighting.outside_hull() {
            return Err(unsupported(format!(
                "{tag} at normalized {value} is outside the masters' range {min}..={max}, \
                 extrapolation needs the extended engine"
            )));
        }
        build_instance(model, instance, weighting, self.options)
    }
}

/// Interpolates anywhere, including beyond the masters and anisotropically.
#[derive(Debug, Default)]
pub struct ExtendedEngine {
    options: InstanceOptions,
}

impl ExtendedEngine {
    pub fn new(options: InstanceOptions) -> Self {
        ExtendedEngine { options }
    }
}

impl InstanceGenerator for ExtendedEngine {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn generate(&self, model: &DesignSpaceModel, instance: &Instance) -> Result<Font, Error> {
        let weighting = Weighting::new(model, instance, OutOfRange::Extrapolate, true)?;
        build_instance(model, instance, weighting, self.options)
    }
}

/// Weights of contributing sources, by source index
#[derive(Debug, Clone, PartialEq)]
struct SourceWeights {
    x: Vec<(usize, f64)>,
    y: Vec<(usize, f64)>,
}

/// Computes and caches weights for each distinct set of contributing sources.
struct Weighting<'a> {
    model: &'a DesignSpaceModel,
    axis_order: Vec<Tag>,
    /// Per source, fit to axis_order
    source_locations: Vec<NormalizedLocation>,
    x: NormalizedLocation,
    y: NormalizedLocation,
    extrapolate: bool,
    cache: HashMap<Vec<usize>, SourceWeights>,
}

impl<'a> Weighting<'a> {
    fn new(
        model: &'a DesignSpaceModel,
        instance: &Instance,
        out_of_range: OutOfRange,
        extrapolate: bool,
    ) -> Result<Weighting<'a>, Error> {
        let axis_order = model.axes().axis_order();
        let normalize = |loc: &DesignLocation| -> Result<NormalizedLocation, Error> {
            let mut loc = model.normalized_location(loc, out_of_range)?;
            loc.fit_to_axes(&axis_order);
            Ok(loc)
        };
        let source_locations = model
            .sources()
            .iter()
            .map(|s| normalize(&s.location))
            .collect::<Result<Vec<_>, _>>()?;
        let x = normalize(&instance.location)?;
        let y = match &instance.y_location {
            Some(y) => normalize(y)?,
            None => x.clone(),
        };
        trace!("'{}' normalizes to x {x:?} y {y:?}", instance.display_name());
        Ok(Weighting {
            model,
            axis_order,
            source_locations,
            x,
            y,
            extrapolate,
            cache: Default::default(),
        })
    }

    /// The first axis on which the instance lies beyond every source
    fn outside_hull(&self) -> Option<(Tag, f64, (f64, f64))> {
        let locations: HashSet<_> = self.source_locations.iter().cloned().collect();
        let hull = VariationModel::new(locations, self.axis_order.clone()).hull();
        self.axis_order.iter().find_map(|tag| {
            let (min, max) = hull.get(tag).copied().unwrap_or_default();
            [&self.x, &self.y]
                .into_iter()
                .filter_map(|loc| loc.get(*tag))
                .map(|v| v.to_f64())
                .find(|v| *v < min || *v > max)
                .map(|v| (*tag, v, (min, max)))
        })
    }

    /// The source the instance sits exactly on, if any
    fn master_at_instance(&self) -> Option<usize> {
        if self.x != self.y {
            return None;
        }
        self.model
            .sources()
            .iter()
            .zip(self.source_locations.iter())
            .position(|(s, loc)| !s.is_layer() && *loc == self.x)
    }

    fn weights(&mut self, sources: &[usize]) -> &SourceWeights {
        if !self.cache.contains_key(sources) {
            let weights = self.compute(sources);
            self.cache.insert(sources.to_vec(), weights);
        }
        &self.cache[sources]
    }

    fn compute(&self, sources: &[usize]) -> SourceWeights {
        let locations: HashSet<_> = sources
            .iter()
            .map(|idx| self.source_locations[*idx].clone())
            .collect();
        let variation_model = if self.extrapolate {
            VariationModel::new_extrapolating(locations, self.axis_order.clone())
        } else {
            VariationModel::new(locations, self.axis_order.clone())
        };
        // model locations are sorted by influence, map them back to sources
        let by_source = |weights: Vec<f64>| -> Vec<(usize, f64)> {
            variation_model
                .locations()
                .zip(weights)
                .filter_map(|(loc, weight)| {
                    sources
                        .iter()
                        .find(|idx| self.source_locations[**idx] == *loc)
                        .map(|idx| (*idx, weight))
                })
                .collect()
        };
        let x = by_source(variation_model.master_weights(&self.x));
        let y = if self.y == self.x {
            x.clone()
        } else {
            by_source(variation_model.master_weights(&self.y))
        };
        trace!("weights for sources {sources:?}: x {x:?} y {y:?}");
        SourceWeights { x, y }
    }
}

fn build_instance(
    model: &DesignSpaceModel,
    instance: &Instance,
    mut weighting: Weighting<'_>,
    options: InstanceOptions,
) -> Result<Font, Error> {
    let name = instance.display_name();
    let default_idx = model.default_source_index();
    let default_font = model.default_font();
    let location = model
        .resolver(OutOfRange::Extrapolate)
        .complete(&instance.location)?;
    let reuse = if options.reuse_masters {
        weighting.master_at_instance()
    } else {
        None
    };
    if let Some(idx) = reuse {
        debug!(
            "'{name}' sits on source '{}', reusing it",
            model.sources()[idx].name
        );
    }

    let masters: Vec<usize> = model
        .sources()
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_layer())
        .map(|(idx, _)| idx)
        .collect();

    let mut font = Font::new();

    // kerning and info come from whole fonts only
    let (kerning, info) = match reuse {
        Some(idx) => {
            let source = &model.sources()[idx].font;
            (source.kerning.clone(), source.info.clone())
        }
        None => {
            let weights = weighting.weights(&masters).x.clone();
            let fonts: Vec<_> = weights
                .iter()
                .map(|(idx, w)| (&*model.sources()[*idx].font, *w))
                .collect();
            (interpolate_kerning(&fonts), interpolate_info(&fonts, &default_font.info))
        }
    };
    font.kerning = kerning;
    font.info = info;
    finish_info(model, instance, &location, &mut font.info)?;

    for source in model.masters() {
        if !source.font.groups.is_empty() && source.font.groups != default_font.groups {
            warn!(
                "Source '{}' has different groups than the default source, using the default's",
                source.name
            );
        }
    }
    font.groups = default_font.groups.clone();
    font.features = default_font.features.clone();

    let skip_export = model.skip_export_glyphs();
    font.lib = default_font.lib.clone();
    font.set_skip_export_glyphs(skip_export.iter());
    font.lib.insert(
        DESIGNSPACE_LOCATION.to_string(),
        plist::Value::Array(
            location
                .iter()
                .map(|(tag, coord)| {
                    let name = model
                        .axes()
                        .get(tag)
                        .map(|a| a.name.clone())
                        .unwrap_or_else(|| tag.to_string());
                    plist::Value::Array(vec![name.into(), coord.to_f64().into()])
                })
                .collect(),
        ),
    );

    for (glyph_name, default_glyph) in default_font.glyphs.iter() {
        let reused = reuse.and_then(|idx| {
            model.sources()[idx]
                .glyphs()
                .and_then(|glyphs| glyphs.get(glyph_name))
        });
        let result = match reused {
            Some(glyph) => Ok(glyph.clone()),
            None => {
                let contributors = glyph_sources(model, glyph_name, default_idx);
                let weights = weighting.weights(&contributors);
                interpolate_glyph(model, glyph_name, weights)
            }
        };
        let mut glyph = match result {
            Ok(glyph) => glyph,
            Err(reason) if skip_export.contains(glyph_name) => {
                warn!(
                    "'{name}': failed to interpolate non-export glyph '{glyph_name}', \
                     it will be left empty: {reason}"
                );
                Glyph::new(glyph_name.clone()).with_width(default_glyph.width)
            }
            Err(reason) => {
                return Err(Error::GlyphInterpolation {
                    glyph: glyph_name.clone(),
                    reason: format!("instance '{name}': {reason}"),
                })
            }
        };
        glyph.name = glyph_name.clone();
        glyph.codepoints = default_glyph.codepoints.clone();
        glyph.lib = default_glyph.lib.clone();
        font.add_glyph(glyph);
    }

    if options.round_geometry {
        font.round_geometry();
    }

    let swaps = apply_rules(
        model.rules(),
        &location,
        &model.default_location(),
        &mut font,
    );
    if !swaps.is_empty() {
        debug!("'{name}' rules swapped {swaps:?}");
    }
    Ok(font)
}

/// Indices of the sources that define a glyph.
///
/// Empty glyphs are dropped when the default's isn't, some sources leave
/// a glyph empty rather than omit it.
fn glyph_sources(model: &DesignSpaceModel, glyph_name: &GlyphName, default_idx: usize) -> Vec<usize> {
    let with_glyph: Vec<(usize, &Glyph)> = model
        .sources()
        .iter()
        .enumerate()
        .filter_map(|(idx, s)| {
            s.glyphs()
                .and_then(|g| g.get(glyph_name))
                .map(|glyph| (idx, glyph))
        })
        .collect();
    let default_is_empty = with_glyph
        .iter()
        .any(|(idx, g)| *idx == default_idx && g.is_empty());
    with_glyph
        .into_iter()
        .filter(|(_, g)| default_is_empty || !g.is_empty())
        .map(|(idx, _)| idx)
        .collect()
}

fn source_glyph<'a>(model: &'a DesignSpaceModel, idx: usize, name: &GlyphName) -> Option<&'a Glyph> {
    model.sources().get(idx)?.glyphs()?.get(name)
}

fn weighted_sum(values: impl Iterator<Item = (f64, f64)>) -> f64 {
    values.map(|(value, weight)| value * weight).sum()
}

fn interpolate_glyph(
    model: &DesignSpaceModel,
    glyph_name: &GlyphName,
    weights: &SourceWeights,
) -> Result<Glyph, String> {
    let glyphs_x = weights
        .x
        .iter()
        .map(|(idx, w)| {
            source_glyph(model, *idx, glyph_name)
                .map(|g| (g, *w))
                .ok_or_else(|| format!("missing from source {idx}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let weights_y: Vec<f64> = weights.y.iter().map(|(_, w)| *w).collect();
    let Some((first, _)) = glyphs_x.first() else {
        return Err("no source defines it".to_string());
    };
    let masters: Vec<(&Glyph, f64, f64)> = glyphs_x
        .iter()
        .zip(weights_y.iter())
        .map(|((g, wx), wy)| (*g, *wx, *wy))
        .collect();

    let mut glyph = Glyph::new(first.name.clone());
    glyph.width = weighted_sum(masters.iter().map(|(g, wx, _)| (g.width, *wx)));
    if masters.iter().all(|(g, ..)| g.height.is_some()) {
        glyph.height = Some(weighted_sum(
            masters.iter().map(|(g, _, wy)| (g.height.unwrap_or_default(), *wy)),
        ));
    }

    for (idx, (g, ..)) in masters.iter().enumerate().skip(1) {
        if g.contours.len() != first.contours.len() {
            return Err(format!(
                "source {idx} has {} contours, expected {}",
                g.contours.len(),
                first.contours.len()
            ));
        }
        if g.components.len() != first.components.len() {
            return Err(format!(
                "source {idx} has {} components, expected {}",
                g.components.len(),
                first.components.len()
            ));
        }
    }

    for contour_idx in 0..first.contours.len() {
        let contours: Vec<_> = masters
            .iter()
            .map(|(g, wx, wy)| (&g.contours[contour_idx], *wx, *wy))
            .collect();
        glyph
            .contours
            .push(interpolate_contour(&contours).map_err(|e| format!("contour {contour_idx}: {e}"))?);
    }

    for (component_idx, component) in first.components.iter().enumerate() {
        let mut coeffs = [0.0; 6];
        for (g, wx, wy) in masters.iter() {
            let other = &g.components[component_idx];
            if other.base != component.base {
                return Err(format!(
                    "component {component_idx} refers to '{}' and '{}'",
                    component.base, other.base
                ));
            }
            // [a b c d e f], x' = a x + c y + e, y' = b x + d y + f
            for (i, value) in other.transform.as_coeffs().into_iter().enumerate() {
                let weight = if i % 2 == 0 { *wx } else { *wy };
                coeffs[i] += value * weight;
            }
        }
        glyph
            .components
            .push(Component::new(component.base.clone(), Affine::new(coeffs)));
    }

    glyph.anchors = interpolate_anchors(&masters);
    Ok(glyph)
}

fn interpolate_contour(masters: &[(&BezPath, f64, f64)]) -> Result<BezPath, String> {
    let Some((first, ..)) = masters.first() else {
        return Ok(BezPath::new());
    };
    let elements = first.elements();
    let mut result = Vec::with_capacity(elements.len());
    for (idx, (path, ..)) in masters.iter().enumerate() {
        if path.elements().len() != elements.len() {
            return Err(format!(
                "source {idx} has {} segments, expected {}",
                path.elements().len(),
                elements.len()
            ));
        }
    }
    for (el_idx, el) in elements.iter().enumerate() {
        let lerp = |pt_idx: usize| -> Result<Point, String> {
            let mut x = 0.0;
            let mut y = 0.0;
            for (path, wx, wy) in masters.iter() {
                let other = path.elements()[el_idx];
                let p = match (other, pt_idx) {
                    (PathEl::MoveTo(p) | PathEl::LineTo(p), 0) => p,
                    (PathEl::QuadTo(p, _), 0) | (PathEl::QuadTo(_, p), 1) => p,
                    (PathEl::CurveTo(p, _, _), 0)
                    | (PathEl::CurveTo(_, p, _), 1)
                    | (PathEl::CurveTo(_, _, p), 2) => p,
                    _ => {
                        return Err(format!(
                            "segment {el_idx} is {:?} in one source and {other:?} in another",
                            el
                        ))
                    }
                };
                x += p.x * wx;
                y += p.y * wy;
            }
            Ok(Point::new(x, y))
        };
        let same_kind = masters
            .iter()
            .all(|(path, ..)| std::mem::discriminant(&path.elements()[el_idx]) == std::mem::discriminant(el));
        if !same_kind {
            return Err(format!("segment {el_idx} differs in kind between sources"));
        }
        result.push(match el {
            PathEl::MoveTo(_) => PathEl::MoveTo(lerp(0)?),
            PathEl::LineTo(_) => PathEl::LineTo(lerp(0)?),
            PathEl::QuadTo(..) => PathEl::QuadTo(lerp(0)?, lerp(1)?),
            PathEl::CurveTo(..) => PathEl::CurveTo(lerp(0)?, lerp(1)?, lerp(2)?),
            PathEl::ClosePath => PathEl::ClosePath,
        });
    }
    Ok(BezPath::from_vec(result))
}

/// Anchors by name, in the first master's order then any others'.
///
/// An anchor missing from more than half the masters is dropped; where
/// fewer lack it they stand in with the position of the first master that has it.
fn interpolate_anchors(masters: &[(&Glyph, f64, f64)]) -> Vec<Anchor> {
    let mut names: Vec<&str> = Vec::new();
    for (g, ..) in masters.iter() {
        for anchor in g.anchors.iter() {
            if !names.contains(&anchor.name.as_str()) {
                names.push(&anchor.name);
            }
        }
    }
    names
        .into_iter()
        .filter_map(|name| {
            let present = masters.iter().filter(|(g, ..)| g.anchor(name).is_some()).count();
            if present * 2 < masters.len() {
                debug!("Dropping anchor '{name}', only {present} of {} masters have it", masters.len());
                return None;
            }
            let stand_in = masters.iter().find_map(|(g, ..)| g.anchor(name))?.pos;
            let (x, y) = masters.iter().fold((0.0, 0.0), |(x, y), (g, wx, wy)| {
                let pos = g.anchor(name).map(|a| a.pos).unwrap_or(stand_in);
                (x + pos.x * wx, y + pos.y * wy)
            });
            Some(Anchor::new(name, (x, y)))
        })
        .collect()
}

/// The union of all pairs, a pair a master lacks counts as zero
fn interpolate_kerning(fonts: &[(&Font, f64)]) -> BTreeMap<KernPair, f64> {
    let pairs: HashSet<&KernPair> = fonts.iter().flat_map(|(f, _)| f.kerning.keys()).collect();
    pairs
        .into_iter()
        .map(|pair| {
            let value = weighted_sum(
                fonts
                    .iter()
                    .map(|(f, w)| (f.kerning.get(pair).copied().unwrap_or_default(), *w)),
            );
            (pair.clone(), value)
        })
        .collect()
}

fn as_integer(value: &plist::Value) -> bool {
    matches!(value, plist::Value::Integer(_))
}

fn number_list(value: &plist::Value) -> Option<Vec<f64>> {
    value
        .as_array()?
        .iter()
        .map(|v| match v {
            plist::Value::Real(v) => Some(*v),
            plist::Value::Integer(v) => v.as_signed().map(|v| v as f64),
            _ => None,
        })
        .collect()
}

fn number_value(value: f64, integer: bool) -> plist::Value {
    if integer {
        plist::Value::Integer((ot_round(value) as i64).into())
    } else {
        plist::Value::Real(value)
    }
}

fn interpolate_info(fonts: &[(&Font, f64)], default: &FontInfo) -> FontInfo {
    let mut info = FontInfo::default();
    for key in NUMERIC_INFO_KEYS {
        let values: Option<Vec<(f64, f64)>> = fonts
            .iter()
            .map(|(f, w)| f.info.get_f64(key).map(|v| (v, *w)))
            .collect();
        let integer = fonts
            .iter()
            .all(|(f, _)| f.info.get(key).is_some_and(as_integer));
        match values {
            Some(values) => info.set(key, number_value(weighted_sum(values.into_iter()), integer)),
            None => {
                if let Some(value) = default.get(key) {
                    info.set(key, value.clone());
                }
            }
        }
    }
    for key in NUMERIC_LIST_INFO_KEYS {
        let lists: Option<Vec<Vec<f64>>> = fonts
            .iter()
            .map(|(f, _)| f.info.get(key).and_then(number_list))
            .collect();
        let len = lists.as_ref().and_then(|l| l.first()).map(Vec::len);
        match (lists, len) {
            (Some(lists), Some(len)) if lists.iter().all(|l| l.len() == len) => {
                let values = (0..len)
                    .map(|i| {
                        let value = weighted_sum(
                            lists.iter().zip(fonts.iter()).map(|(l, (_, w))| (l[i], *w)),
                        );
                        plist::Value::Real(value)
                    })
                    .collect::<Vec<_>>();
                info.set(key, plist::Value::Array(values));
            }
            _ => {
                if let Some(value) = default.get(key) {
                    info.set(key, value.clone());
                }
            }
        }
    }
    for key in INFO_KEYS_TO_COPY {
        if let Some(value) = default.get(key) {
            info.set(key, value.clone());
        }
    }
    info
}

/// Names from the instance, OS/2 classes and italic angle from the axes.
fn finish_info(
    model: &DesignSpaceModel,
    instance: &Instance,
    location: &DesignLocation,
    info: &mut FontInfo,
) -> Result<(), Error> {
    let default_info = &model.default_font().info;
    if let Some(family) = &instance.family_name {
        info.set("familyName", family.as_str());
    }
    match (&instance.style_name, default_info.style_name()) {
        (Some(style), _) => info.set("styleName", style.as_str()),
        (None, default_style) => {
            warn!(
                "Instance at {location:?} has no style name, copying the default source's ({default_style:?})"
            );
            if let Some(style) = default_style {
                info.set("styleName", style);
            }
        }
    }
    for (key, value) in [
        ("postscriptFontName", &instance.postscript_font_name),
        ("styleMapFamilyName", &instance.style_map_family_name),
        ("styleMapStyleName", &instance.style_map_style_name),
    ] {
        if let Some(value) = value {
            info.set(key, value.as_str());
        }
    }

    let user = user_location(model, &location)?;
    let user_value = |tag: &[u8; 4]| user.get(&Tag::new(tag)).map(|coord| coord.to_f64());
    if !info.contains("openTypeOS2WeightClass") {
        if let Some(wght) = user_value(b"wght") {
            info.set("openTypeOS2WeightClass", number_value(weight_class(wght), true));
        }
    }
    if !info.contains("openTypeOS2WidthClass") {
        if let Some(wdth) = user_value(b"wdth") {
            info.set("openTypeOS2WidthClass", number_value(width_class(wdth)?, true));
        }
    }
    if !info.contains("italicAngle") {
        if let Some(slnt) = user_value(b"slnt") {
            info.set("italicAngle", italic_angle(slnt));
        }
    }
    Ok(())
}

/// usWeightClass from a wght user value
pub fn weight_class(wght: f64) -> f64 {
    ot_round(wght.clamp(1.0, 1000.0))
}

/// usWidthClass from a wdth user value.
///
/// wdth is a percentage of normal width; interpolate between the percentages
/// the OpenType spec gives for each class, then round.
pub fn width_class(wdth: f64) -> Result<f64, Error> {
    let knots = [
        (50.0, 1.0),
        (62.5, 2.0),
        (75.0, 3.0),
        (87.5, 4.0),
        (100.0, 5.0),
        (112.5, 6.0),
        (125.0, 7.0),
        (150.0, 8.0),
        (200.0, 9.0),
    ];
    let map = PiecewiseLinearMap::new(
        knots
            .iter()
            .map(|(from, to)| (OrderedFloat(*from), OrderedFloat(*to)))
            .collect(),
        OutOfRange::Clamp,
    )?;
    Ok(ot_round(
        map.map(OrderedFloat(wdth.clamp(50.0, 200.0))).into_inner(),
    ))
}

/// italicAngle from a slnt user value
pub fn italic_angle(slnt: f64) -> f64 {
    slnt.clamp(-90.0, 90.0)
}

/// A design location in user space, axis by axis
pub fn user_location(
    model: &DesignSpaceModel,
    location: &DesignLocation,
) -> Result<BTreeMap<Tag, UserCoord>, Error> {
    let resolver = model.resolver(OutOfRange::Extrapolate);
    location
        .iter()
        .map(|(tag, coord)| Ok((*tag, resolver.to_user(*coord, *tag)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use millcore::types::{Axes, Axis};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{
        designspace::Source,
        rules::{Condition, ConditionSet, Rule},
    };

    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
        let mut path = BezPath::new();
        path.move_to((x0, y0));
        path.line_to((x1, y0));
        path.line_to((x1, y1));
        path.line_to((x0, y1));
        path.close_path();
        path
    }

    /// A stem whose thickness is wght / 10 and whose width is wdth * 5
    fn master(name: &str, wght: f64, wdth: f64) -> Source {
        let mut font = Font::new();
        font.info.set("familyName", "Mill");
        font.info.set("styleName", name);
        font.info.set("ascender", 700.0 + wght / 10.0);
        font.info.set("openTypeNameDesigner", "Someone");
        let mut glyph = Glyph::new("I")
            .with_width(wdth * 5.0)
            .with_codepoint('I')
            .with_contour(rect(50.0, 0.0, 50.0 + wght / 10.0, 700.0));
        glyph.anchors.push(Anchor::new("top", (wdth * 2.5, 700.0)));
        font.add_glyph(glyph);
        font.add_glyph(
            Glyph::new("Iacute")
                .with_width(wdth * 5.0)
                .with_component(Component::new("I", Affine::translate((wght / 100.0, 0.0)))),
        );
        font.kerning
            .insert(("I".to_string(), "I".to_string()), -wght / 10.0);
        Source {
            name: name.to_string(),
            filename: None,
            layer: None,
            location: DesignLocation::for_pos(&[("wght", wght), ("wdth", wdth)]),
            family_name: None,
            style_name: None,
            font: Arc::new(font),
        }
    }

    fn axes() -> Axes {
        Axes::new(vec![
            Axis::for_test("wght", 100.0, 100.0, 900.0),
            Axis::for_test("wdth", 50.0, 100.0, 100.0),
        ])
        .unwrap()
    }

    fn four_corners() -> Vec<Source> {
        vec![
            master("Thin", 100.0, 100.0),
            master("Black", 900.0, 100.0),
            master("Thin Condensed", 100.0, 50.0),
            master("Black Condensed", 900.0, 50.0),
        ]
    }

    fn model(sources: Vec<Source>, rules: Vec<Rule>, out_of_range: OutOfRange) -> DesignSpaceModel {
        DesignSpaceModel::new(axes(), sources, vec![], rules, out_of_range).unwrap()
    }

    fn instance(style: &str, wght: f64, wdth: f64) -> Instance {
        Instance {
            family_name: Some("Mill".to_string()),
            style_name: Some(style.to_string()),
            ..Instance::new(DesignLocation::for_pos(&[("wght", wght), ("wdth", wdth)]))
        }
    }

    fn points(path: &BezPath) -> Vec<(f64, f64)> {
        path.elements()
            .iter()
            .filter_map(|el| el.end_point())
            .map(|p| (p.x, p.y))
            .collect()
    }

    fn no_rounding() -> InstanceOptions {
        InstanceOptions {
            round_geometry: false,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(Engine::Minimal)]
    #[case(Engine::Extended)]
    fn midpoint_is_the_mean_of_four_corners(#[case] engine: Engine) {
        let model = model(four_corners(), vec![], engine.out_of_range());
        let font = engine
            .generator(no_rounding())
            .generate(&model, &instance("Medium SemiCondensed", 500.0, 75.0))
            .unwrap();

        let glyph = font.glyph("I").unwrap();
        let corners: Vec<_> = model
            .sources()
            .iter()
            .map(|s| points(&s.font.glyph("I").unwrap().contours[0]))
            .collect();
        let mean: Vec<(f64, f64)> = (0..corners[0].len())
            .map(|i| {
                let (x, y) = corners
                    .iter()
                    .fold((0.0, 0.0), |(x, y), pts| (x + pts[i].0, y + pts[i].1));
                (x / 4.0, y / 4.0)
            })
            .collect();
        assert_eq!(mean, points(&glyph.contours[0]));
        assert_eq!(375.0, glyph.width);
        assert_eq!(vec![Anchor::new("top", (187.5, 700.0))], glyph.anchors);
        assert_eq!(vec!['I'], glyph.codepoints);
    }

    #[test]
    fn instance_on_master_is_that_master() {
        let model = model(four_corners(), vec![], OutOfRange::Clamp);
        for options in [InstanceOptions::default(), no_rounding()] {
            for reuse_masters in [true, false] {
                let options = InstanceOptions {
                    reuse_masters,
                    ..options
                };
                let font = MinimalEngine::new(options)
                    .generate(&model, &instance("Black", 900.0, 100.0))
                    .unwrap();
                let black = &model.sources()[1].font;
                assert_eq!(black.glyphs["I"].contours, font.glyphs["I"].contours);
                assert_eq!(black.glyphs["Iacute"].components, font.glyphs["Iacute"].components);
                assert_eq!(black.kerning, font.kerning);
            }
        }
    }

    #[test]
    fn weights_are_one_hot_on_a_master() {
        let model = model(four_corners(), vec![], OutOfRange::Clamp);
        let mut weighting = Weighting::new(
            &model,
            &instance("Thin Condensed", 100.0, 50.0),
            OutOfRange::Clamp,
            false,
        )
        .unwrap();
        let mut weights = weighting.weights(&[0, 1, 2, 3]).x.clone();
        weights.sort_by_key(|(idx, _)| *idx);
        assert_eq!(vec![(0, 0.0), (1, 0.0), (2, 1.0), (3, 0.0)], weights);
    }

    #[test]
    fn minimal_engine_refuses_to_extrapolate() {
        let sources = vec![master("Thin", 100.0, 100.0), master("Black", 700.0, 100.0)];
        let model = model(sources, vec![], OutOfRange::Clamp);
        let result = MinimalEngine::default().generate(&model, &instance("Black", 900.0, 100.0));
        assert!(
            matches!(result, Err(Error::UnsupportedInterpolation { ref instance, .. }) if instance == "Mill Black"),
            "{result:?}"
        );
    }

    #[test]
    fn extended_engine_extrapolates() {
        let sources = vec![master("Thin", 100.0, 100.0), master("Black", 700.0, 100.0)];
        let model = model(sources, vec![], OutOfRange::Extrapolate);
        let font = ExtendedEngine::default()
            .generate(&model, &instance("Black", 900.0, 100.0))
            .unwrap();
        // stem is wght / 10
        assert_eq!(
            vec![(50.0, 0.0), (140.0, 0.0), (140.0, 700.0), (50.0, 700.0)],
            points(&font.glyph("I").unwrap().contours[0])
        );
    }

    #[test]
    fn anisotropic_needs_the_extended_engine() {
        let model = model(four_corners(), vec![], OutOfRange::Clamp);
        let mut aniso = instance("Aniso", 500.0, 100.0);
        aniso.y_location = Some(DesignLocation::for_pos(&[("wght", 900.0), ("wdth", 100.0)]));
        assert!(matches!(
            MinimalEngine::default().generate(&model, &aniso),
            Err(Error::UnsupportedInterpolation { .. })
        ));
        let font = ExtendedEngine::new(no_rounding())
            .generate(&model, &aniso)
            .unwrap();
        // x from wght 500, y from wght 900; the stem only varies in x
        assert_eq!(
            vec![(50.0, 0.0), (100.0, 0.0), (100.0, 700.0), (50.0, 700.0)],
            points(&font.glyph("I").unwrap().contours[0])
        );
    }

    #[test]
    fn missing_kerning_counts_as_zero() {
        let mut sources = vec![master("Thin", 100.0, 100.0), master("Black", 900.0, 100.0)];
        let mut black = (*sources[1].font).clone();
        black.kerning.insert(("I".into(), "public.kern2.O".into()), -40.0);
        sources[1].font = Arc::new(black);
        let model = model(sources, vec![], OutOfRange::Clamp);
        let font = MinimalEngine::new(no_rounding())
            .generate(&model, &instance("Regular", 500.0, 100.0))
            .unwrap();
        assert_eq!(
            vec![
                (("I".to_string(), "I".to_string()), -50.0),
                (("I".to_string(), "public.kern2.O".to_string()), -20.0),
            ],
            font.kerning.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn anchor_missing_from_most_masters_is_dropped() {
        let mut sources = vec![
            master("Thin", 100.0, 100.0),
            master("Black", 900.0, 100.0),
            master("Thin Condensed", 100.0, 50.0),
        ];
        let mut thin = (*sources[0].font).clone();
        thin.glyph_mut("I")
            .unwrap()
            .anchors
            .push(Anchor::new("bottom", (10.0, 0.0)));
        sources[0].font = Arc::new(thin);
        let model = model(sources, vec![], OutOfRange::Clamp);
        let font = MinimalEngine::default()
            .generate(&model, &instance("Regular", 500.0, 75.0))
            .unwrap();
        let names: Vec<_> = font.glyphs["I"].anchors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(vec!["top"], names);
    }

    #[test]
    fn sparse_layer_only_affects_its_glyphs() {
        let mut sources = vec![master("Thin", 100.0, 100.0), master("Black", 900.0, 100.0)];
        let mut black = (*sources[1].font).clone();
        let mut support = crate::font::GlyphSet::new();
        let mut stem = black.glyphs["I"].clone();
        stem.contours = vec![rect(50.0, 0.0, 50.0, 700.0)];
        support.insert(stem.name.clone(), stem);
        black.layers.insert("support".to_string(), support);
        sources[1].font = Arc::new(black.clone());
        sources.push(Source {
            name: "Black support".to_string(),
            layer: Some("support".to_string()),
            location: DesignLocation::for_pos(&[("wght", 500.0), ("wdth", 100.0)]),
            font: Arc::new(black),
            ..sources[1].clone()
        });
        let model = model(sources, vec![], OutOfRange::Clamp);
        let font = MinimalEngine::new(no_rounding())
            .generate(&model, &instance("Regular", 500.0, 100.0))
            .unwrap();
        // the support master pins I at wght 500
        assert_eq!(
            vec![(50.0, 0.0), (50.0, 0.0), (50.0, 700.0), (50.0, 700.0)],
            points(&font.glyph("I").unwrap().contours[0])
        );
        // Iacute is not in the layer, so it's a plain blend of the two masters
        assert_eq!(
            Affine::translate((5.0, 0.0)),
            font.glyph("Iacute").unwrap().components[0].transform
        );
    }

    #[test]
    fn incompatible_glyph_fails() {
        let mut sources = vec![master("Thin", 100.0, 100.0), master("Black", 900.0, 100.0)];
        let mut black = (*sources[1].font).clone();
        black.glyph_mut("I").unwrap().contours.push(rect(0.0, 0.0, 1.0, 1.0));
        sources[1].font = Arc::new(black);
        let model = model(sources, vec![], OutOfRange::Clamp);
        let result = MinimalEngine::default().generate(&model, &instance("Regular", 500.0, 100.0));
        assert!(
            matches!(result, Err(Error::GlyphInterpolation { ref glyph, .. }) if *glyph == "I"),
            "{result:?}"
        );
    }

    #[test]
    fn info_is_interpolated_copied_and_named() {
        let model = model(four_corners(), vec![], OutOfRange::Clamp);
        let mut regular = instance("Regular", 500.0, 75.0);
        regular.postscript_font_name = Some("Mill-Regular".to_string());
        let font = MinimalEngine::default().generate(&model, &regular).unwrap();
        assert_eq!(Some(750.0), font.info.get_f64("ascender"));
        assert_eq!(Some("Someone"), font.info.get_str("openTypeNameDesigner"));
        assert_eq!(Some("Regular"), font.info.style_name());
        assert_eq!(Some("Mill-Regular"), font.info.postscript_font_name());
        assert_eq!(Some(500.0), font.info.get_f64("openTypeOS2WeightClass"));
        assert_eq!(Some(3.0), font.info.get_f64("openTypeOS2WidthClass"));
        assert!(font.lib.contains_key(DESIGNSPACE_LOCATION));
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(1200.0, 1000.0)]
    #[case(651.4, 651.0)]
    fn weight_class_clamps_and_rounds(#[case] wght: f64, #[case] expected: f64) {
        assert_eq!(expected, weight_class(wght));
    }

    #[rstest]
    #[case(10.0, 1.0)]
    #[case(56.25, 2.0)] // 1.5 rounds up
    #[case(100.0, 5.0)]
    #[case(137.5, 8.0)] // 7.5 rounds up
    #[case(300.0, 9.0)]
    fn width_class_from_percentages(#[case] wdth: f64, #[case] expected: f64) {
        assert_eq!(expected, width_class(wdth).unwrap());
    }

    #[test]
    fn italic_angle_clamps() {
        assert_eq!(-90.0, italic_angle(-120.0));
        assert_eq!(-12.0, italic_angle(-12.0));
    }

    #[test]
    fn rules_apply_after_interpolation() {
        let mut sources = four_corners();
        for source in sources.iter_mut() {
            let mut font = (*source.font).clone();
            let mut alt = font.glyphs["I"].clone();
            alt.name = GlyphName::new("I.serif");
            alt.codepoints.clear();
            alt.width += 100.0;
            font.add_glyph(alt);
            source.font = Arc::new(font);
        }
        let rule = Rule {
            name: "serif when heavy".to_string(),
            condition_sets: vec![ConditionSet(vec![Condition::new(
                Tag::new(b"wght"),
                Some(millcore::coords::DesignCoord::new(600.0)),
                None,
            )])],
            substitutions: vec![(GlyphName::new("I"), GlyphName::new("I.serif"))],
        };
        let model = model(sources, vec![rule], OutOfRange::Clamp);
        let light = MinimalEngine::default()
            .generate(&model, &instance("Light", 300.0, 100.0))
            .unwrap();
        let heavy = MinimalEngine::default()
            .generate(&model, &instance("Heavy", 800.0, 100.0))
            .unwrap();
        assert_eq!(500.0, light.glyphs["I"].width);
        assert_eq!(600.0, heavy.glyphs["I"].width);
        assert_eq!(vec!['I'], heavy.glyphs["I"].codepoints);
    }
}

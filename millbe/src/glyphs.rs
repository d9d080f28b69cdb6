//! 'glyf', 'loca' and 'gvar' compilation
//!
//! Glyphs that glyf cannot express as they are, a component glyph with
//! contours of its own or a component whose transform won't fit F2Dot14, are
//! decomposed on the way in.

use std::collections::{HashMap, HashSet};

use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use log::{debug, trace};
use millcore::{
    coords::NormalizedLocation,
    types::GlyphName,
    variations::VariationModel,
};
use millir::font::{Component as IrComponent, Font, Glyph as IrGlyph};
use write_fonts::{
    tables::{
        glyf::{
            Anchor, Bbox, Component, ComponentFlags, CompositeGlyph, Glyf, GlyfLocaBuilder,
            Glyph, MalformedPath, SimpleGlyph, Transform,
        },
        gvar::{GlyphDelta, GlyphDeltas, GlyphVariations, Gvar},
        loca::{Loca, LocaFormat},
    },
    types::{F2Dot14, GlyphId, GlyphId16, Tag},
    OtRound,
};

use crate::{error::Error, filters::decompose_glyph};

/// Glyph ids by name
pub(crate) struct GlyphIds<'a>(HashMap<&'a GlyphName, u16>);

impl<'a> GlyphIds<'a> {
    pub(crate) fn new(order: &'a [GlyphName]) -> Result<Self, Error> {
        if order.len() > u16::MAX as usize {
            return Err(Error::Table {
                table: "glyf".to_string(),
                reason: format!("{} glyphs is more than a font can hold", order.len()),
            });
        }
        Ok(GlyphIds(
            order
                .iter()
                .enumerate()
                .map(|(gid, name)| (name, gid as u16))
                .collect(),
        ))
    }

    fn get(&self, name: &GlyphName) -> Option<u16> {
        self.0.get(name).copied()
    }
}

/// The compiled glyphs, in glyph order, plus the glyf and loca they make
pub(crate) struct GlyphTables {
    pub(crate) glyphs: Vec<Glyph>,
    pub(crate) glyf: Glyf,
    pub(crate) loca: Loca,
    pub(crate) loca_format: LocaFormat,
}

impl GlyphTables {
    /// The union of every glyph's bounding box
    pub(crate) fn bbox(&self) -> Bbox {
        self.glyphs
            .iter()
            .filter_map(glyph_bbox)
            .map(bbox2rect)
            .reduce(|acc, e| acc.union(e))
            .map(Bbox::from)
            .unwrap_or_default()
    }
}

fn bbox2rect(bbox: Bbox) -> Rect {
    Rect {
        x0: bbox.x_min.into(),
        y0: bbox.y_min.into(),
        x1: bbox.x_max.into(),
        y1: bbox.y_max.into(),
    }
}

pub(crate) fn glyph_bbox(glyph: &Glyph) -> Option<Bbox> {
    match glyph {
        Glyph::Simple(simple) => Some(simple.bbox),
        Glyph::Composite(composite) => Some(composite.bbox),
        Glyph::Empty => None,
    }
}

fn fits_f2dot14(value: f64) -> bool {
    (-2.0..2.0).contains(&value)
}

fn fits_i16(value: f64) -> bool {
    let value: f64 = value.ot_round();
    (i16::MIN as f64..=i16::MAX as f64).contains(&value)
}

/// Can glyf hold this glyph's components as components?
fn needs_decomposition(glyph: &IrGlyph, gids: &GlyphIds) -> bool {
    if glyph.components.is_empty() {
        return false;
    }
    if !glyph.contours.is_empty() {
        trace!("Decompose '{}', it mixes contours and components", glyph.name);
        return true;
    }
    glyph.components.iter().any(|component| {
        let [xx, yx, xy, yy, dx, dy] = component.transform.as_coeffs();
        let unrepresentable = ![xx, yx, xy, yy].into_iter().all(fits_f2dot14)
            || !fits_i16(dx)
            || !fits_i16(dy)
            || gids.get(&component.base).is_none();
        if unrepresentable {
            trace!(
                "Decompose '{}', component '{}' can't be written as is",
                glyph.name,
                component.base
            );
        }
        unrepresentable
    })
}

fn join_contours<'a>(contours: impl IntoIterator<Item = &'a BezPath>) -> BezPath {
    let mut path = BezPath::new();
    for contour in contours {
        path.extend(contour.elements().iter().copied());
    }
    path
}

fn kurbo_error(glyph: &GlyphName, path: &BezPath, problem: MalformedPath) -> Error {
    Error::KurboError {
        glyph_name: glyph.clone(),
        kurbo_problem: problem,
        context: path.to_svg(),
    }
}

/// The outline of a glyph, components drawn in place if asked
fn outline(font: &Font, glyph: &IrGlyph, decompose: bool) -> Result<BezPath, Error> {
    if decompose {
        Ok(join_contours(decompose_glyph(font, glyph)?.iter()))
    } else {
        Ok(join_contours(glyph.contours.iter()))
    }
}

/// Can glyph reuse the metrics of the component glyph?
///
/// Same advance width and a transform that does nothing but shift vertically.
fn can_reuse_metrics(glyph: &IrGlyph, component_glyph: &IrGlyph, transform: &Affine) -> bool {
    let width: u16 = glyph.width.ot_round();
    let component_width: u16 = component_glyph.width.ot_round();
    if width != component_width {
        return false;
    }
    // transform needs to be identity ignoring dy
    let mut coeffs = transform.as_coeffs();
    coeffs[5] = 0.0;
    coeffs == Affine::IDENTITY.as_coeffs()
}

fn create_component(gid: u16, transform: &Affine) -> Component {
    // No source does point anchoring so we just turn transform into a 2x2 + offset
    let [a, b, c, d, e, f] = transform.as_coeffs();
    let flags = ComponentFlags {
        round_xy_to_grid: true,
        ..Default::default()
    };
    Component::new(
        GlyphId16::new(gid),
        Anchor::Offset {
            x: e.ot_round(),
            y: f.ot_round(),
        },
        Transform {
            xx: F2Dot14::from_f32(a as f32),
            yx: F2Dot14::from_f32(b as f32),
            xy: F2Dot14::from_f32(c as f32),
            yy: F2Dot14::from_f32(d as f32),
        },
        flags,
    )
}

/// The bounding box of a composite is that of its decomposed outline
fn composite_bbox(font: &Font, glyph: &IrGlyph) -> Result<Bbox, Error> {
    let path = outline(font, glyph, true)?;
    if path.elements().is_empty() {
        return Ok(Bbox::default());
    }
    SimpleGlyph::from_bezpath(&path)
        .map(|simple| simple.bbox)
        .map_err(|e| kurbo_error(&glyph.name, &path, e))
}

fn create_composite(
    font: &Font,
    glyph: &IrGlyph,
    gids: &GlyphIds,
) -> Result<CompositeGlyph, Error> {
    let mut set_use_my_metrics = false;
    let mut components = Vec::with_capacity(glyph.components.len());
    for IrComponent { base, transform } in glyph.components.iter() {
        let Some(gid) = gids.get(base) else {
            return Err(Error::ComponentError {
                glyph: glyph.name.clone(),
                referenced_glyph: base.clone(),
                problem: "not in the glyph order".to_string(),
            });
        };
        let mut component = create_component(gid, transform);
        if !set_use_my_metrics {
            if let Some(component_glyph) = font.glyph(base.as_str()) {
                if can_reuse_metrics(glyph, component_glyph, transform) {
                    set_use_my_metrics = true;
                    component.flags.use_my_metrics = true;
                }
            }
        }
        components.push((component, Bbox::default()));
    }
    let mut composite = CompositeGlyph::try_from_iter(components).map_err(|e| Error::Outline {
        glyph: glyph.name.clone(),
        reason: e.to_string(),
    })?;
    composite.bbox = composite_bbox(font, glyph)?;
    Ok(composite)
}

fn simple_glyph(name: &GlyphName, path: &BezPath) -> Result<Glyph, Error> {
    if path.elements().is_empty() {
        return Ok(Glyph::Empty);
    }
    SimpleGlyph::from_bezpath(path)
        .map(Glyph::Simple)
        .map_err(|e| kurbo_error(name, path, e))
}

fn compile_glyph(font: &Font, glyph: &IrGlyph, gids: &GlyphIds) -> Result<Glyph, Error> {
    if glyph.components.is_empty() {
        return simple_glyph(&glyph.name, &join_contours(glyph.contours.iter()));
    }
    if needs_decomposition(glyph, gids) {
        return simple_glyph(&glyph.name, &outline(font, glyph, true)?);
    }
    Ok(Glyph::Composite(create_composite(font, glyph, gids)?))
}

fn glyf_loca(glyphs: Vec<Glyph>) -> Result<GlyphTables, Error> {
    let mut builder = GlyfLocaBuilder::new();
    for glyph in glyphs.iter() {
        builder.add_glyph(glyph).map_err(|e| Error::Table {
            table: "glyf".to_string(),
            reason: format!("{e:?}"),
        })?;
    }
    let (glyf, loca, loca_format) = builder.build();
    Ok(GlyphTables {
        glyphs,
        glyf,
        loca,
        loca_format,
    })
}

fn missing(name: &GlyphName) -> Error {
    Error::Ir(millir::Error::GlyphNotFound(name.clone()))
}

/// Compile the default layer of a font, in the given order
pub(crate) fn build_glyphs(font: &Font, order: &[GlyphName]) -> Result<GlyphTables, Error> {
    let gids = GlyphIds::new(order)?;
    let glyphs = order
        .iter()
        .map(|name| {
            let glyph = font.glyph(name.as_str()).ok_or_else(|| missing(name))?;
            compile_glyph(font, glyph, &gids)
        })
        .collect::<Result<Vec<_>, _>>()?;
    glyf_loca(glyphs)
}

/// A master of a variable font
pub(crate) struct Master<'a> {
    pub(crate) location: NormalizedLocation,
    pub(crate) font: &'a Font,
}

/// * <https://docs.microsoft.com/en-us/typography/opentype/spec/tt_instructing_glyphs#phantoms>
fn add_phantom_points(advance: f64, points: &mut Vec<Point>) {
    // lsb is always xMin so leftSideX = 0, rightSideX = advance
    let advance: u16 = advance.ot_round();
    points.push(Point::new(0.0, 0.0));
    points.push(Point::new(advance as f64, 0.0));

    // vertical phantom points
    points.push(Point::new(0.0, 0.0));
    points.push(Point::new(0.0, 0.0));
}

fn incompatible(glyph: &GlyphName, problem: impl Into<String>) -> Error {
    Error::Ir(millir::Error::IncompatibleMasters {
        glyph: glyph.clone(),
        problem: problem.into(),
    })
}

/// The glyph in the default master plus its point sequences at every master that has it
struct VariableGlyph {
    default: Glyph,
    point_seqs: HashMap<NormalizedLocation, Vec<Point>>,
}

fn variable_simple_glyph(
    name: &GlyphName,
    holders: &[(&Master, &IrGlyph)],
    default_idx: usize,
    decompose: bool,
) -> Result<VariableGlyph, Error> {
    let paths = holders
        .iter()
        .map(|(master, glyph)| outline(master.font, glyph, decompose))
        .collect::<Result<Vec<_>, _>>()?;

    let empty = paths.iter().filter(|p| p.elements().is_empty()).count();
    if empty == paths.len() {
        let point_seqs = holders
            .iter()
            .map(|(master, glyph)| {
                let mut points = Vec::new();
                add_phantom_points(glyph.width, &mut points);
                (master.location.clone(), points)
            })
            .collect();
        return Ok(VariableGlyph {
            default: Glyph::Empty,
            point_seqs,
        });
    }
    if empty > 0 {
        return Err(incompatible(name, "empty in some masters but not others"));
    }

    let simples = SimpleGlyph::interpolatable_glyphs_from_bezpaths(&paths).map_err(|e| match e {
        MalformedPath::UnequalNumberOfElements(_) | MalformedPath::InconsistentPathElements(..) => {
            incompatible(name, format!("outlines don't match, {e:?}"))
        }
        _ => kurbo_error(name, &paths[default_idx], e),
    })?;

    let point_seqs = holders
        .iter()
        .zip(simples.iter())
        .map(|((master, glyph), simple)| {
            let mut points: Vec<Point> = simple
                .contours
                .iter()
                .flat_map(|c| c.iter())
                .map(|cp| Point::new(cp.x as f64, cp.y as f64))
                .collect();
            add_phantom_points(glyph.width, &mut points);
            (master.location.clone(), points)
        })
        .collect();
    let default = simples
        .into_iter()
        .nth(default_idx)
        .map(Glyph::Simple)
        .unwrap_or(Glyph::Empty);
    Ok(VariableGlyph {
        default,
        point_seqs,
    })
}

fn variable_composite_glyph(
    name: &GlyphName,
    holders: &[(&Master, &IrGlyph)],
    default_idx: usize,
    gids: &GlyphIds,
) -> Result<VariableGlyph, Error> {
    let (default_master, default_glyph) = holders[default_idx];
    let bases: Vec<_> = default_glyph.components.iter().map(|c| &c.base).collect();
    let mut point_seqs = HashMap::new();
    for (master, glyph) in holders.iter() {
        let other: Vec<_> = glyph.components.iter().map(|c| &c.base).collect();
        if other != bases {
            return Err(incompatible(
                name,
                format!("components {bases:?} in the default master, {other:?} at {:?}", master.location),
            ));
        }
        // 1 point per component for its offset, plus phantoms
        let mut points = Vec::with_capacity(glyph.components.len() + 4);
        for component in glyph.components.iter() {
            let [.., dx, dy] = component.transform.as_coeffs();
            points.push(Point::new(dx, dy));
        }
        add_phantom_points(glyph.width, &mut points);
        point_seqs.insert(master.location.clone(), points);
    }
    let composite = create_composite(default_master.font, default_glyph, gids)?;
    Ok(VariableGlyph {
        default: Glyph::Composite(composite),
        point_seqs,
    })
}

/// glyf can't vary a component's 2x2, only its offset
fn transforms_vary(holders: &[(&Master, &IrGlyph)]) -> bool {
    let scale = |c: &IrComponent| {
        let [xx, yx, xy, yy, ..] = c.transform.as_coeffs();
        [xx, yx, xy, yy]
    };
    let Some((_, first)) = holders.first() else {
        return false;
    };
    holders.iter().any(|(_, glyph)| {
        glyph.components.len() != first.components.len()
            || glyph
                .components
                .iter()
                .zip(first.components.iter())
                .any(|(a, b)| scale(a) != scale(b))
    })
}

fn variable_glyph(
    name: &GlyphName,
    masters: &[Master],
    default_master: usize,
    gids: &GlyphIds,
) -> Result<VariableGlyph, Error> {
    let holders: Vec<(&Master, &IrGlyph)> = masters
        .iter()
        .filter_map(|m| m.font.glyph(name.as_str()).map(|g| (m, g)))
        .collect();
    let default_font = masters[default_master].font;
    let default_idx = holders
        .iter()
        .position(|(m, _)| std::ptr::eq(m.font, default_font))
        .ok_or_else(|| missing(name))?;

    let decompose = holders
        .iter()
        .any(|(_, glyph)| needs_decomposition(glyph, gids))
        || transforms_vary(&holders);
    let composite = holders[default_idx].1.contours.is_empty()
        && !holders[default_idx].1.components.is_empty();

    if composite && !decompose {
        variable_composite_glyph(name, &holders, default_idx, gids)
    } else {
        variable_simple_glyph(name, &holders, default_idx, decompose)
    }
}

/// Compile glyf and gvar from compatible masters.
///
/// The default master supplies the glyph order and the glyf outlines; every
/// master that has a glyph contributes to its deltas. Glyphs missing from some
/// masters get deltas from a model of only the masters that have them.
pub(crate) fn build_variable_glyphs(
    masters: &[Master],
    default_master: usize,
    order: &[GlyphName],
    model: &VariationModel,
) -> Result<(GlyphTables, Gvar), Error> {
    let gids = GlyphIds::new(order)?;
    let axis_order: Vec<Tag> = model.axis_order().to_vec();
    let all_locations: HashSet<&NormalizedLocation> = masters.iter().map(|m| &m.location).collect();

    let mut glyphs = Vec::with_capacity(order.len());
    let mut variations = Vec::with_capacity(order.len());
    for (gid, name) in order.iter().enumerate() {
        let VariableGlyph {
            default,
            point_seqs,
        } = variable_glyph(name, masters, default_master, &gids)?;

        let sparse_model;
        let glyph_model = if point_seqs.len() == all_locations.len() {
            model
        } else {
            debug!("'{name}' is sparse, {} of {} masters", point_seqs.len(), all_locations.len());
            sparse_model = VariationModel::new(point_seqs.keys().cloned().collect(), axis_order.clone());
            &sparse_model
        };

        let deltas = glyph_model
            .deltas::<Point, Vec2>(&point_seqs)
            .map_err(|e| Error::GlyphDeltaError(name.clone(), e))?;
        let glyph_deltas = deltas
            .into_iter()
            .filter(|(region, deltas)| {
                !region.is_default() && deltas.iter().any(|d| d.x != 0.0 || d.y != 0.0)
            })
            .map(|(region, deltas)| {
                GlyphDeltas::new(
                    region.to_gvar_tents(&axis_order),
                    deltas
                        .into_iter()
                        .map(|d| GlyphDelta::required(d.x as i16, d.y as i16))
                        .collect(),
                )
            })
            .collect();
        variations.push(GlyphVariations::new(GlyphId::new(gid as u32), glyph_deltas));
        glyphs.push(default);
    }

    let gvar = Gvar::new(variations, axis_order.len() as u16).map_err(|e| Error::Table {
        table: "gvar".to_string(),
        reason: format!("{e}"),
    })?;
    Ok((glyf_loca(glyphs)?, gvar))
}

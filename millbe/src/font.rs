//! Assemble TrueType binaries from fonts.
//!
//! A static font is compiled from one [`Font`]. A variable font is compiled
//! from the sources of a designspace: the default source supplies the glyph
//! order, metrics and names, every source contributes gvar deltas.

use std::{borrow::Cow, collections::HashSet, fmt::Display};

use kurbo::{BezPath, Rect, Shape};
use log::{debug, warn};
use millcore::{
    coords::NormalizedLocation, piecewise_linear_map::OutOfRange, types::GlyphName,
    variations::VariationModel,
};
use millir::{
    designspace::{DesignSpaceModel, Source},
    font::{Font, FontInfo, Glyph},
};
use write_fonts::{FontBuilder, OtRound};

use crate::{
    cmap::{build_cmap, codepoint_mappings},
    error::Error,
    fvar::{build_avar, build_fvar, NamedInstance},
    glyphs::{build_glyphs, build_variable_glyphs, GlyphTables, Master},
    head::build_head,
    hmetrics::build_hmetrics,
    maxp::build_maxp,
    name::NameBuilder,
    os2::build_os2,
    post::build_post,
};

/// The outline format of a binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutlineFlavor {
    TrueType,
    Cff,
    Cff2,
}

impl Display for OutlineFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutlineFlavor::TrueType => "TrueType",
            OutlineFlavor::Cff => "CFF",
            OutlineFlavor::Cff2 => "CFF2",
        })
    }
}

/// A fontinfo list of bit numbers, such as openTypeOS2Type, as a mask
pub(crate) fn info_bits(info: &FontInfo, key: &str) -> Option<u128> {
    let bits = info.get(key)?.as_array()?;
    Some(
        bits.iter()
            .filter_map(|bit| bit.as_unsigned_integer())
            .filter(|bit| *bit < 128)
            .fold(0u128, |mask, bit| mask | 1 << bit),
    )
}

/// A box with a counter, half an em wide, for fonts that don't draw their own
fn notdef(info: &FontInfo) -> Glyph {
    let upem = info.units_per_em();
    let width = (upem * 0.5).round();
    let height = info.get_f64("ascender").unwrap_or(upem * 0.75);
    let stroke = (upem * 0.05).round();

    let outer = Rect::new(stroke, 0.0, width - stroke, height).to_path(0.1);
    // counter runs the other way
    let inner = Rect::new(2.0 * stroke, stroke, width - 2.0 * stroke, height - stroke);
    let mut counter = BezPath::new();
    counter.move_to((inner.x0, inner.y0));
    counter.line_to((inner.x0, inner.y1));
    counter.line_to((inner.x1, inner.y1));
    counter.line_to((inner.x1, inner.y0));
    counter.close_path();

    Glyph::new(GlyphName::NOTDEF)
        .with_width(width)
        .with_contour(outer)
        .with_contour(counter)
}

/// The font, with a generated .notdef if it lacks one
fn with_notdef(font: &Font) -> Cow<'_, Font> {
    if font.glyphs.contains_key(&GlyphName::NOTDEF) {
        return Cow::Borrowed(font);
    }
    debug!("No .notdef, generating one");
    let mut font = font.clone();
    font.add_glyph(notdef(&font.info));
    Cow::Owned(font)
}

/// .notdef first, then everything else in source order
fn glyph_order(font: &Font) -> Vec<GlyphName> {
    std::iter::once(GlyphName::NOTDEF)
        .chain(
            font.glyph_order()
                .filter(|name| **name != GlyphName::NOTDEF)
                .cloned(),
        )
        .collect()
}

fn advances(font: &Font, order: &[GlyphName]) -> Vec<f64> {
    order
        .iter()
        .map(|name| font.glyph(name.as_str()).map(|g| g.width).unwrap_or_default())
        .collect()
}

/// The tables a static and a variable font share, in a builder
fn common_tables(
    font: &Font,
    order: &[GlyphName],
    glyphs: &GlyphTables,
    names: &NameBuilder,
) -> Result<FontBuilder<'static>, Error> {
    let info = &font.info;
    let advances = advances(font, order);
    let mappings = codepoint_mappings(font, order);

    let mut hmetrics = build_hmetrics(info, &glyphs.glyphs, &advances)?;
    let maxp = build_maxp(order.len(), &mut hmetrics.limits)?;
    let cmap = build_cmap(&mappings)?;
    let os2 = build_os2(info, &advances, &mappings, 0);
    let post = build_post(info, order);
    let head = build_head(info, glyphs.bbox(), glyphs.loca_format);

    let mut builder = FontBuilder::new();
    builder
        .add_table(&head)?
        .add_table(&hmetrics.hhea)?
        .add_table(&maxp)?
        .add_table(&os2)?
        .add_table(&hmetrics.hmtx)?
        .add_table(&cmap)?
        .add_table(&glyphs.loca)?
        .add_table(&glyphs.glyf)?
        .add_table(&names.build())?
        .add_table(&post)?;
    Ok(builder)
}

/// Compiles fonts into binaries of one outline flavor.
#[derive(Debug, Clone, Copy)]
pub struct FontAssembler {
    flavor: OutlineFlavor,
}

impl FontAssembler {
    pub fn new(flavor: OutlineFlavor) -> FontAssembler {
        FontAssembler { flavor }
    }

    pub fn flavor(&self) -> OutlineFlavor {
        self.flavor
    }

    fn check_flavor(&self) -> Result<(), Error> {
        match self.flavor {
            OutlineFlavor::TrueType => Ok(()),
            flavor => Err(Error::UnsupportedFlavor(flavor.to_string())),
        }
    }

    /// A static font from the default layer.
    ///
    /// Outlines must already be quadratic.
    pub fn assemble_static(&self, font: &Font) -> Result<Vec<u8>, Error> {
        self.check_flavor()?;
        let font = with_notdef(font);
        warn_negative_advances(&font);
        let order = glyph_order(&font);
        let glyphs = build_glyphs(&font, &order)?;
        let names = NameBuilder::new(&font.info);
        let mut builder = common_tables(&font, &order, &glyphs, &names)?;
        debug!(
            "Assembled static font of {} glyphs, {} loca",
            order.len(),
            if matches!(glyphs.loca_format, write_fonts::tables::loca::LocaFormat::Short) {
                "short"
            } else {
                "long"
            }
        );
        Ok(builder.build())
    }

    /// A variable font from the sources of a designspace.
    ///
    /// `masters` holds one font per source, in source order, whose default
    /// layer is that source's glyphs; see [`source_fonts`]. Outlines must
    /// already be quadratic and compatible.
    pub fn assemble_variable(
        &self,
        model: &DesignSpaceModel,
        masters: &[Font],
    ) -> Result<Vec<u8>, Error> {
        self.check_flavor()?;
        if masters.len() != model.sources().len() {
            return Err(Error::Table {
                table: "gvar".to_string(),
                reason: format!(
                    "{} masters for {} sources",
                    masters.len(),
                    model.sources().len()
                ),
            });
        }
        let axes = model.axes();
        let axis_order = axes.axis_order();
        let default_idx = model.default_source_index();

        let masters: Vec<Cow<Font>> = masters.iter().map(with_notdef).collect();
        let default_font = &masters[default_idx];
        warn_negative_advances(default_font);
        let order = glyph_order(default_font);

        let mut locations = Vec::with_capacity(masters.len());
        for source in model.sources() {
            let mut location: NormalizedLocation =
                model.normalized_location(&source.location, OutOfRange::Extrapolate)?;
            location.fit_to_axes(&axis_order);
            locations.push(location);
        }
        let unique: HashSet<NormalizedLocation> = locations.iter().cloned().collect();
        let variation_model = VariationModel::new(unique, axis_order.clone());

        let gvar_masters: Vec<Master> = locations
            .into_iter()
            .zip(masters.iter())
            .map(|(location, font)| Master {
                location,
                font: &**font,
            })
            .collect();
        let (glyphs, gvar) =
            build_variable_glyphs(&gvar_masters, default_idx, &order, &variation_model)?;

        let mut names = NameBuilder::new(&default_font.info);
        let instances = named_instances(model)?;
        let fvar = build_fvar(axes, &instances, &mut names);
        let avar = build_avar(axes)?;

        let mut builder = common_tables(default_font, &order, &glyphs, &names)?;
        builder.add_table(&gvar)?;
        if let Some(fvar) = fvar {
            builder.add_table(&fvar)?;
        }
        if let Some(avar) = avar {
            builder.add_table(&avar)?;
        }
        debug!(
            "Assembled variable font of {} glyphs from {} masters on {} axes",
            order.len(),
            masters.len(),
            axis_order.len()
        );
        Ok(builder.build())
    }
}

fn named_instances(model: &DesignSpaceModel) -> Result<Vec<NamedInstance>, Error> {
    let axes = model.axes();
    model
        .instances()
        .iter()
        .map(|instance| {
            let subfamily = instance
                .style_name
                .clone()
                .or_else(|| instance.name.clone())
                .unwrap_or_else(|| instance.display_name());
            Ok(NamedInstance {
                subfamily,
                postscript_name: instance.postscript_font_name.clone(),
                location: instance.location.to_user(axes)?,
            })
        })
        .collect()
}

/// One font per source whose default layer holds that source's glyphs.
///
/// Layer sources take the rest of their data from the font the layer lives in.
pub fn source_fonts(model: &DesignSpaceModel) -> Result<Vec<Font>, Error> {
    model.sources().iter().map(source_font).collect()
}

fn source_font(source: &Source) -> Result<Font, Error> {
    if !source.is_layer() {
        return Ok(source.font.as_ref().clone());
    }
    let glyphs = source
        .glyphs()
        .ok_or_else(|| Error::MissingLayer(source.layer.clone().unwrap_or_default()))?;
    let mut font = source.font.as_ref().clone();
    font.glyphs = glyphs.clone();
    font.layers.clear();
    Ok(font)
}

/// hmtx can't hold a negative advance
fn warn_negative_advances(font: &Font) {
    for glyph in font.glyphs.values() {
        let advance: f64 = glyph.width.ot_round();
        if advance < 0.0 {
            warn!("'{}' has a negative advance {advance}, it will be 0", glyph.name);
        }
    }
}

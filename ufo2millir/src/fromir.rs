use std::path::Path;

use kurbo::BezPath;
use log::debug;
use millcore::{
    coords::DesignLocation,
    types::{Axes, GlyphName},
};
use millir::{
    designspace::Instance,
    font::{Font, Glyph, GlyphSet},
    path::{to_contour_points, PointType},
    rules::Rule,
};
use norad::designspace::{self, DesignSpaceDocument, Dimension};

use crate::error::Error;

const GLYPH_ORDER: &str = "public.glyphOrder";

fn to_name(name: &str) -> Result<norad::Name, Error> {
    norad::Name::new(name).map_err(|_| Error::InvalidName(name.to_string()))
}

fn to_norad_point_type(typ: PointType) -> norad::PointType {
    match typ {
        PointType::Move => norad::PointType::Move,
        PointType::Line => norad::PointType::Line,
        PointType::OffCurve => norad::PointType::OffCurve,
        PointType::QCurve => norad::PointType::QCurve,
        PointType::Curve => norad::PointType::Curve,
    }
}

fn to_norad_contour(glyph: &GlyphName, path: &BezPath) -> Result<norad::Contour, Error> {
    let points = to_contour_points(path)
        .map_err(|source| millir::Error::Path {
            glyph: glyph.clone(),
            source,
        })?
        .into_iter()
        .map(|p| {
            norad::ContourPoint::new(p.x, p.y, to_norad_point_type(p.typ), false, None, None)
        })
        .collect();
    Ok(norad::Contour::new(points, None))
}

fn to_norad_glyph(glyph: &Glyph) -> Result<norad::Glyph, Error> {
    let mut ufo_glyph = norad::Glyph::new(glyph.name.as_str());
    ufo_glyph.width = glyph.width;
    ufo_glyph.height = glyph.height.unwrap_or_default();
    ufo_glyph.codepoints = norad::Codepoints::new(glyph.codepoints.iter().copied());
    ufo_glyph.contours = glyph
        .contours
        .iter()
        .map(|c| to_norad_contour(&glyph.name, c))
        .collect::<Result<_, _>>()?;
    for component in glyph.components.iter() {
        let [x_scale, xy_scale, yx_scale, y_scale, x_offset, y_offset] =
            component.transform.as_coeffs();
        let transform = norad::AffineTransform {
            x_scale,
            xy_scale,
            yx_scale,
            y_scale,
            x_offset,
            y_offset,
        };
        ufo_glyph.components.push(norad::Component::new(
            to_name(component.base.as_str())?,
            transform,
            None,
        ));
    }
    for anchor in glyph.anchors.iter() {
        ufo_glyph.anchors.push(norad::Anchor::new(
            anchor.pos.x,
            anchor.pos.y,
            Some(to_name(&anchor.name)?),
            None,
            None,
        ));
    }
    ufo_glyph.lib = glyph.lib.clone();
    Ok(ufo_glyph)
}

fn fill_layer(layer: &mut norad::Layer, glyphs: &GlyphSet) -> Result<(), Error> {
    for glyph in glyphs.values() {
        layer.insert_glyph(to_norad_glyph(glyph)?);
    }
    Ok(())
}

/// Write a font as a UFO, replacing anything already at ufo_dir.
///
/// The default layer's order is recorded as the lib glyph order.
pub fn save_ufo(font: &Font, ufo_dir: &Path) -> Result<(), Error> {
    let mut ufo = norad::Font::new();
    ufo.lib = font.lib.clone();
    ufo.lib.insert(
        GLYPH_ORDER.to_string(),
        plist::Value::Array(
            font.glyph_order()
                .map(|n| plist::Value::String(n.to_string()))
                .collect(),
        ),
    );
    ufo.features = font.features.clone();

    fill_layer(ufo.default_layer_mut(), &font.glyphs)?;
    for (name, glyphs) in font.layers.iter() {
        let layer = ufo
            .layers
            .new_layer(name)
            .map_err(|_| Error::InvalidName(name.clone()))?;
        fill_layer(layer, glyphs)?;
    }

    for ((first, second), value) in font.kerning.iter() {
        ufo.kerning
            .entry(to_name(first)?)
            .or_default()
            .insert(to_name(second)?, *value);
    }
    for (group, members) in font.groups.iter() {
        let members = members
            .iter()
            .map(|m| to_name(m.as_str()))
            .collect::<Result<_, _>>()?;
        ufo.groups.insert(to_name(group)?, members);
    }

    ufo.save(ufo_dir).map_err(|e| Error::UfoSave {
        path: ufo_dir.to_path_buf(),
        source: Box::new(e),
    })?;

    // fontinfo is written raw so keys norad doesn't know about survive
    let info_file = ufo_dir.join("fontinfo.plist");
    plist::Value::Dictionary(font.info.as_dict().clone())
        .to_file_xml(&info_file)
        .map_err(|source| Error::Plist {
            path: info_file,
            source,
        })?;
    debug!("Wrote {ufo_dir:?}, {} glyphs", font.glyphs.len());
    Ok(())
}

/// Writes designspace documents, mostly so tests can build their inputs.
#[derive(Debug)]
pub struct DesignSpaceWriter {
    axes: Axes,
    doc: DesignSpaceDocument,
}

impl DesignSpaceWriter {
    pub fn new(axes: &Axes) -> DesignSpaceWriter {
        let mut doc = DesignSpaceDocument {
            format: 4.1,
            ..Default::default()
        };
        for axis in axes.iter() {
            let mapped = axis
                .converter
                .iter()
                .any(|(user, design, _)| user.to_f64() != design.to_f64());
            let map = mapped.then(|| {
                axis.converter
                    .iter()
                    .map(|(user, design, _)| designspace::AxisMapping {
                        input: user.to_f64() as f32,
                        output: design.to_f64() as f32,
                    })
                    .collect()
            });
            doc.axes.push(designspace::Axis {
                name: axis.name.clone(),
                tag: axis.tag.to_string(),
                minimum: Some(axis.min.to_f64() as f32),
                default: axis.default.to_f64() as f32,
                maximum: Some(axis.max.to_f64() as f32),
                hidden: axis.hidden,
                map,
                ..Default::default()
            });
        }
        DesignSpaceWriter {
            axes: axes.clone(),
            doc,
        }
    }

    fn dimensions(&self, location: &DesignLocation, y: Option<&DesignLocation>) -> Vec<Dimension> {
        location
            .iter()
            .filter_map(|(tag, coord)| self.axes.get(tag).map(|axis| (axis, tag, coord)))
            .map(|(axis, tag, coord)| Dimension {
                name: axis.name.clone(),
                xvalue: Some(coord.to_f64() as f32),
                yvalue: y
                    .and_then(|y| y.get(*tag))
                    .map(|coord| coord.to_f64() as f32),
                ..Default::default()
            })
            .collect()
    }

    /// A source, filename relative to where the designspace will be saved
    pub fn source(
        mut self,
        name: &str,
        filename: &str,
        location: &DesignLocation,
        layer: Option<&str>,
    ) -> Self {
        let location = self.dimensions(location, None);
        self.doc.sources.push(designspace::Source {
            name: Some(name.to_string()),
            filename: filename.to_string(),
            layer: layer.map(str::to_string),
            location,
            ..Default::default()
        });
        self
    }

    pub fn instance(mut self, instance: &Instance) -> Self {
        let location = self.dimensions(&instance.location, instance.y_location.as_ref());
        self.doc.instances.push(designspace::Instance {
            name: instance.name.clone(),
            familyname: instance.family_name.clone(),
            stylename: instance.style_name.clone(),
            postscriptfontname: instance.postscript_font_name.clone(),
            stylemapfamilyname: instance.style_map_family_name.clone(),
            stylemapstylename: instance.style_map_style_name.clone(),
            filename: instance
                .filename
                .as_ref()
                .map(|f| f.to_string_lossy().to_string()),
            location,
            lib: instance.lib.clone(),
            ..Default::default()
        });
        self
    }

    pub fn rule(mut self, rule: &Rule) -> Result<Self, Error> {
        let condition_sets = rule
            .condition_sets
            .iter()
            .map(|set| designspace::ConditionSet {
                conditions: set
                    .0
                    .iter()
                    .filter_map(|c| self.axes.get(&c.tag).map(|axis| (axis, c)))
                    .map(|(axis, c)| designspace::Condition {
                        name: axis.name.clone(),
                        minimum: c.min.map(|v| v.to_f64() as f32),
                        maximum: c.max.map(|v| v.to_f64() as f32),
                    })
                    .collect(),
            })
            .collect();
        let substitutions = rule
            .substitutions
            .iter()
            .map(|(name, with)| {
                Ok(designspace::Substitution {
                    name: to_name(name.as_str())?,
                    with: to_name(with.as_str())?,
                })
            })
            .collect::<Result<_, Error>>()?;
        self.doc.rules.rules.push(designspace::Rule {
            name: Some(rule.name.clone()),
            condition_sets,
            substitutions,
        });
        Ok(self)
    }

    pub fn lib(mut self, lib: plist::Dictionary) -> Self {
        self.doc.lib = lib;
        self
    }

    pub fn save(self, path: &Path) -> Result<(), Error> {
        self.doc.save(path).map_err(|source| Error::DesignspaceSave {
            path: path.to_path_buf(),
            source,
        })
    }
}

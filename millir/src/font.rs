//! The in-memory font: glyphs, metrics, kerning, groups, features and lib.
//!
//! Loaders produce one [`Font`] per source; the instancer produces one per
//! instance. A font is owned by whoever is processing it and mutated in place
//! by filters.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use kurbo::{Affine, BezPath, PathEl, Point};
use millcore::types::GlyphName;
use write_fonts::OtRound;

pub const SKIP_EXPORT_GLYPHS: &str = "public.skipExportGlyphs";
pub const POSTSCRIPT_NAMES: &str = "public.postscriptNames";
pub const GLYPH_POSTSCRIPT_NAME: &str = "public.postscriptName";
pub const GLYPHS_EXPORT: &str = "com.schriftgestaltung.Glyphs.Export";

/// A kerning pair, either side may name a glyph or a kerning group
pub type KernPair = (String, String);

/// Font wide info, the contents of a UFO fontinfo.plist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontInfo(plist::Dictionary);

impl FontInfo {
    pub fn new(values: plist::Dictionary) -> FontInfo {
        FontInfo(values)
    }

    pub fn as_dict(&self) -> &plist::Dictionary {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&plist::Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<plist::Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<plist::Value> {
        self.0.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(plist::Value::as_string)
    }

    /// Integers and reals both read as f64
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            plist::Value::Real(v) => Some(*v),
            plist::Value::Integer(v) => v.as_signed().map(|v| v as f64),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn family_name(&self) -> Option<&str> {
        self.get_str("familyName")
    }

    pub fn style_name(&self) -> Option<&str> {
        self.get_str("styleName")
    }

    pub fn postscript_font_name(&self) -> Option<&str> {
        self.get_str("postscriptFontName")
    }

    pub fn units_per_em(&self) -> f64 {
        self.get_f64("unitsPerEm").unwrap_or(1000.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub base: GlyphName,
    pub transform: Affine,
}

impl Component {
    pub fn new(base: impl Into<GlyphName>, transform: Affine) -> Component {
        Component {
            base: base.into(),
            transform,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub name: String,
    pub pos: Point,
}

impl Anchor {
    pub fn new(name: impl Into<String>, pos: impl Into<Point>) -> Anchor {
        Anchor {
            name: name.into(),
            pos: pos.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub name: GlyphName,
    pub width: f64,
    pub height: Option<f64>,
    pub codepoints: Vec<char>,
    /// One path per contour
    pub contours: Vec<BezPath>,
    pub components: Vec<Component>,
    pub anchors: Vec<Anchor>,
    pub lib: plist::Dictionary,
}

impl Glyph {
    pub fn new(name: impl Into<GlyphName>) -> Glyph {
        Glyph {
            name: name.into(),
            width: 0.0,
            height: None,
            codepoints: Vec::new(),
            contours: Vec::new(),
            components: Vec::new(),
            anchors: Vec::new(),
            lib: Default::default(),
        }
    }

    pub fn with_width(mut self, width: f64) -> Glyph {
        self.width = width;
        self
    }

    pub fn with_contour(mut self, contour: BezPath) -> Glyph {
        self.contours.push(contour);
        self
    }

    pub fn with_component(mut self, component: Component) -> Glyph {
        self.components.push(component);
        self
    }

    pub fn with_codepoint(mut self, c: char) -> Glyph {
        self.codepoints.push(c);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty() && self.components.is_empty()
    }

    /// False if the glyph's lib says not to export it
    pub fn is_export(&self) -> bool {
        self.lib
            .get(GLYPHS_EXPORT)
            .and_then(plist::Value::as_boolean)
            .unwrap_or(true)
    }

    pub fn production_name(&self) -> Option<&str> {
        self.lib
            .get(GLYPH_POSTSCRIPT_NAME)
            .and_then(plist::Value::as_string)
    }

    pub fn anchor(&self, name: &str) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.name == name)
    }

    /// Number of explicit on and off curve points across all contours
    pub fn num_points(&self) -> usize {
        self.contours
            .iter()
            .flat_map(|c| c.elements())
            .map(|el| match el {
                PathEl::MoveTo(_) | PathEl::LineTo(_) => 1,
                PathEl::QuadTo(..) => 2,
                PathEl::CurveTo(..) => 3,
                PathEl::ClosePath => 0,
            })
            .sum()
    }
}

pub type GlyphSet = IndexMap<GlyphName, Glyph>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub info: FontInfo,
    /// The default layer, in glyph order
    pub glyphs: GlyphSet,
    /// Named non-default layers
    pub layers: BTreeMap<String, GlyphSet>,
    pub kerning: BTreeMap<KernPair, f64>,
    pub groups: BTreeMap<String, Vec<GlyphName>>,
    pub features: String,
    pub lib: plist::Dictionary,
}

impl Font {
    pub fn new() -> Font {
        Default::default()
    }

    pub fn glyph(&self, name: &str) -> Option<&Glyph> {
        self.glyphs.get(name)
    }

    pub fn glyph_mut(&mut self, name: &str) -> Option<&mut Glyph> {
        self.glyphs.get_mut(name)
    }

    pub fn add_glyph(&mut self, glyph: Glyph) {
        self.glyphs.insert(glyph.name.clone(), glyph);
    }

    /// The named layer, or the default layer for None
    pub fn layer(&self, name: Option<&str>) -> Option<&GlyphSet> {
        match name {
            None => Some(&self.glyphs),
            Some(name) => self.layers.get(name),
        }
    }

    pub fn glyph_order(&self) -> impl Iterator<Item = &GlyphName> {
        self.glyphs.keys()
    }

    /// Glyphs that must not end up in a binary.
    ///
    /// The union of the font lib's list and any glyph whose lib says not to export.
    pub fn skip_export_glyphs(&self) -> BTreeSet<GlyphName> {
        let mut skip: BTreeSet<GlyphName> = self
            .lib
            .get(SKIP_EXPORT_GLYPHS)
            .and_then(plist::Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(plist::Value::as_string)
            .map(GlyphName::new)
            .collect();
        skip.extend(
            self.glyphs
                .values()
                .filter(|g| !g.is_export())
                .map(|g| g.name.clone()),
        );
        skip
    }

    pub fn set_skip_export_glyphs<'a>(&mut self, names: impl IntoIterator<Item = &'a GlyphName>) {
        let names = names
            .into_iter()
            .map(|n| plist::Value::String(n.to_string()))
            .collect();
        self.lib
            .insert(SKIP_EXPORT_GLYPHS.to_string(), plist::Value::Array(names));
    }

    pub fn lib_bool(&self, key: &str) -> Option<bool> {
        match self.lib.get(key)? {
            plist::Value::Boolean(v) => Some(*v),
            plist::Value::Integer(v) => v.as_signed().map(|v| v != 0),
            _ => None,
        }
    }

    /// Round all geometry to integers, the way OpenType does.
    ///
    /// Points, anchors, advances, component offsets and kerning.
    pub fn round_geometry(&mut self) {
        for glyph in self.glyphs.values_mut() {
            round_glyph(glyph);
        }
        for value in self.kerning.values_mut() {
            *value = ot_round(*value);
        }
    }
}

/// Round half up, the way OpenType rounds coordinates
pub fn ot_round(value: f64) -> f64 {
    value.ot_round()
}

fn round_point(p: Point) -> Point {
    Point::new(ot_round(p.x), ot_round(p.y))
}

pub(crate) fn round_glyph(glyph: &mut Glyph) {
    glyph.width = ot_round(glyph.width);
    glyph.height = glyph.height.map(ot_round);
    for contour in glyph.contours.iter_mut() {
        *contour = contour
            .elements()
            .iter()
            .map(|el| match *el {
                PathEl::MoveTo(p) => PathEl::MoveTo(round_point(p)),
                PathEl::LineTo(p) => PathEl::LineTo(round_point(p)),
                PathEl::QuadTo(c, p) => PathEl::QuadTo(round_point(c), round_point(p)),
                PathEl::CurveTo(c0, c1, p) => {
                    PathEl::CurveTo(round_point(c0), round_point(c1), round_point(p))
                }
                PathEl::ClosePath => PathEl::ClosePath,
            })
            .collect();
    }
    for component in glyph.components.iter_mut() {
        let [xx, yx, xy, yy, dx, dy] = component.transform.as_coeffs();
        component.transform = Affine::new([xx, yx, xy, yy, ot_round(dx), ot_round(dy)]);
    }
    for anchor in glyph.anchors.iter_mut() {
        anchor.pos = round_point(anchor.pos);
    }
}

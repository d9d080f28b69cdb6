use std::collections::{BTreeMap, HashSet};

use indexmap::IndexSet;
use kurbo::{Affine, BezPath, Point};
use millcore::types::GlyphName;
use millir::{
    font::{Anchor, Component, Glyph, GlyphSet, KernPair},
    path::{from_contour_points, ContourPoint, PointType},
    Error,
};

const GLYPH_ORDER: &str = "public.glyphOrder";

fn to_ir_point_type(typ: &norad::PointType) -> PointType {
    match typ {
        norad::PointType::Move => PointType::Move,
        norad::PointType::Line => PointType::Line,
        norad::PointType::OffCurve => PointType::OffCurve,
        norad::PointType::QCurve => PointType::QCurve,
        norad::PointType::Curve => PointType::Curve,
    }
}

fn to_ir_contour_point(point: &norad::ContourPoint) -> ContourPoint {
    ContourPoint {
        x: point.x,
        y: point.y,
        typ: to_ir_point_type(&point.typ),
    }
}

fn to_ir_contour(glyph_name: &GlyphName, contour: &norad::Contour) -> Result<BezPath, Error> {
    let points: Vec<_> = contour.points.iter().map(to_ir_contour_point).collect();
    from_contour_points(&points).map_err(|source| Error::Path {
        glyph: glyph_name.clone(),
        source,
    })
}

fn to_ir_component(component: &norad::Component) -> Component {
    let t = &component.transform;
    Component::new(
        component.base.as_str(),
        Affine::new([
            t.x_scale,
            t.xy_scale,
            t.yx_scale,
            t.y_scale,
            t.x_offset,
            t.y_offset,
        ]),
    )
}

fn to_ir_anchor(anchor: &norad::Anchor) -> Option<Anchor> {
    // unnamed anchors can't be matched across masters, nothing uses them
    let name = anchor.name.as_ref()?;
    Some(Anchor::new(name.as_str(), Point::new(anchor.x, anchor.y)))
}

pub(crate) fn to_ir_glyph(glyph: &norad::Glyph) -> Result<Glyph, Error> {
    let name = GlyphName::new(glyph.name().as_str());
    let contours = glyph
        .contours
        .iter()
        .map(|c| to_ir_contour(&name, c))
        .collect::<Result<_, _>>()?;
    Ok(Glyph {
        width: glyph.width,
        height: (glyph.height != 0.0).then_some(glyph.height),
        codepoints: glyph.codepoints.iter().collect(),
        contours,
        components: glyph.components.iter().map(to_ir_component).collect(),
        anchors: glyph.anchors.iter().filter_map(to_ir_anchor).collect(),
        lib: glyph.lib.clone(),
        name,
    })
}

/// The glyphs of a layer, in glyph order
pub(crate) fn to_ir_glyphs(
    layer: &norad::Layer,
    order: &IndexSet<GlyphName>,
) -> Result<GlyphSet, Error> {
    let mut glyphs = GlyphSet::with_capacity(layer.len());
    for name in order {
        if let Some(glyph) = layer.get_glyph(name.as_str()) {
            glyphs.insert(name.clone(), to_ir_glyph(glyph)?);
        }
    }
    Ok(glyphs)
}

pub(crate) fn to_ir_kerning(kerning: &norad::Kerning) -> BTreeMap<KernPair, f64> {
    kerning
        .iter()
        .flat_map(|(first, seconds)| {
            seconds
                .iter()
                .map(move |(second, value)| ((first.to_string(), second.to_string()), *value))
        })
        .collect()
}

pub(crate) fn to_ir_groups(groups: &norad::Groups) -> BTreeMap<String, Vec<GlyphName>> {
    groups
        .iter()
        .map(|(name, members)| {
            (
                name.to_string(),
                members.iter().map(|m| GlyphName::new(m.as_str())).collect(),
            )
        })
        .collect()
}

/// The glyph order for a UFO.
///
/// The lib may elect to specify a glyph order, which may overlap the actual
/// glyph set. Names in lib order come first, anything leftover follows sorted.
/// Without a lib order .notdef leads and the rest are sorted.
pub(crate) fn glyph_order(
    lib: &plist::Dictionary,
    glyph_names: &HashSet<GlyphName>,
) -> IndexSet<GlyphName> {
    let mut glyph_order = IndexSet::new();
    if let Some(plist::Value::Array(ufo_order)) = lib.get(GLYPH_ORDER) {
        ufo_order
            .iter()
            .filter_map(|v| v.as_string().map(GlyphName::new))
            .filter(|name| glyph_names.contains(name))
            .for_each(|name| {
                glyph_order.insert(name);
            });
    } else if glyph_names.contains(".notdef") {
        glyph_order.insert(GlyphName::NOTDEF);
    }
    let mut pending_add: Vec<_> = glyph_names
        .iter()
        .filter(|name| !glyph_order.contains(*name))
        .cloned()
        .collect();
    pending_add.sort();
    glyph_order.extend(pending_add);
    glyph_order
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(names: &[&str]) -> HashSet<GlyphName> {
        names.iter().map(GlyphName::new).collect()
    }

    fn order_of(order: IndexSet<GlyphName>) -> Vec<String> {
        order.into_iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn glyph_order_without_lib_puts_notdef_first() {
        let order = glyph_order(&Default::default(), &names(&["b", ".notdef", "a"]));
        assert_eq!(vec![".notdef", "a", "b"], order_of(order));
    }

    #[test]
    fn glyph_order_follows_lib_then_sorts_leftovers() {
        let mut lib = plist::Dictionary::new();
        lib.insert(
            GLYPH_ORDER.to_string(),
            plist::Value::Array(
                ["space", "missing", "a"]
                    .into_iter()
                    .map(|s| plist::Value::String(s.to_string()))
                    .collect(),
            ),
        );
        let order = glyph_order(&lib, &names(&["a", "z", "space", "c"]));
        assert_eq!(vec!["space", "a", "c", "z"], order_of(order));
    }

    #[test]
    fn converts_a_norad_glyph() {
        let mut glyph = norad::Glyph::new("A");
        glyph.width = 600.0;
        glyph.codepoints.insert('A');
        glyph.contours.push(norad::Contour::new(
            vec![
                norad::ContourPoint::new(0.0, 0.0, norad::PointType::Line, false, None, None),
                norad::ContourPoint::new(300.0, 700.0, norad::PointType::Line, false, None, None),
                norad::ContourPoint::new(600.0, 0.0, norad::PointType::Line, false, None, None),
            ],
            None,
        ));
        glyph.anchors.push(norad::Anchor::new(
            300.0,
            700.0,
            Some(norad::Name::new("top").unwrap()),
            None,
            None,
        ));

        let glyph = to_ir_glyph(&glyph).unwrap();
        assert_eq!("A", glyph.name.as_str());
        assert_eq!(600.0, glyph.width);
        assert_eq!(vec!['A'], glyph.codepoints);
        assert_eq!(
            vec!["M0,0 L300,700 L600,0 L0,0 Z".to_string()],
            glyph.contours.iter().map(|c| c.to_svg()).collect::<Vec<_>>()
        );
        assert_eq!(Some(Point::new(300.0, 700.0)), glyph.anchor("top").map(|a| a.pos));
    }
}

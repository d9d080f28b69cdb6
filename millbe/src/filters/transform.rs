//! Geometric filters: affine transformation, contour reversal, anchor propagation.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use kurbo::{Affine, Point};
use log::warn;
use millcore::types::GlyphName;
use millir::font::{Anchor, Font, Glyph};

use crate::{
    declaration::Options,
    error::Error,
    filters::{layer_glyphs_mut, Filter, GlyphLookup},
    outline::reverse_contour,
};

/// The vertical origin scaling and slanting happen around
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransformOrigin {
    CapHeight,
    HalfCapHeight,
    XHeight,
    HalfXHeight,
    #[default]
    Baseline,
}

impl TransformOrigin {
    fn from_index(idx: i64) -> Option<TransformOrigin> {
        Some(match idx {
            0 => TransformOrigin::CapHeight,
            1 => TransformOrigin::HalfCapHeight,
            2 => TransformOrigin::XHeight,
            3 => TransformOrigin::HalfXHeight,
            4 => TransformOrigin::Baseline,
            _ => return None,
        })
    }

    fn y(self, font: &Font) -> f64 {
        let info = &font.info;
        match self {
            TransformOrigin::CapHeight => info.get_f64("capHeight").unwrap_or_default(),
            TransformOrigin::HalfCapHeight => info.get_f64("capHeight").unwrap_or_default() / 2.0,
            TransformOrigin::XHeight => info.get_f64("xHeight").unwrap_or_default(),
            TransformOrigin::HalfXHeight => info.get_f64("xHeight").unwrap_or_default() / 2.0,
            TransformOrigin::Baseline => 0.0,
        }
    }
}

/// Offsets, scales (in percent) and slants (in degrees) outlines, anchors
/// and components.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformations {
    offset_x: f64,
    offset_y: f64,
    scale_x: f64,
    scale_y: f64,
    slant: f64,
    origin: TransformOrigin,
}

impl Default for Transformations {
    fn default() -> Self {
        Transformations {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 100.0,
            scale_y: 100.0,
            slant: 0.0,
            origin: TransformOrigin::Baseline,
        }
    }
}

impl Transformations {
    pub fn from_options(options: &Options) -> Result<Self, Error> {
        let bad_option = |key: &str, reason: &str| Error::FilterResolution {
            name: "transformations".to_string(),
            reason: format!("'{key}' {reason}"),
        };
        let mut filter = Transformations::default();
        for (key, value) in options {
            let number = || value.as_f64().ok_or_else(|| bad_option(key, "must be a number"));
            match key.as_str() {
                "OffsetX" => filter.offset_x = number()?,
                "OffsetY" => filter.offset_y = number()?,
                "ScaleX" => filter.scale_x = number()?,
                "ScaleY" => filter.scale_y = number()?,
                "Slant" => filter.slant = number()?,
                "Origin" => {
                    filter.origin = value
                        .as_f64()
                        .and_then(|v| TransformOrigin::from_index(v as i64))
                        .ok_or_else(|| bad_option(key, "must be 0 to 4"))?
                }
                _ => warn!("transformations ignores unknown option '{key}'"),
            }
        }
        if filter.scale_x == 0.0 || filter.scale_y == 0.0 {
            return Err(bad_option("Scale", "must not be zero"));
        }
        Ok(filter)
    }

    fn affine(&self, origin_y: f64) -> Affine {
        Affine::translate((self.offset_x, self.offset_y))
            * Affine::translate((0.0, origin_y))
            * Affine::skew(self.slant.to_radians().tan(), 0.0)
            * Affine::scale_non_uniform(self.scale_x / 100.0, self.scale_y / 100.0)
            * Affine::translate((0.0, -origin_y))
    }

    fn is_identity(&self) -> bool {
        *self == Transformations {
            origin: self.origin,
            ..Default::default()
        }
    }
}

impl Filter for Transformations {
    fn name(&self) -> &str {
        "transformations"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        if self.is_identity() {
            return Ok(0);
        }
        let affine = self.affine(self.origin.y(font));
        let inverse = affine.inverse();
        let set = layer_glyphs_mut(font, layer)?;
        let mut modified = 0;
        for name in glyphs {
            let Some(glyph) = set.get_mut(name) else {
                continue;
            };
            for contour in glyph.contours.iter_mut() {
                contour.apply_affine(affine);
            }
            for anchor in glyph.anchors.iter_mut() {
                anchor.pos = affine * anchor.pos;
            }
            for component in glyph.components.iter_mut() {
                // a transformed base is drawn through the component, undo it once
                component.transform = if glyphs.contains(&component.base) {
                    affine * component.transform * inverse
                } else {
                    affine * component.transform
                };
            }
            modified += 1;
        }
        Ok(modified)
    }
}

/// Reverses every contour, keeping start points
#[derive(Debug)]
pub struct ReverseContourDirection;

impl Filter for ReverseContourDirection {
    fn name(&self) -> &str {
        "reverseContourDirection"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        let set = layer_glyphs_mut(font, layer)?;
        let mut modified = 0;
        for name in glyphs {
            let Some(glyph) = set.get_mut(name) else {
                continue;
            };
            if glyph.contours.is_empty() {
                continue;
            }
            glyph.contours = glyph.contours.iter().map(reverse_contour).collect();
            modified += 1;
        }
        Ok(modified)
    }
}

/// Copies anchors from components up into the composites that use them.
///
/// The first component contributes all its anchors. A mark component
/// (one with `_name` anchors) replaces `name` with its own, so stacked
/// marks move the attachment point up. Anchors the composite already
/// has are kept.
#[derive(Debug)]
pub struct PropagateAnchors;

type AnchorMap = IndexMap<String, Point>;

fn is_mark(anchors: &AnchorMap) -> bool {
    anchors.keys().any(|name| name.starts_with('_'))
}

struct Propagator<'a> {
    lookup: GlyphLookup<'a>,
    done: HashMap<GlyphName, AnchorMap>,
}

impl Propagator<'_> {
    fn anchors(&mut self, glyph: &Glyph, stack: &mut Vec<GlyphName>) -> Result<AnchorMap, Error> {
        if let Some(anchors) = self.done.get(&glyph.name) {
            return Ok(anchors.clone());
        }
        let mut propagated = AnchorMap::new();
        for (idx, component) in glyph.components.iter().enumerate() {
            if stack.contains(&component.base) {
                return Err(Error::ComponentError {
                    glyph: stack[0].clone(),
                    referenced_glyph: component.base.clone(),
                    problem: "component references form a cycle".to_string(),
                });
            }
            let Some(base) = self.lookup.get(component.base.as_str()) else {
                warn!(
                    "'{}' references missing glyph '{}', no anchors from it",
                    glyph.name, component.base
                );
                continue;
            };
            stack.push(component.base.clone());
            let base_anchors = self.anchors(base, stack)?;
            stack.pop();

            if idx == 0 || !is_mark(&base_anchors) {
                for (name, pos) in base_anchors.iter() {
                    if !name.starts_with('_') && !propagated.contains_key(name) {
                        propagated.insert(name.clone(), component.transform * *pos);
                    }
                }
            } else {
                for (name, pos) in base_anchors.iter() {
                    if !name.starts_with('_') && base_anchors.contains_key(&format!("_{name}")) {
                        propagated.insert(name.clone(), component.transform * *pos);
                    }
                }
            }
        }
        for anchor in glyph.anchors.iter() {
            propagated.insert(anchor.name.clone(), anchor.pos);
        }
        self.done.insert(glyph.name.clone(), propagated.clone());
        Ok(propagated)
    }
}

impl Filter for PropagateAnchors {
    fn name(&self) -> &str {
        "propagateAnchors"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        let mut propagator = Propagator {
            lookup: GlyphLookup::new(font, layer)?,
            done: Default::default(),
        };
        let mut updates = Vec::new();
        for name in glyphs {
            let Some(glyph) = propagator.lookup.get(name.as_str()) else {
                continue;
            };
            if glyph.components.is_empty() {
                continue;
            }
            let anchors: Vec<Anchor> = propagator
                .anchors(glyph, &mut vec![name.clone()])?
                .into_iter()
                .map(|(name, pos)| Anchor::new(name, pos))
                .collect();
            if anchors != glyph.anchors {
                updates.push((name.clone(), anchors));
            }
        }

        let set = layer_glyphs_mut(font, layer)?;
        let modified = updates.len();
        for (name, anchors) in updates {
            if let Some(glyph) = set.get_mut(&name) {
                glyph.anchors = anchors;
            }
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Shape;
    use millir::font::Component;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{declaration::OptionValue, filters::test_util::square};

    fn all(font: &Font) -> BTreeSet<GlyphName> {
        font.glyphs.keys().cloned().collect()
    }

    fn anchored(name: &str, anchors: &[(&str, f64, f64)]) -> Glyph {
        let mut glyph = Glyph::new(name).with_contour(square(0.0, 0.0, 100.0));
        glyph.anchors = anchors
            .iter()
            .map(|(n, x, y)| Anchor::new(*n, (*x, *y)))
            .collect();
        glyph
    }

    fn anchor_list(glyph: &Glyph) -> Vec<(String, f64, f64)> {
        glyph
            .anchors
            .iter()
            .map(|a| (a.name.clone(), a.pos.x, a.pos.y))
            .collect()
    }

    #[test]
    fn transformation_options() {
        let options = Options::from([
            ("OffsetX".to_string(), OptionValue::Int(10)),
            ("ScaleY".to_string(), OptionValue::Float(50.0)),
            ("Origin".to_string(), OptionValue::Int(2)),
        ]);
        assert_eq!(
            Transformations {
                offset_x: 10.0,
                scale_y: 50.0,
                origin: TransformOrigin::XHeight,
                ..Default::default()
            },
            Transformations::from_options(&options).unwrap()
        );
    }

    #[test]
    fn zero_scale_is_rejected() {
        let options = Options::from([("ScaleX".to_string(), OptionValue::Int(0))]);
        assert!(Transformations::from_options(&options).is_err());
    }

    #[test]
    fn offsets_and_scales() {
        let mut font = Font::new();
        font.add_glyph(anchored("a", &[("top", 50.0, 100.0)]));
        font.add_glyph(
            Glyph::new("b").with_component(Component::new("a", Affine::translate((100.0, 0.0)))),
        );
        let filter = Transformations {
            offset_x: 10.0,
            scale_x: 50.0,
            ..Default::default()
        };
        let glyphs = all(&font);
        assert_eq!(2, filter.filter(&mut font, None, &glyphs).unwrap());

        let a = &font.glyphs["a"];
        assert_eq!(kurbo::Rect::new(10.0, 0.0, 60.0, 100.0), a.contours[0].bounding_box());
        assert_eq!(Point::new(35.0, 100.0), a.anchors[0].pos);
        // the composite lands where transforming its decomposed outline would put it
        assert_eq!(
            Affine::translate((50.0, 0.0)),
            font.glyphs["b"].components[0].transform
        );
    }

    #[test]
    fn identity_does_nothing() {
        let mut font = Font::new();
        font.add_glyph(anchored("a", &[]));
        let glyphs = all(&font);
        assert_eq!(0, Transformations::default().filter(&mut font, None, &glyphs).unwrap());
    }

    #[test]
    fn reverses_contours() {
        let mut font = Font::new();
        font.add_glyph(anchored("a", &[]));
        let area = font.glyphs["a"].contours[0].area();
        let glyphs = all(&font);
        ReverseContourDirection.filter(&mut font, None, &glyphs).unwrap();
        assert_eq!(-area, font.glyphs["a"].contours[0].area());
    }

    #[test]
    fn propagates_through_stacked_marks() {
        let mut font = Font::new();
        font.add_glyph(anchored("a", &[("top", 250.0, 500.0), ("bottom", 250.0, 0.0)]));
        font.add_glyph(anchored(
            "acutecomb",
            &[("_top", 0.0, 500.0), ("top", 0.0, 700.0)],
        ));
        font.add_glyph(
            Glyph::new("aacute")
                .with_component(Component::new("a", Affine::IDENTITY))
                .with_component(Component::new(
                    "acutecomb",
                    Affine::translate((250.0, 0.0)),
                )),
        );
        let mut doubled = Glyph::new("aacute.double")
            .with_component(Component::new("aacute", Affine::IDENTITY))
            .with_component(Component::new(
                "acutecomb",
                Affine::translate((250.0, 200.0)),
            ));
        doubled.anchors.push(Anchor::new("bottom", (10.0, 10.0)));
        font.add_glyph(doubled);

        let glyphs = all(&font);
        assert_eq!(2, PropagateAnchors.filter(&mut font, None, &glyphs).unwrap());
        assert_eq!(
            vec![
                ("top".to_string(), 250.0, 700.0),
                ("bottom".to_string(), 250.0, 0.0)
            ],
            anchor_list(&font.glyphs["aacute"])
        );
        assert_eq!(
            vec![
                ("top".to_string(), 250.0, 900.0),
                ("bottom".to_string(), 10.0, 10.0)
            ],
            anchor_list(&font.glyphs["aacute.double"])
        );
    }
}

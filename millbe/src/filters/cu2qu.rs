use std::collections::BTreeSet;

use log::warn;
use millcore::types::GlyphName;
use millir::font::Font;

use crate::{
    declaration::Options,
    error::Error,
    filters::{layer_glyphs_mut, Filter},
    outline::{convert_glyph, DEFAULT_CONVERSION_ERROR},
};

/// Converts cubic curves to quadratic, one glyph at a time.
///
/// Options: `conversionError`, relative to the em, and `reverseDirection`.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicToQuadratic {
    conversion_error: f64,
    reverse_direction: bool,
}

impl Default for CubicToQuadratic {
    fn default() -> Self {
        CubicToQuadratic {
            conversion_error: DEFAULT_CONVERSION_ERROR,
            reverse_direction: true,
        }
    }
}

impl CubicToQuadratic {
    pub fn from_options(options: &Options) -> Result<Self, Error> {
        let bad_option = |key: &str, expected: &str| Error::FilterResolution {
            name: "cubicToQuadratic".to_string(),
            reason: format!("'{key}' must be {expected}"),
        };
        let mut filter = CubicToQuadratic::default();
        for (key, value) in options {
            match key.as_str() {
                "conversionError" => {
                    filter.conversion_error = value
                        .as_f64()
                        .filter(|v| *v > 0.0)
                        .ok_or_else(|| bad_option(key, "a positive number"))?;
                }
                "reverseDirection" => {
                    filter.reverse_direction =
                        value.as_bool().ok_or_else(|| bad_option(key, "a bool"))?;
                }
                _ => warn!("cubicToQuadratic ignores unknown option '{key}'"),
            }
        }
        Ok(filter)
    }
}

impl Filter for CubicToQuadratic {
    fn name(&self) -> &str {
        "cubicToQuadratic"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        let accuracy = self.conversion_error * font.info.units_per_em();
        let set = layer_glyphs_mut(font, layer)?;
        let mut modified = 0;
        for name in glyphs {
            let Some(glyph) = set.get_mut(name) else {
                continue;
            };
            if convert_glyph(glyph, accuracy, self.reverse_direction)? {
                modified += 1;
            }
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{BezPath, PathEl, Shape};
    use millir::font::Glyph;

    use super::*;
    use crate::declaration::OptionValue;

    fn has_cubics(path: &BezPath) -> bool {
        path.elements()
            .iter()
            .any(|el| matches!(el, PathEl::CurveTo(..)))
    }

    fn font() -> Font {
        let mut font = Font::new();
        font.add_glyph(
            Glyph::new("o").with_contour(
                BezPath::from_svg("M0,0 C0,100 100,200 200,200 L200,0 Z").unwrap(),
            ),
        );
        font.add_glyph(Glyph::new("space"));
        font
    }

    #[test]
    fn options() {
        let options = Options::from([
            ("conversionError".to_string(), OptionValue::Float(0.002)),
            ("reverseDirection".to_string(), OptionValue::Bool(false)),
        ]);
        assert_eq!(
            CubicToQuadratic {
                conversion_error: 0.002,
                reverse_direction: false
            },
            CubicToQuadratic::from_options(&options).unwrap()
        );
    }

    #[test]
    fn bad_option() {
        let options = Options::from([(
            "reverseDirection".to_string(),
            OptionValue::Str("yes".into()),
        )]);
        assert!(matches!(
            CubicToQuadratic::from_options(&options),
            Err(Error::FilterResolution { .. })
        ));
    }

    #[test]
    fn converts_and_reverses() {
        let mut font = font();
        let area = font.glyphs["o"].contours[0].area();
        let glyphs = font.glyphs.keys().cloned().collect();
        let modified = CubicToQuadratic::default()
            .filter(&mut font, None, &glyphs)
            .unwrap();
        assert_eq!(1, modified);
        let converted = &font.glyphs["o"].contours[0];
        assert!(!has_cubics(converted));
        assert!(area * converted.area() < 0.0);
    }

    #[test]
    fn keeps_direction_when_asked() {
        let mut font = font();
        let area = font.glyphs["o"].contours[0].area();
        let glyphs = font.glyphs.keys().cloned().collect();
        CubicToQuadratic {
            reverse_direction: false,
            ..Default::default()
        }
        .filter(&mut font, None, &glyphs)
        .unwrap();
        assert!(area * font.glyphs["o"].contours[0].area() > 0.0);
    }
}

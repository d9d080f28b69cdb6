//! Writes a GDEF table statement with glyph classes and ligature carets.

use std::fmt::Write;

use millcore::types::GlyphName;
use millir::font::{ot_round, Font};

use crate::{
    error::Error,
    features::{
        export_glyphs, glyph_categories, glyph_class, FeatureBlock, FeatureWriter, Generated,
        GlyphCategory,
    },
};

#[derive(Debug)]
pub struct GdefFeatureWriter;

fn carets(font: &Font, name: &GlyphName) -> Vec<i32> {
    let Some(glyph) = font.glyph(name.as_str()) else {
        return Vec::new();
    };
    let mut carets: Vec<(usize, i32)> = glyph
        .anchors
        .iter()
        .filter_map(|a| {
            let idx = a.name.strip_prefix("caret_")?.parse::<usize>().ok()?;
            Some((idx, ot_round(a.pos.x) as i32))
        })
        .collect();
    carets.sort();
    carets.into_iter().map(|(_, x)| x).collect()
}

impl FeatureWriter for GdefFeatureWriter {
    fn name(&self) -> &str {
        "gdef"
    }

    fn generate(&self, font: &Font) -> Result<Generated, Error> {
        let categories = glyph_categories(font);
        if categories.is_empty() {
            return Ok(Generated::default());
        }
        // glyph order, not name order
        let class = |category: GlyphCategory| -> String {
            let members: Vec<_> = export_glyphs(font)
                .map(|g| &g.name)
                .filter(|name| categories.get(*name) == Some(&category))
                .collect();
            if members.is_empty() {
                String::new()
            } else {
                glyph_class(members)
            }
        };

        let mut text = String::from("table GDEF {\n");
        let _ = writeln!(
            text,
            "    GlyphClassDef {}, {}, {}, {};",
            class(GlyphCategory::Base),
            class(GlyphCategory::Ligature),
            class(GlyphCategory::Mark),
            class(GlyphCategory::Component)
        );
        for (name, category) in categories.iter() {
            if *category != GlyphCategory::Ligature {
                continue;
            }
            let carets = carets(font, name);
            if carets.is_empty() {
                continue;
            }
            let carets: Vec<_> = carets.iter().map(|x| x.to_string()).collect();
            let _ = writeln!(text, "    LigatureCaretByPos {name} {};", carets.join(" "));
        }
        text.push_str("} GDEF;\n");

        Ok(Generated {
            prelude: String::new(),
            blocks: vec![FeatureBlock::new("GDEF", text)],
        })
    }
}

#[cfg(test)]
mod tests {
    use millir::font::{Anchor, Glyph};
    use pretty_assertions::assert_eq;

    use super::*;

    fn glyph(name: &str, anchors: &[(&str, f64)]) -> Glyph {
        let mut glyph = Glyph::new(name);
        glyph.anchors = anchors
            .iter()
            .map(|(n, x)| Anchor::new(*n, (*x, 0.0)))
            .collect();
        glyph
    }

    #[test]
    fn classes_from_anchors() {
        let mut font = Font::new();
        font.add_glyph(glyph("b", &[("top", 0.0)]));
        font.add_glyph(glyph("a", &[("top", 0.0)]));
        font.add_glyph(glyph("f_f_i", &[("top_1", 0.0), ("caret_2", 600.4), ("caret_1", 300.0)]));
        font.add_glyph(glyph("acutecomb", &[("_top", 0.0)]));
        font.add_glyph(glyph("space", &[]));

        let generated = GdefFeatureWriter.generate(&font).unwrap();
        assert_eq!(
            vec![FeatureBlock::new(
                "GDEF",
                "table GDEF {\n    GlyphClassDef [b a], [f_f_i], [acutecomb], ;\n    LigatureCaretByPos f_f_i 300 600;\n} GDEF;\n"
            )],
            generated.blocks
        );
    }

    #[test]
    fn nothing_to_classify() {
        let mut font = Font::new();
        font.add_glyph(glyph("space", &[]));
        assert!(GdefFeatureWriter.generate(&font).unwrap().is_empty());
    }
}

//! Writes `mark` and `mkmk` from anchors.
//!
//! An anchor `_name` on a mark glyph puts it in mark class `@MC_name`. Bases
//! attach with `name`, ligature components with `name_1`, `name_2` and so on,
//! and marks carrying `name` stack further marks.

use std::{collections::BTreeMap, fmt::Write};

use kurbo::Point;
use millcore::types::GlyphName;
use millir::font::{ot_round, Font, Glyph};

use crate::{
    error::Error,
    features::{
        class_name, export_glyphs, glyph_categories, glyph_class, ligature_anchor, FeatureBlock,
        FeatureWriter, GlyphCategory, Generated,
    },
};

#[derive(Debug)]
pub struct MarkFeatureWriter;

fn fea_anchor(pos: Point) -> String {
    let x = ot_round(pos.x) as i32;
    let y = ot_round(pos.y) as i32;
    format!("<anchor {x} {y}>")
}

/// Marks by attachment anchor name, each with its `_name` position
type MarkClasses<'a> = BTreeMap<&'a str, Vec<(&'a GlyphName, Point)>>;

fn mark_classes<'a>(marks: &[&'a Glyph]) -> MarkClasses<'a> {
    let mut classes = MarkClasses::new();
    for glyph in marks {
        for anchor in glyph.anchors.iter() {
            if let Some(name) = anchor.name.strip_prefix('_') {
                classes
                    .entry(name)
                    .or_default()
                    .push((&glyph.name, anchor.pos));
            }
        }
    }
    classes
}

fn mark2base(classes: &MarkClasses, bases: &[&Glyph]) -> Vec<(String, String)> {
    let mut lookups = Vec::new();
    for anchor_name in classes.keys() {
        let mut body = String::new();
        for base in bases {
            if let Some(anchor) = base.anchor(anchor_name) {
                let _ = writeln!(
                    body,
                    "    pos base {} {} mark @MC_{};",
                    base.name,
                    fea_anchor(anchor.pos),
                    class_name(anchor_name)
                );
            }
        }
        if !body.is_empty() {
            lookups.push((format!("mark2base_{}", class_name(anchor_name)), body));
        }
    }
    lookups
}

fn mark2liga(classes: &MarkClasses, ligatures: &[&Glyph]) -> Vec<(String, String)> {
    let mut lookups = Vec::new();
    for anchor_name in classes.keys() {
        let mut body = String::new();
        for liga in ligatures {
            let positions: BTreeMap<usize, Point> = liga
                .anchors
                .iter()
                .filter_map(|a| match ligature_anchor(&a.name) {
                    Some((name, idx)) if name == *anchor_name => Some((idx, a.pos)),
                    _ => None,
                })
                .collect();
            let Some(num_components) = positions.keys().max().copied() else {
                continue;
            };
            let components: Vec<String> = (1..=num_components)
                .map(|idx| match positions.get(&idx) {
                    Some(pos) => format!("{} mark @MC_{}", fea_anchor(*pos), class_name(anchor_name)),
                    None => "<anchor NULL>".to_string(),
                })
                .collect();
            let _ = writeln!(
                body,
                "    pos ligature {} {};",
                liga.name,
                components.join("\n        ligComponent ")
            );
        }
        if !body.is_empty() {
            lookups.push((format!("mark2liga_{}", class_name(anchor_name)), body));
        }
    }
    lookups
}

fn mark2mark(classes: &MarkClasses, marks: &[&Glyph]) -> Vec<(String, String, String)> {
    let mut lookups = Vec::new();
    for (anchor_name, members) in classes.iter() {
        let mut body = String::new();
        for mark in marks {
            if let Some(anchor) = mark.anchor(anchor_name) {
                let _ = writeln!(
                    body,
                    "    pos mark {} {} mark @MC_{};",
                    mark.name,
                    fea_anchor(anchor.pos),
                    class_name(anchor_name)
                );
            }
        }
        if !body.is_empty() {
            let filter_set = glyph_class(members.iter().map(|(name, _)| *name));
            lookups.push((
                format!("mark2mark_{}", class_name(anchor_name)),
                filter_set,
                body,
            ));
        }
    }
    lookups
}

fn lookup_block(name: &str, flags: Option<&str>, body: &str) -> String {
    let mut text = format!("lookup {name} {{\n");
    if let Some(flags) = flags {
        let _ = writeln!(text, "    lookupflag {flags};");
    }
    text.push_str(body);
    let _ = writeln!(text, "}} {name};");
    text
}

fn feature_block<'a>(tag: &str, lookups: impl Iterator<Item = &'a str>) -> String {
    let mut text = format!("feature {tag} {{\n");
    for lookup in lookups {
        let _ = writeln!(text, "    lookup {lookup};");
    }
    let _ = writeln!(text, "}} {tag};");
    text
}

impl FeatureWriter for MarkFeatureWriter {
    fn name(&self) -> &str {
        "mark"
    }

    fn generate(&self, font: &Font) -> Result<Generated, Error> {
        let categories = glyph_categories(font);
        let mut marks = Vec::new();
        let mut bases = Vec::new();
        let mut ligatures = Vec::new();
        for glyph in export_glyphs(font) {
            match categories.get(&glyph.name) {
                Some(GlyphCategory::Mark) => marks.push(glyph),
                Some(GlyphCategory::Ligature) => ligatures.push(glyph),
                Some(GlyphCategory::Base) | None => bases.push(glyph),
                Some(GlyphCategory::Component) => (),
            }
        }
        let classes = mark_classes(&marks);
        if classes.is_empty() {
            return Ok(Generated::default());
        }

        let mut prelude = String::new();
        for (anchor_name, members) in classes.iter() {
            for (glyph, pos) in members {
                let _ = writeln!(
                    prelude,
                    "markClass {glyph} {} @MC_{};",
                    fea_anchor(*pos),
                    class_name(anchor_name)
                );
            }
        }

        let mut blocks = Vec::new();
        let attach: Vec<_> = mark2base(&classes, &bases)
            .into_iter()
            .chain(mark2liga(&classes, &ligatures))
            .collect();
        if !attach.is_empty() {
            let mut text = String::new();
            for (name, body) in attach.iter() {
                text.push_str(&lookup_block(name, None, body));
                text.push('\n');
            }
            text.push_str(&feature_block("mark", attach.iter().map(|(n, _)| n.as_str())));
            blocks.push(FeatureBlock::new("mark", text));
        }

        let stacking = mark2mark(&classes, &marks);
        if !stacking.is_empty() {
            let mut text = String::new();
            for (name, filter_set, body) in stacking.iter() {
                let set_name = format!("MFS_{name}");
                let _ = writeln!(text, "@{set_name} = {filter_set};\n");
                text.push_str(&lookup_block(
                    name,
                    Some(&format!("UseMarkFilteringSet @{set_name}")),
                    body,
                ));
                text.push('\n');
            }
            text.push_str(&feature_block("mkmk", stacking.iter().map(|(n, _, _)| n.as_str())));
            blocks.push(FeatureBlock::new("mkmk", text));
        }

        // mark classes alone compile to nothing
        if blocks.is_empty() {
            return Ok(Generated::default());
        }
        Ok(Generated { prelude, blocks })
    }
}

#[cfg(test)]
mod tests {
    use millir::font::Anchor;
    use pretty_assertions::assert_eq;

    use super::*;

    fn glyph(name: &str, anchors: &[(&str, f64, f64)]) -> Glyph {
        let mut glyph = Glyph::new(name);
        glyph.anchors = anchors
            .iter()
            .map(|(n, x, y)| Anchor::new(*n, (*x, *y)))
            .collect();
        glyph
    }

    fn marked_font() -> Font {
        let mut font = Font::new();
        font.add_glyph(glyph("a", &[("top", 250.0, 500.4)]));
        font.add_glyph(glyph("f_i", &[("top_1", 100.0, 700.0), ("top_2", 400.0, 700.0)]));
        font.add_glyph(glyph("acutecomb", &[("_top", 0.0, 500.0), ("top", 0.0, 700.0)]));
        font.add_glyph(glyph("gravecomb", &[("_top", 0.0, 500.0)]));
        font.add_glyph(glyph("space", &[]));
        font
    }

    #[test]
    fn no_marks_no_features() {
        let mut font = Font::new();
        font.add_glyph(glyph("a", &[("top", 250.0, 500.0)]));
        assert!(MarkFeatureWriter.generate(&font).unwrap().is_empty());
    }

    #[test]
    fn mark_classes_and_attachment() {
        let generated = MarkFeatureWriter.generate(&marked_font()).unwrap();
        assert_eq!(
            "markClass acutecomb <anchor 0 500> @MC_top;\nmarkClass gravecomb <anchor 0 500> @MC_top;\n",
            generated.prelude
        );
        assert_eq!(
            vec!["mark", "mkmk"],
            generated.blocks.iter().map(|b| b.tag.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(
            "lookup mark2base_top {\n    pos base a <anchor 250 500> mark @MC_top;\n} mark2base_top;\n\n\
             lookup mark2liga_top {\n    pos ligature f_i <anchor 100 700> mark @MC_top\n        ligComponent <anchor 400 700> mark @MC_top;\n} mark2liga_top;\n\n\
             feature mark {\n    lookup mark2base_top;\n    lookup mark2liga_top;\n} mark;\n",
            generated.blocks[0].text
        );
        assert_eq!(
            "@MFS_mark2mark_top = [acutecomb gravecomb];\n\n\
             lookup mark2mark_top {\n    lookupflag UseMarkFilteringSet @MFS_mark2mark_top;\n    pos mark acutecomb <anchor 0 700> mark @MC_top;\n} mark2mark_top;\n\n\
             feature mkmk {\n    lookup mark2mark_top;\n} mkmk;\n",
            generated.blocks[1].text
        );
    }

    #[test]
    fn missing_ligature_component_is_null() {
        let mut font = marked_font();
        font.glyphs["f_i"].anchors.retain(|a| a.name != "top_1");
        font.glyphs["f_i"].anchors.push(Anchor::new("top_3", (600.0, 700.0)));
        let generated = MarkFeatureWriter.generate(&font).unwrap();
        assert!(generated.blocks[0].text.contains(
            "pos ligature f_i <anchor NULL>\n        ligComponent <anchor 400 700> mark @MC_top\n        ligComponent <anchor 600 700> mark @MC_top;"
        ));
    }
}

//! Writes a `kern` feature from the font's kerning and kerning groups.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
};

use log::warn;
use millcore::types::GlyphName;
use millir::font::{ot_round, Font};

use crate::{
    declaration::Options,
    error::Error,
    features::{class_name, export_glyphs, glyph_class, FeatureBlock, FeatureWriter, Generated},
};

const KERN1_PREFIX: &str = "public.kern1.";
const KERN2_PREFIX: &str = "public.kern2.";

#[derive(Debug, Clone, PartialEq)]
pub struct KernFeatureWriter {
    /// Values are rounded to a multiple of this
    quantization: u16,
    ignore_marks: bool,
}

impl Default for KernFeatureWriter {
    fn default() -> Self {
        KernFeatureWriter {
            quantization: 1,
            ignore_marks: true,
        }
    }
}

impl KernFeatureWriter {
    pub fn from_options(options: &Options) -> Result<Self, Error> {
        let bad_option = |key: &str, expected: &str| Error::FeatureWriterResolution {
            name: "kern".to_string(),
            reason: format!("'{key}' must be {expected}"),
        };
        let mut writer = KernFeatureWriter::default();
        for (key, value) in options {
            match key.as_str() {
                "quantization" => {
                    writer.quantization = value
                        .as_f64()
                        .filter(|v| v.fract() == 0.0 && *v >= 1.0 && *v <= u16::MAX as f64)
                        .map(|v| v as u16)
                        .ok_or_else(|| bad_option(key, "a positive integer"))?;
                }
                "ignoreMarks" => {
                    writer.ignore_marks = value.as_bool().ok_or_else(|| bad_option(key, "a bool"))?;
                }
                _ => warn!("kern writer ignores unknown option '{key}'"),
            }
        }
        Ok(writer)
    }

    fn quantize(&self, value: f64) -> i32 {
        let q = self.quantization as f64;
        let steps = ot_round(value / q) as i32;
        steps * self.quantization as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Glyph(GlyphName),
    Class(String),
}

impl Side {
    fn fea(&self) -> String {
        match self {
            Side::Glyph(name) => name.to_string(),
            Side::Class(name) => format!("@{name}"),
        }
    }
}

impl FeatureWriter for KernFeatureWriter {
    fn name(&self) -> &str {
        "kern"
    }

    fn generate(&self, font: &Font) -> Result<Generated, Error> {
        if font.kerning.is_empty() {
            return Ok(Generated::default());
        }
        let exported: BTreeSet<GlyphName> = export_glyphs(font).map(|g| g.name.clone()).collect();

        // groups restricted to glyphs that make it into the font
        let mut classes: BTreeMap<String, (String, Vec<&GlyphName>)> = BTreeMap::new();
        for (group, members) in font.groups.iter() {
            if !(group.starts_with(KERN1_PREFIX) || group.starts_with(KERN2_PREFIX)) {
                continue;
            }
            let members: Vec<_> = members.iter().filter(|m| exported.contains(*m)).collect();
            if members.is_empty() {
                continue;
            }
            let fea_name = class_name(group.strip_prefix("public.").unwrap_or(group));
            classes.insert(group.clone(), (fea_name, members));
        }

        let side = |name: &str, prefix: &str| -> Option<Side> {
            if name.starts_with(prefix) {
                classes.get(name).map(|(fea, _)| Side::Class(fea.clone()))
            } else {
                exported.get(name).map(|glyph| Side::Glyph(glyph.clone()))
            }
        };

        let mut glyph_pairs = Vec::new();
        let mut exceptions = Vec::new();
        let mut class_pairs = Vec::new();
        let mut used_classes = BTreeSet::new();
        for ((left, right), value) in font.kerning.iter() {
            let (Some(first), Some(second)) = (side(left, KERN1_PREFIX), side(right, KERN2_PREFIX))
            else {
                warn!("Dropping kerning {left} {right}, a side is missing or not exported");
                continue;
            };
            let value = self.quantize(*value);
            for side in [&first, &second] {
                if let Side::Class(name) = side {
                    used_classes.insert(name.clone());
                }
            }
            match (&first, &second) {
                (Side::Glyph(_), Side::Glyph(_)) => glyph_pairs.push((first, second, value)),
                (Side::Class(_), Side::Class(_)) => class_pairs.push((first, second, value)),
                _ => exceptions.push((first, second, value)),
            }
        }
        if glyph_pairs.is_empty() && exceptions.is_empty() && class_pairs.is_empty() {
            return Ok(Generated::default());
        }

        let mut prelude = String::new();
        for (fea_name, members) in classes.values() {
            if used_classes.contains(fea_name) {
                let _ = writeln!(prelude, "@{fea_name} = {};", glyph_class(members.iter().copied()));
            }
        }

        let mut text = String::from("lookup kern_ltr {\n");
        if self.ignore_marks {
            text.push_str("    lookupflag IgnoreMarks;\n");
        }
        for (first, second, value) in glyph_pairs.iter() {
            let _ = writeln!(text, "    pos {} {} {value};", first.fea(), second.fea());
        }
        for (first, second, value) in exceptions.iter() {
            let _ = writeln!(text, "    enum pos {} {} {value};", first.fea(), second.fea());
        }
        for (first, second, value) in class_pairs.iter() {
            let _ = writeln!(text, "    pos {} {} {value};", first.fea(), second.fea());
        }
        text.push_str("} kern_ltr;\n\nfeature kern {\n    lookup kern_ltr;\n} kern;\n");

        Ok(Generated {
            prelude,
            blocks: vec![FeatureBlock::new("kern", text)],
        })
    }
}

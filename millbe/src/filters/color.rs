//! Turn color layers into standalone glyphs.

use std::collections::BTreeSet;

use log::warn;
use millcore::types::GlyphName;
use millir::font::{Font, Glyph};

use crate::{error::Error, filters::Filter};

/// Lib key, on the font or a glyph, listing `[layer name, palette index]` pairs
pub const COLOR_LAYER_MAPPING: &str = "com.github.googlei18n.ufo2ft.colorLayerMapping";

/// Font lib key the exploded layers are recorded under, for COLR
pub const COLOR_LAYERS: &str = "com.github.googlei18n.ufo2ft.colorLayers";

fn parse_mapping(value: &plist::Value) -> Option<Vec<(String, i64)>> {
    value
        .as_array()?
        .iter()
        .map(|entry| {
            let pair = entry.as_array()?;
            match pair.as_slice() {
                [layer, index] => Some((
                    layer.as_string()?.to_string(),
                    index.as_signed_integer()?,
                )),
                _ => None,
            }
        })
        .collect()
}

fn unique_name(font: &Font, base: &str, idx: usize) -> GlyphName {
    let mut suffix = idx;
    loop {
        let candidate = GlyphName::new(format!("{base}.color{suffix}"));
        if !font.glyphs.contains_key(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Copies each color layer of a glyph into a new default layer glyph.
///
/// Only runs on the default layer.
#[derive(Debug)]
pub struct ExplodeColorLayerGlyphs;

impl Filter for ExplodeColorLayerGlyphs {
    fn name(&self) -> &str {
        "explodeColorLayerGlyphs"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        if layer.is_some() {
            return Ok(0);
        }
        let font_mapping = font.lib.get(COLOR_LAYER_MAPPING).cloned();

        let mut color_layers = font
            .lib
            .get(COLOR_LAYERS)
            .and_then(plist::Value::as_dictionary)
            .cloned()
            .unwrap_or_default();
        let mut new_glyphs = Vec::new();
        let mut modified = 0;

        for name in glyphs {
            let Some(glyph) = font.glyphs.get(name) else {
                continue;
            };
            let Some(value) = glyph.lib.get(COLOR_LAYER_MAPPING).or(font_mapping.as_ref()) else {
                continue;
            };
            let mapping = parse_mapping(value).ok_or_else(|| Error::Filter {
                filter: self.name().to_string(),
                glyph: name.clone(),
                reason: format!("malformed {COLOR_LAYER_MAPPING}"),
            })?;

            let mut entries = Vec::new();
            for (layer_name, palette_index) in mapping {
                let Some(layer_glyph) = font.layers.get(&layer_name).and_then(|l| l.get(name))
                else {
                    warn!("'{name}' has no glyph in color layer '{layer_name}'");
                    continue;
                };
                let new_name = unique_name(font, name.as_str(), entries.len());
                let mut exploded = Glyph {
                    name: new_name.clone(),
                    codepoints: Vec::new(),
                    lib: Default::default(),
                    ..layer_glyph.clone()
                };
                exploded.width = glyph.width;
                new_glyphs.push(exploded);
                entries.push(plist::Value::Array(vec![
                    plist::Value::String(new_name.to_string()),
                    plist::Value::Integer(palette_index.into()),
                ]));
            }
            if !entries.is_empty() {
                color_layers.insert(name.to_string(), plist::Value::Array(entries));
                modified += 1;
            }
        }

        for glyph in new_glyphs {
            font.add_glyph(glyph);
        }
        if modified > 0 {
            font.lib
                .insert(COLOR_LAYERS.to_string(), plist::Value::Dictionary(color_layers));
        }
        Ok(modified)
    }
}

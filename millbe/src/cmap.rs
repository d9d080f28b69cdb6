//! Generates a [cmap](https://learn.microsoft.com/en-us/typography/opentype/spec/cmap) table.

use std::collections::{btree_map::Entry, BTreeMap};

use log::warn;
use millcore::types::GlyphName;
use millir::font::Font;
use write_fonts::{tables::cmap::Cmap, types::GlyphId};

use crate::error::Error;

/// Codepoint to glyph id; the first glyph in order to claim a codepoint keeps it
pub(crate) fn codepoint_mappings(font: &Font, glyph_order: &[GlyphName]) -> BTreeMap<char, u32> {
    let mut mappings = BTreeMap::new();
    for (gid, name) in glyph_order.iter().enumerate() {
        let Some(glyph) = font.glyph(name.as_str()) else {
            continue;
        };
        for c in glyph.codepoints.iter() {
            match mappings.entry(*c) {
                Entry::Vacant(entry) => {
                    entry.insert(gid as u32);
                }
                Entry::Occupied(entry) => warn!(
                    "U+{:04X} is claimed by '{}' and '{name}', keeping '{}'",
                    *c as u32, glyph_order[*entry.get() as usize], glyph_order[*entry.get() as usize]
                ),
            }
        }
    }
    mappings
}

pub(crate) fn build_cmap(mappings: &BTreeMap<char, u32>) -> Result<Cmap, Error> {
    Cmap::from_mappings(mappings.iter().map(|(c, gid)| (*c, GlyphId::new(*gid)))).map_err(|e| {
        Error::Table {
            table: "cmap".to_string(),
            reason: format!("{e:?}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use millir::font::Glyph;

    use super::*;

    #[test]
    fn first_claim_wins() {
        let mut font = Font::new();
        font.add_glyph(Glyph::new(".notdef"));
        font.add_glyph(Glyph::new("A").with_codepoint('A'));
        font.add_glyph(Glyph::new("A.alt").with_codepoint('A').with_codepoint('\u{0391}'));
        let order: Vec<_> = font.glyph_order().cloned().collect();
        let mappings = codepoint_mappings(&font, &order);
        assert_eq!(BTreeMap::from([('A', 1), ('\u{0391}', 2)]), mappings);
        build_cmap(&mappings).unwrap();
    }
}

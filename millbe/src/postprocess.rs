//! Glyph set changes made just before assembly: subsetting and production names.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, warn};
use millcore::types::GlyphName;
use millir::font::{
    Font, GlyphSet, GLYPHS_EXPORT, GLYPH_POSTSCRIPT_NAME, POSTSCRIPT_NAMES, SKIP_EXPORT_GLYPHS,
};
use regex::Regex;

use crate::{error::Error, filters::decompose_glyph};

pub const KEEP_GLYPHS: &str = "com.schriftgestaltung.Keep Glyphs";
pub const DONT_USE_PRODUCTION_NAMES: &str = "com.schriftgestaltung.Don't use Production Names";

/// True if any glyph would be removed by [`subset`]
pub fn has_non_export_glyphs(font: &Font) -> bool {
    !glyphs_to_remove(font).is_empty()
}

/// Keep Glyphs entries may use `*` as a wildcard
fn keep_patterns(font: &Font) -> Option<Vec<Regex>> {
    let entries = font.lib.get(KEEP_GLYPHS)?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(plist::Value::as_string)
            .filter_map(|entry| {
                let pattern = format!("^{}$", regex::escape(entry).replace(r"\*", ".*"));
                match Regex::new(&pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Ignoring Keep Glyphs entry '{entry}': {e}");
                        None
                    }
                }
            })
            .collect(),
    )
}

fn glyphs_to_remove(font: &Font) -> BTreeSet<GlyphName> {
    let mut remove = font.skip_export_glyphs();
    if let Some(keep) = keep_patterns(font) {
        remove.extend(
            font.glyph_order()
                .filter(|name| !keep.iter().any(|re| re.is_match(name.as_str())))
                .cloned(),
        );
    }
    remove.remove(&GlyphName::NOTDEF);
    remove
}

/// Removes glyphs that must not be exported.
///
/// Components that reference a removed glyph are drawn into the glyph that
/// uses them. Kerning, groups and the postscript names map forget removed
/// glyphs. Returns the number of glyphs removed.
pub fn subset(font: &mut Font) -> Result<usize, Error> {
    let remove = glyphs_to_remove(font);
    if remove.is_empty() {
        return Ok(0);
    }
    debug!("Subsetting {} glyphs", remove.len());

    // Decompose references to removed glyphs while they still exist
    let mut updates = Vec::new();
    for glyph in font.glyphs.values() {
        if remove.contains(&glyph.name)
            || !glyph.components.iter().any(|c| remove.contains(&c.base))
        {
            continue;
        }
        let mut removed_only = glyph.clone();
        removed_only.contours.clear();
        removed_only
            .components
            .retain(|c| remove.contains(&c.base));
        let contours = decompose_glyph(font, &removed_only)?;
        updates.push((glyph.name.clone(), contours));
    }
    for (name, contours) in updates {
        if let Some(glyph) = font.glyph_mut(name.as_str()) {
            glyph.components.retain(|c| !remove.contains(&c.base));
            glyph.contours.extend(contours);
        }
    }

    let before = font.glyphs.len();
    font.glyphs.retain(|name, _| !remove.contains(name));
    for layer in font.layers.values_mut() {
        layer.retain(|name, _| !remove.contains(name));
    }
    let removed = before - font.glyphs.len();

    let is_removed = |name: &str| remove.contains(name);
    let removed_groups: HashSet<String> = font
        .groups
        .iter_mut()
        .filter_map(|(group, members)| {
            members.retain(|m| !remove.contains(m));
            members.is_empty().then(|| group.clone())
        })
        .collect();
    font.groups.retain(|group, _| !removed_groups.contains(group));
    font.kerning.retain(|(left, right), _| {
        !is_removed(left)
            && !is_removed(right)
            && !removed_groups.contains(left)
            && !removed_groups.contains(right)
    });

    if let Some(plist::Value::Dictionary(names)) = font.lib.get_mut(POSTSCRIPT_NAMES) {
        names.retain(|name, _| !is_removed(name));
    }
    font.lib.remove(SKIP_EXPORT_GLYPHS);
    font.lib.remove(KEEP_GLYPHS);
    for glyph in font.glyphs.values_mut() {
        glyph.lib.remove(GLYPHS_EXPORT);
    }
    Ok(removed)
}

/// Old name => production name, for every glyph that changes name
fn production_name_map(font: &Font) -> HashMap<GlyphName, GlyphName> {
    let font_names = font
        .lib
        .get(POSTSCRIPT_NAMES)
        .and_then(plist::Value::as_dictionary);

    let mut taken: HashSet<GlyphName> = font.glyph_order().cloned().collect();
    let mut renames = HashMap::new();
    for glyph in font.glyphs.values() {
        let Some(production) = glyph.production_name().or_else(|| {
            font_names
                .and_then(|names| names.get(glyph.name.as_str()))
                .and_then(plist::Value::as_string)
        }) else {
            continue;
        };
        if production == glyph.name.as_str() || production.is_empty() {
            continue;
        }
        let mut candidate = GlyphName::new(production);
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = GlyphName::new(format!("{production}.{suffix}"));
            suffix += 1;
        }
        if candidate.as_str() != production {
            warn!(
                "Production name '{production}' of '{}' is taken, using '{candidate}'",
                glyph.name
            );
        }
        taken.insert(candidate.clone());
        renames.insert(glyph.name.clone(), candidate);
    }
    renames
}

fn rename_glyph_set(glyphs: &mut GlyphSet, renames: &HashMap<GlyphName, GlyphName>) {
    let renamed: IndexMap<_, _> = std::mem::take(glyphs)
        .into_iter()
        .map(|(name, mut glyph)| {
            let name = renames.get(&name).cloned().unwrap_or(name);
            glyph.name = name.clone();
            for component in glyph.components.iter_mut() {
                if let Some(new_name) = renames.get(&component.base) {
                    component.base = new_name.clone();
                }
            }
            (name, glyph)
        })
        .collect();
    *glyphs = renamed;
}

/// Renames glyphs to their production names.
///
/// Skipped when the font lib says not to use production names. Components,
/// kerning and groups follow the rename. Returns the number of renamed glyphs.
pub fn rename_to_production_names(font: &mut Font) -> usize {
    if font.lib_bool(DONT_USE_PRODUCTION_NAMES) == Some(true) {
        debug!("Font lib disables production names");
        return 0;
    }
    let renames = production_name_map(font);
    if renames.is_empty() {
        return 0;
    }

    rename_glyph_set(&mut font.glyphs, &renames);
    for layer in font.layers.values_mut() {
        rename_glyph_set(layer, &renames);
    }
    for members in font.groups.values_mut() {
        for member in members.iter_mut() {
            if let Some(new_name) = renames.get(&*member) {
                *member = new_name.clone();
            }
        }
    }
    let rename_side = |side: String| match renames.get(side.as_str()) {
        Some(new_name) => new_name.to_string(),
        None => side,
    };
    font.kerning = std::mem::take(&mut font.kerning)
        .into_iter()
        .map(|((left, right), value)| ((rename_side(left), rename_side(right)), value))
        .collect();
    let skip: Vec<GlyphName> = font
        .skip_export_glyphs()
        .into_iter()
        .map(|name| renames.get(&name).cloned().unwrap_or(name))
        .collect();
    if !skip.is_empty() {
        font.set_skip_export_glyphs(&skip);
    }
    font.lib.remove(POSTSCRIPT_NAMES);
    for glyph in font.glyphs.values_mut() {
        glyph.lib.remove(GLYPH_POSTSCRIPT_NAME);
    }
    renames.len()
}

#[cfg(test)]
mod tests {
    use kurbo::{Affine, BezPath, Rect, Shape};
    use millir::font::{Component, Glyph};
    use pretty_assertions::assert_eq;

    use super::*;

    fn square() -> BezPath {
        Rect::new(0.0, 0.0, 100.0, 100.0).to_path(0.1)
    }

    fn font() -> Font {
        let mut font = Font::new();
        font.add_glyph(Glyph::new(".notdef").with_width(500.0));
        font.add_glyph(Glyph::new("a").with_width(500.0).with_contour(square()));
        let mut ring = Glyph::new("ring").with_contour(square());
        ring.lib
            .insert(GLYPHS_EXPORT.to_string(), plist::Value::Boolean(false));
        font.add_glyph(ring);
        font.add_glyph(
            Glyph::new("aring")
                .with_width(500.0)
                .with_component(Component::new("a", Affine::IDENTITY))
                .with_component(Component::new("ring", Affine::translate((0.0, 200.0)))),
        );
        font
    }

    fn names(font: &Font) -> Vec<&str> {
        font.glyph_order().map(GlyphName::as_str).collect()
    }

    #[test]
    fn subset_decomposes_references_to_removed_glyphs() {
        let mut font = font();
        font.groups
            .insert("public.kern1.ring".to_string(), vec![GlyphName::new("ring")]);
        font.kerning
            .insert(("a".to_string(), "ring".to_string()), -10.0);
        font.kerning
            .insert(("a".to_string(), "public.kern1.ring".to_string()), -5.0);
        font.kerning.insert(("a".to_string(), "a".to_string()), 5.0);

        assert!(has_non_export_glyphs(&font));
        assert_eq!(1, subset(&mut font).unwrap());
        assert_eq!(vec![".notdef", "a", "aring"], names(&font));

        let aring = font.glyph("aring").unwrap();
        assert_eq!(
            vec!["a"],
            aring
                .components
                .iter()
                .map(|c| c.base.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(1, aring.contours.len());
        assert_eq!(200.0, aring.contours[0].bounding_box().min_y());

        assert!(font.groups.is_empty());
        assert_eq!(1, font.kerning.len());
        assert!(!has_non_export_glyphs(&font));
    }

    #[test]
    fn keep_glyphs_wildcards() {
        let mut font = font();
        font.lib.insert(
            KEEP_GLYPHS.to_string(),
            plist::Value::Array(vec![plist::Value::String("a*".into())]),
        );
        subset(&mut font).unwrap();
        // .notdef always stays, ring is non-export regardless
        assert_eq!(vec![".notdef", "a", "aring"], names(&font));
    }

    #[test]
    fn nothing_to_subset() {
        let mut font = Font::new();
        font.add_glyph(Glyph::new("a"));
        assert!(!has_non_export_glyphs(&font));
        assert_eq!(0, subset(&mut font).unwrap());
    }

    #[test]
    fn production_names_follow_components_and_kerning() {
        let mut font = font();
        let mut names_map = plist::Dictionary::new();
        names_map.insert("aring".to_string(), plist::Value::String("uni00E5".into()));
        font.lib
            .insert(POSTSCRIPT_NAMES.to_string(), plist::Value::Dictionary(names_map));
        font.glyph_mut("a").unwrap().lib.insert(
            GLYPH_POSTSCRIPT_NAME.to_string(),
            plist::Value::String("uni0061".into()),
        );
        font.kerning
            .insert(("a".to_string(), "aring".to_string()), -10.0);

        assert_eq!(2, rename_to_production_names(&mut font));
        assert_eq!(vec![".notdef", "uni0061", "ring", "uni00E5"], names(&font));
        let aring = font.glyph("uni00E5").unwrap();
        assert_eq!("uni0061", aring.components[0].base.as_str());
        assert_eq!(
            Some(&-10.0),
            font.kerning
                .get(&("uni0061".to_string(), "uni00E5".to_string()))
        );
    }

    #[test]
    fn production_names_stay_unique() {
        let mut font = font();
        font.glyph_mut("ring").unwrap().lib.insert(
            GLYPH_POSTSCRIPT_NAME.to_string(),
            plist::Value::String("a".into()),
        );
        rename_to_production_names(&mut font);
        assert!(font.glyph("a.1").is_some());
    }

    #[test]
    fn production_names_disabled_by_lib() {
        let mut font = font();
        font.lib
            .insert(DONT_USE_PRODUCTION_NAMES.to_string(), plist::Value::Boolean(true));
        font.glyph_mut("a").unwrap().lib.insert(
            GLYPH_POSTSCRIPT_NAME.to_string(),
            plist::Value::String("uni0061".into()),
        );
        assert_eq!(0, rename_to_production_names(&mut font));
        assert!(font.glyph("a").is_some());
    }
}

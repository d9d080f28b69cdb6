//! Component decomposition and flattening.

use std::collections::BTreeSet;

use kurbo::{Affine, BezPath};
use log::warn;
use millcore::types::GlyphName;
use millir::font::{Component, Font, Glyph};

use crate::{
    error::Error,
    filters::{layer_glyphs_mut, Filter, GlyphLookup},
};

fn cycle(glyph: &GlyphName, referenced_glyph: &GlyphName) -> Error {
    Error::ComponentError {
        glyph: glyph.clone(),
        referenced_glyph: referenced_glyph.clone(),
        problem: "component references form a cycle".to_string(),
    }
}

fn collect_contours(
    lookup: &GlyphLookup,
    glyph: &Glyph,
    transform: Affine,
    stack: &mut Vec<GlyphName>,
    out: &mut Vec<BezPath>,
) -> Result<(), Error> {
    out.extend(glyph.contours.iter().map(|c| transform * c));
    for component in glyph.components.iter() {
        if stack.contains(&component.base) {
            return Err(cycle(&stack[0], &component.base));
        }
        let Some(base) = lookup.get(component.base.as_str()) else {
            warn!(
                "'{}' references missing glyph '{}', dropping the component",
                glyph.name, component.base
            );
            continue;
        };
        stack.push(component.base.clone());
        collect_contours(lookup, base, transform * component.transform, stack, out)?;
        stack.pop();
    }
    Ok(())
}

fn decomposed(lookup: &GlyphLookup, glyph: &Glyph) -> Result<Vec<BezPath>, Error> {
    let mut contours = Vec::new();
    collect_contours(
        lookup,
        glyph,
        Affine::IDENTITY,
        &mut vec![glyph.name.clone()],
        &mut contours,
    )?;
    Ok(contours)
}

/// The contours of a default layer glyph with every component drawn in place
pub fn decompose_glyph(font: &Font, glyph: &Glyph) -> Result<Vec<BezPath>, Error> {
    decomposed(&GlyphLookup::new(font, None)?, glyph)
}

fn decompose_where(
    font: &mut Font,
    layer: Option<&str>,
    glyphs: &BTreeSet<GlyphName>,
    predicate: impl Fn(&Glyph) -> bool,
) -> Result<usize, Error> {
    let lookup = GlyphLookup::new(font, layer)?;
    let mut updates = Vec::new();
    for name in glyphs {
        let Some(glyph) = lookup.get(name.as_str()) else {
            continue;
        };
        if glyph.components.is_empty() || !predicate(glyph) {
            continue;
        }
        updates.push((name.clone(), decomposed(&lookup, glyph)?));
    }

    let set = layer_glyphs_mut(font, layer)?;
    let modified = updates.len();
    for (name, contours) in updates {
        if let Some(glyph) = set.get_mut(&name) {
            glyph.contours = contours;
            glyph.components.clear();
        }
    }
    Ok(modified)
}

/// Replaces every component with its outline
#[derive(Debug)]
pub struct DecomposeComponents;

impl Filter for DecomposeComponents {
    fn name(&self) -> &str {
        "decomposeComponents"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        decompose_where(font, layer, glyphs, |_| true)
    }
}

fn is_transformed(component: &Component) -> bool {
    let [xx, yx, xy, yy, _, _] = component.transform.as_coeffs();
    [xx, yx, xy, yy] != [1.0, 0.0, 0.0, 1.0]
}

/// Decomposes glyphs with any component that is scaled, flipped or skewed
#[derive(Debug)]
pub struct DecomposeTransformedComponents;

impl Filter for DecomposeTransformedComponents {
    fn name(&self) -> &str {
        "decomposeTransformedComponents"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        decompose_where(font, layer, glyphs, |g| g.components.iter().any(is_transformed))
    }
}

fn flatten(
    lookup: &GlyphLookup,
    component: &Component,
    stack: &mut Vec<GlyphName>,
    out: &mut Vec<Component>,
) -> Result<(), Error> {
    let base = match lookup.get(component.base.as_str()) {
        Some(base) if base.contours.is_empty() && !base.components.is_empty() => base,
        _ => {
            out.push(component.clone());
            return Ok(());
        }
    };
    for nested in base.components.iter() {
        if stack.contains(&nested.base) {
            return Err(cycle(&stack[0], &nested.base));
        }
        stack.push(nested.base.clone());
        flatten(
            lookup,
            &Component::new(nested.base.clone(), component.transform * nested.transform),
            stack,
            out,
        )?;
        stack.pop();
    }
    Ok(())
}

/// Rewrites nested components so each references a glyph that has no components
#[derive(Debug)]
pub struct FlattenComponents;

impl Filter for FlattenComponents {
    fn name(&self) -> &str {
        "flattenComponents"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        let lookup = GlyphLookup::new(font, layer)?;
        let mut updates = Vec::new();
        for name in glyphs {
            let Some(glyph) = lookup.get(name.as_str()) else {
                continue;
            };
            let mut flattened = Vec::with_capacity(glyph.components.len());
            for component in glyph.components.iter() {
                flatten(&lookup, component, &mut vec![name.clone()], &mut flattened)?;
            }
            if flattened != glyph.components {
                updates.push((name.clone(), flattened));
            }
        }

        let set = layer_glyphs_mut(font, layer)?;
        let modified = updates.len();
        for (name, components) in updates {
            if let Some(glyph) = set.get_mut(&name) {
                glyph.components = components;
            }
        }
        Ok(modified)
    }
}

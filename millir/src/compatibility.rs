//! Checks that masters can be interpolated.
//!
//! Every source must define every glyph with the same contours, point types,
//! anchors and components. The checker reports every difference it finds,
//! grouped by which sources agree, so the fix is obvious.

use std::{collections::BTreeSet, fmt::Display};

use indexmap::IndexMap;
use kurbo::{BezPath, PathEl};
use log::{debug, error, log_enabled};
use millcore::types::GlyphName;

use crate::{designspace::DesignSpaceModel, error::Error, font::Glyph};

/// One property on which sources disagree
#[derive(Debug, Clone, PartialEq)]
pub struct Incompatibility {
    pub glyph: GlyphName,
    /// Where in the glyph, e.g. "contour 0, point 3"
    pub context: Vec<String>,
    pub what: &'static str,
    /// Each distinct value and the sources that had it
    pub values: Vec<(String, Vec<String>)>,
}

impl Display for Incompatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut context = vec![format!("glyph {}", self.glyph)];
        context.extend(self.context.iter().cloned());
        writeln!(
            f,
            "Sources had differing {} in {}:",
            self.what,
            context.join(", ")
        )?;
        let verbose = log_enabled!(log::Level::Debug);
        for (value, sources) in self.values.iter() {
            let who = if verbose || sources.len() <= 6 {
                sources.join(", ")
            } else {
                format!("{} sources", sources.len())
            };
            writeln!(f, " * {who} had: {value}")?;
        }
        Ok(())
    }
}

pub struct CompatibilityChecker<'a> {
    model: &'a DesignSpaceModel,
    source_names: Vec<String>,
}

/// Collects values per source for one property
struct Tally {
    values: IndexMap<String, Vec<String>>,
}

impl Tally {
    fn of<T: ToString>(names: &[String], items: impl Iterator<Item = (usize, T)>) -> Self {
        let mut values: IndexMap<String, Vec<String>> = IndexMap::new();
        for (source_idx, value) in items {
            values
                .entry(value.to_string())
                .or_default()
                .push(names[source_idx].clone());
        }
        Tally { values }
    }

    fn agrees(&self) -> bool {
        self.values.len() < 2
    }
}

impl<'a> CompatibilityChecker<'a> {
    pub fn new(model: &'a DesignSpaceModel) -> Self {
        let source_names = model
            .sources()
            .iter()
            .map(|s| {
                [
                    s.font.info.family_name(),
                    s.font.info.style_name(),
                    s.layer.as_deref(),
                ]
                .into_iter()
                .flatten()
                .filter(|n| *n != "public.default")
                .collect::<Vec<_>>()
                .join(" ")
            })
            .map(|name| name.trim().to_string())
            .zip(model.sources().iter())
            .map(|(name, s)| if name.is_empty() { s.name.clone() } else { name })
            .collect();
        CompatibilityChecker {
            model,
            source_names,
        }
    }

    /// Every incompatibility, in glyph order.
    pub fn check(&self) -> Vec<Incompatibility> {
        let skip: BTreeSet<GlyphName> = self.model.skip_export_glyphs();
        let mut problems = Vec::new();

        // whole masters must agree on the glyph set
        let mut all_glyphs: Vec<&GlyphName> = Vec::new();
        for source in self.model.masters() {
            for name in source.font.glyph_order() {
                if !all_glyphs.contains(&name) {
                    all_glyphs.push(name);
                }
            }
        }
        for name in all_glyphs.into_iter().filter(|n| !skip.contains(*n)) {
            let tally = Tally::of(
                &self.source_names,
                self.model
                    .sources()
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.is_layer())
                    .map(|(idx, s)| (idx, s.font.glyphs.contains_key(name))),
            );
            if !tally.agrees() {
                problems.push(self.report(name, &[], "glyph presence", tally));
            }
        }

        for name in self.model.glyph_order().filter(|n| !skip.contains(*n)) {
            let glyphs: Vec<(usize, &Glyph)> = self
                .model
                .sources()
                .iter()
                .enumerate()
                .filter_map(|(idx, s)| s.glyphs()?.get(name).map(|g| (idx, g)))
                .collect();
            self.check_glyph(name, &glyphs, &mut problems);
        }

        for problem in problems.iter() {
            error!("{problem}");
        }
        if problems.is_empty() {
            debug!("All sources are compatible");
        }
        problems
    }

    /// Fail with the first divergent glyph, if any.
    pub fn ensure_compatible(&self) -> Result<(), Error> {
        match self.check().into_iter().next() {
            Some(problem) => Err(Error::IncompatibleMasters {
                glyph: problem.glyph.clone(),
                problem: problem.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn report(
        &self,
        glyph: &GlyphName,
        context: &[String],
        what: &'static str,
        tally: Tally,
    ) -> Incompatibility {
        Incompatibility {
            glyph: glyph.clone(),
            context: context.to_vec(),
            what,
            values: tally.values.into_iter().collect(),
        }
    }

    fn check_glyph(
        &self,
        name: &GlyphName,
        glyphs: &[(usize, &Glyph)],
        problems: &mut Vec<Incompatibility>,
    ) {
        let names = &self.source_names;
        let tally = Tally::of(names, glyphs.iter().map(|(i, g)| (*i, g.contours.len())));
        if tally.agrees() {
            for contour_idx in 0..glyphs.first().map(|(_, g)| g.contours.len()).unwrap_or(0) {
                let context = [format!("contour {contour_idx}")];
                let contours: Vec<(usize, &BezPath)> = glyphs
                    .iter()
                    .map(|(i, g)| (*i, &g.contours[contour_idx]))
                    .collect();
                let tally = Tally::of(
                    names,
                    contours.iter().map(|(i, c)| (*i, point_types(c).len())),
                );
                if !tally.agrees() {
                    problems.push(self.report(name, &context, "number of points", tally));
                    continue;
                }
                let types: Vec<(usize, Vec<&'static str>)> = contours
                    .iter()
                    .map(|(i, c)| (*i, point_types(c)))
                    .collect();
                let num_points = types.first().map(|(_, t)| t.len()).unwrap_or(0);
                for point_idx in 0..num_points {
                    let tally = Tally::of(names, types.iter().map(|(i, t)| (*i, t[point_idx])));
                    if !tally.agrees() {
                        let context = [context[0].clone(), format!("point {point_idx}")];
                        problems.push(self.report(name, &context, "point type", tally));
                    }
                }
            }
        } else {
            problems.push(self.report(name, &[], "number of contours", tally));
        }

        let tally = Tally::of(
            names,
            glyphs.iter().map(|(i, g)| {
                let mut anchors: Vec<_> = g.anchors.iter().map(|a| a.name.as_str()).collect();
                anchors.sort();
                (*i, format!("\"{}\"", anchors.join(", ")))
            }),
        );
        if !tally.agrees() {
            problems.push(self.report(name, &[], "anchors", tally));
        }

        let tally = Tally::of(names, glyphs.iter().map(|(i, g)| (*i, g.components.len())));
        if !tally.agrees() {
            problems.push(self.report(name, &[], "number of components", tally));
            return;
        }
        let num_components = glyphs.first().map(|(_, g)| g.components.len()).unwrap_or(0);
        for component_idx in 0..num_components {
            let tally = Tally::of(
                names,
                glyphs
                    .iter()
                    .map(|(i, g)| (*i, g.components[component_idx].base.clone())),
            );
            if !tally.agrees() {
                let context = [format!("component {component_idx}")];
                problems.push(self.report(name, &context, "base glyph", tally));
            }
        }
    }
}

/// The UFO type of each point of a contour, offcurves included.
fn point_types(path: &BezPath) -> Vec<&'static str> {
    let mut types = Vec::new();
    for el in path.elements() {
        match el {
            PathEl::MoveTo(_) => types.push("move"),
            PathEl::LineTo(_) => types.push("line"),
            PathEl::QuadTo(..) => types.extend(["offcurve", "qcurve"]),
            PathEl::CurveTo(..) => types.extend(["offcurve", "offcurve", "curve"]),
            PathEl::ClosePath => (),
        }
    }
    types
}

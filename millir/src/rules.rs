//! Conditional glyph substitution.
//!
//! A rule fires for a location when any of its condition sets holds; a
//! condition set holds when every condition in it does. Firing rules are
//! applied to an instance in document order, each one swapping glyphs in
//! place, so when two rules substitute the same glyph the later one is what
//! ends up under the original name.

use std::mem;

use log::{debug, warn};
use millcore::{
    coords::{DesignCoord, DesignLocation},
    types::{GlyphName, Tag},
};

use crate::font::{Font, Glyph};

/// An inclusive range on one axis, in design coordinates.
///
/// A missing bound is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub tag: Tag,
    pub min: Option<DesignCoord>,
    pub max: Option<DesignCoord>,
}

impl Condition {
    pub fn new(tag: Tag, min: Option<DesignCoord>, max: Option<DesignCoord>) -> Condition {
        Condition { tag, min, max }
    }

    fn holds(&self, value: DesignCoord) -> bool {
        self.min.map_or(true, |min| min <= value) && self.max.map_or(true, |max| value <= max)
    }
}

/// A conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet(pub Vec<Condition>);

impl ConditionSet {
    /// Axes absent from location are taken to be at `defaults`.
    fn holds(&self, location: &DesignLocation, defaults: &DesignLocation) -> bool {
        self.0.iter().all(|condition| {
            location
                .get(condition.tag)
                .or_else(|| defaults.get(condition.tag))
                .is_some_and(|value| condition.holds(value))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub name: String,
    /// A disjunction; a rule with no condition sets never fires
    pub condition_sets: Vec<ConditionSet>,
    pub substitutions: Vec<(GlyphName, GlyphName)>,
}

impl Rule {
    pub fn fires(&self, location: &DesignLocation, defaults: &DesignLocation) -> bool {
        self.condition_sets
            .iter()
            .any(|set| set.holds(location, defaults))
    }

    pub fn axis_tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.condition_sets
            .iter()
            .flat_map(|set| set.0.iter().map(|c| c.tag))
    }
}

/// Apply every rule that fires at location to font, in order.
///
/// Returns the swaps performed. Substitutions naming a glyph the font
/// doesn't have are skipped with a warning.
pub fn apply_rules(
    rules: &[Rule],
    location: &DesignLocation,
    defaults: &DesignLocation,
    font: &mut Font,
) -> Vec<(GlyphName, GlyphName)> {
    let mut swapped = Vec::new();
    for rule in rules.iter().filter(|r| r.fires(location, defaults)) {
        debug!("Rule '{}' fires at {location:?}", rule.name);
        for (old, new) in rule.substitutions.iter() {
            if !font.glyphs.contains_key(old) || !font.glyphs.contains_key(new) {
                warn!(
                    "Rule '{}' cannot swap '{old}' and '{new}', as either or both are missing",
                    rule.name
                );
                continue;
            }
            swap_glyph_names(font, old, new);
            swapped.push((old.clone(), new.clone()));
        }
    }
    swapped
}

/// Swap two glyphs of the default layer by name.
///
/// Outlines, advance and anchors trade places; unicodes and lib stay put.
/// Component references, kerning and group members naming either glyph are
/// swapped too, so glyphs not named by the substitution look the same.
pub fn swap_glyph_names(font: &mut Font, old: &GlyphName, new: &GlyphName) {
    if old == new {
        return;
    }
    let Some(mut held) = font.glyphs.get(new).cloned() else {
        return;
    };
    let Some(glyph) = font.glyphs.get_mut(old) else {
        return;
    };
    exchange_geometry(glyph, &mut held);
    if let Some(glyph) = font.glyphs.get_mut(new) {
        exchange_geometry(glyph, &mut held);
    }

    let swap_name = |name: &GlyphName| -> Option<GlyphName> {
        if name == old {
            Some(new.clone())
        } else if name == new {
            Some(old.clone())
        } else {
            None
        }
    };

    for glyph in font.glyphs.values_mut() {
        for component in glyph.components.iter_mut() {
            if let Some(name) = swap_name(&component.base) {
                component.base = name;
            }
        }
    }

    font.kerning = mem::take(&mut font.kerning)
        .into_iter()
        .map(|((first, second), value)| {
            let swap_str = |s: String| match swap_name(&GlyphName::new(&s)) {
                Some(name) => name.to_string(),
                None => s,
            };
            ((swap_str(first), swap_str(second)), value)
        })
        .collect();

    for members in font.groups.values_mut() {
        for member in members.iter_mut() {
            if let Some(name) = swap_name(member) {
                *member = name;
            }
        }
    }
}

fn exchange_geometry(a: &mut Glyph, b: &mut Glyph) {
    mem::swap(&mut a.contours, &mut b.contours);
    mem::swap(&mut a.components, &mut b.components);
    mem::swap(&mut a.width, &mut b.width);
    mem::swap(&mut a.height, &mut b.height);
    mem::swap(&mut a.anchors, &mut b.anchors);
}

#[cfg(test)]
mod tests {
    use kurbo::{Affine, BezPath};
    use pretty_assertions::assert_eq;

    use crate::font::{Anchor, Component};

    use super::*;

    fn wght() -> Tag {
        Tag::new(b"wght")
    }

    fn rule(name: &str, min: f64, max: f64, subs: &[(&str, &str)]) -> Rule {
        Rule {
            name: name.to_string(),
            condition_sets: vec![ConditionSet(vec![Condition::new(
                wght(),
                Some(DesignCoord::new(min)),
                Some(DesignCoord::new(max)),
            )])],
            substitutions: subs
                .iter()
                .map(|(a, b)| (GlyphName::new(a), GlyphName::new(b)))
                .collect(),
        }
    }

    fn square(size: f64) -> BezPath {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((size, 0.0));
        path.line_to((size, size));
        path.close_path();
        path
    }

    fn test_font() -> Font {
        let mut font = Font::new();
        let mut dollar = Glyph::new("dollar")
            .with_width(500.0)
            .with_codepoint('$')
            .with_contour(square(10.0));
        dollar.anchors.push(Anchor::new("top", (250.0, 700.0)));
        font.add_glyph(dollar);
        font.add_glyph(
            Glyph::new("dollar.nostroke")
                .with_width(480.0)
                .with_contour(square(20.0)),
        );
        font.add_glyph(
            Glyph::new("dollar.heavy")
                .with_width(520.0)
                .with_contour(square(30.0)),
        );
        font.add_glyph(
            Glyph::new("dollar.sc")
                .with_component(Component::new("dollar", Affine::scale(0.8))),
        );
        font.kerning
            .insert(("dollar".into(), "public.kern2.O".into()), -10.0);
        font.groups.insert(
            "public.kern1.dollar".into(),
            vec![GlyphName::new("dollar"), GlyphName::new("dollar.sc")],
        );
        font
    }

    #[test]
    fn condition_bounds_are_inclusive_and_optional() {
        let defaults = DesignLocation::for_pos(&[("wght", 400.0)]);
        let r = rule("heavy", 600.0, 900.0, &[]);
        assert!(r.fires(&DesignLocation::for_pos(&[("wght", 600.0)]), &defaults));
        assert!(r.fires(&DesignLocation::for_pos(&[("wght", 900.0)]), &defaults));
        assert!(!r.fires(&DesignLocation::for_pos(&[("wght", 599.0)]), &defaults));
        // missing axis takes the default
        assert!(!r.fires(&DesignLocation::new(), &defaults));

        let open = Rule {
            condition_sets: vec![ConditionSet(vec![Condition::new(
                wght(),
                Some(DesignCoord::new(600.0)),
                None,
            )])],
            ..Default::default()
        };
        assert!(open.fires(&DesignLocation::for_pos(&[("wght", 5000.0)]), &defaults));
    }

    #[test]
    fn rule_without_condition_sets_never_fires() {
        let defaults = DesignLocation::for_pos(&[("wght", 400.0)]);
        assert!(!Rule::default().fires(&defaults, &defaults));
    }

    #[test]
    fn swap_moves_outlines_but_not_unicodes() {
        let mut font = test_font();
        swap_glyph_names(
            &mut font,
            &GlyphName::new("dollar"),
            &GlyphName::new("dollar.nostroke"),
        );
        let dollar = font.glyph("dollar").unwrap();
        assert_eq!(480.0, dollar.width);
        assert_eq!(square(20.0), dollar.contours[0]);
        assert_eq!(vec!['$'], dollar.codepoints);
        assert!(dollar.anchors.is_empty());

        let nostroke = font.glyph("dollar.nostroke").unwrap();
        assert_eq!(square(10.0), nostroke.contours[0]);
        assert_eq!(Some(&Anchor::new("top", (250.0, 700.0))), nostroke.anchors.first());
        assert!(nostroke.codepoints.is_empty());
    }

    #[test]
    fn swap_renames_references() {
        let mut font = test_font();
        swap_glyph_names(
            &mut font,
            &GlyphName::new("dollar"),
            &GlyphName::new("dollar.nostroke"),
        );
        // dollar.sc still draws the original dollar outline
        assert_eq!(
            GlyphName::new("dollar.nostroke"),
            font.glyph("dollar.sc").unwrap().components[0].base
        );
        assert_eq!(
            vec![(("dollar.nostroke".to_string(), "public.kern2.O".to_string()), -10.0)],
            font.kerning.into_iter().collect::<Vec<_>>()
        );
        assert_eq!(
            vec![GlyphName::new("dollar.nostroke"), GlyphName::new("dollar.sc")],
            font.groups["public.kern1.dollar"]
        );
    }

    #[test]
    fn later_rule_wins() {
        let rules = vec![
            rule("nostroke", 500.0, 900.0, &[("dollar", "dollar.nostroke")]),
            rule("heavy", 700.0, 900.0, &[("dollar", "dollar.heavy")]),
        ];
        let defaults = DesignLocation::for_pos(&[("wght", 400.0)]);
        let mut font = test_font();
        let swaps = apply_rules(
            &rules,
            &DesignLocation::for_pos(&[("wght", 800.0)]),
            &defaults,
            &mut font,
        );
        assert_eq!(2, swaps.len());
        assert_eq!(520.0, font.glyph("dollar").unwrap().width);
        assert_eq!(square(30.0), font.glyph("dollar").unwrap().contours[0]);
    }

    #[test]
    fn only_firing_rules_apply() {
        let rules = vec![
            rule("nostroke", 500.0, 900.0, &[("dollar", "dollar.nostroke")]),
            rule("heavy", 700.0, 900.0, &[("dollar", "dollar.heavy")]),
        ];
        let defaults = DesignLocation::for_pos(&[("wght", 400.0)]);
        let mut font = test_font();
        apply_rules(
            &rules,
            &DesignLocation::for_pos(&[("wght", 600.0)]),
            &defaults,
            &mut font,
        );
        assert_eq!(480.0, font.glyph("dollar").unwrap().width);
    }

    #[test]
    fn missing_substitute_is_skipped() {
        let rules = vec![rule("nope", 0.0, 1000.0, &[("dollar", "dollar.missing")])];
        let defaults = DesignLocation::for_pos(&[("wght", 400.0)]);
        let mut font = test_font();
        let before = font.clone();
        assert!(apply_rules(&rules, &defaults, &defaults, &mut font).is_empty());
        assert_eq!(before, font);
    }
}

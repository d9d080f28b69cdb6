//! The validated, read-only model of a designspace.
//!
//! Built once from whatever the loader parsed, then shared by every stage of
//! the build. Sources hold their fonts behind [`Arc`] so instance generation
//! can run on several threads against the same model.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Arc,
};

use log::{debug, warn};
use millcore::{
    coords::{DesignLocation, NormalizedLocation, UserLocation},
    piecewise_linear_map::OutOfRange,
    resolver::LocationResolver,
    types::{Axes, GlyphName, Tag},
};
use regex::Regex;

use crate::{
    error::Error,
    font::{Font, GlyphSet, SKIP_EXPORT_GLYPHS},
    rules::Rule,
};

/// A master: a location plus the font drawn there.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub filename: Option<PathBuf>,
    /// A sparse source uses a non-default layer of its font
    pub layer: Option<String>,
    pub location: DesignLocation,
    pub family_name: Option<String>,
    pub style_name: Option<String>,
    pub font: Arc<Font>,
}

impl Source {
    pub fn is_layer(&self) -> bool {
        self.layer.is_some()
    }

    /// The glyphs this source contributes
    pub fn glyphs(&self) -> Option<&GlyphSet> {
        self.font.layer(self.layer.as_deref())
    }
}

/// A static font to interpolate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instance {
    pub name: Option<String>,
    pub family_name: Option<String>,
    pub style_name: Option<String>,
    pub postscript_font_name: Option<String>,
    pub style_map_family_name: Option<String>,
    pub style_map_style_name: Option<String>,
    pub filename: Option<PathBuf>,
    /// Design location, used for x when the instance is anisotropic
    pub location: DesignLocation,
    /// Separate y location, for anisotropic instances
    pub y_location: Option<DesignLocation>,
    /// A named location that replaces `location`; see [`DesignSpaceModel::with_labels`]
    pub location_label: Option<String>,
    pub lib: plist::Dictionary,
}

impl Instance {
    pub fn new(location: DesignLocation) -> Instance {
        Instance {
            location,
            ..Default::default()
        }
    }

    /// An instance that reproduces a source, for building masters as instances
    pub fn for_source(source: &Source) -> Instance {
        let info = &source.font.info;
        Instance {
            name: Some(source.name.clone()),
            family_name: source
                .family_name
                .clone()
                .or_else(|| info.family_name().map(str::to_string)),
            style_name: source
                .style_name
                .clone()
                .or_else(|| info.style_name().map(str::to_string)),
            postscript_font_name: info.postscript_font_name().map(str::to_string),
            location: source.location.clone(),
            ..Default::default()
        }
    }

    pub fn is_anisotropic(&self) -> bool {
        self.y_location
            .as_ref()
            .is_some_and(|y| *y != self.location)
    }

    /// "Family Style", falling back to the explicit name then the location.
    pub fn display_name(&self) -> String {
        match (&self.family_name, &self.style_name, &self.name) {
            (Some(family), Some(style), _) => format!("{family} {style}"),
            (_, _, Some(name)) => name.clone(),
            (Some(family), None, None) => family.clone(),
            (None, Some(style), None) => style.clone(),
            (None, None, None) => format!("{:?}", self.location),
        }
    }
}

/// Selects instances by name.
///
/// The pattern must match the whole name; either the instance's explicit
/// name or its "Family Style" display name.
#[derive(Debug, Clone)]
pub struct InstanceFilter {
    pattern: Regex,
}

impl InstanceFilter {
    pub fn new(pattern: &str) -> Result<InstanceFilter, Error> {
        let pattern = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(InstanceFilter { pattern })
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        instance
            .name
            .as_deref()
            .is_some_and(|name| self.pattern.is_match(name))
            || self.pattern.is_match(&instance.display_name())
    }
}

#[derive(Debug, Clone)]
pub struct DesignSpaceModel {
    axes: Axes,
    sources: Vec<Source>,
    instances: Vec<Instance>,
    rules: Vec<Rule>,
    labels: BTreeMap<String, UserLocation>,
    lib: plist::Dictionary,
    default_source: usize,
}

fn malformed(entity: impl Into<String>, reason: impl Into<String>) -> Error {
    Error::MalformedDesignSpace {
        entity: entity.into(),
        reason: reason.into(),
    }
}

fn check_axes<'a>(
    axes: &Axes,
    entity: impl Fn() -> String,
    mut tags: impl Iterator<Item = &'a Tag>,
) -> Result<(), Error> {
    match tags.find(|tag| !axes.contains(tag)) {
        Some(tag) => Err(malformed(entity(), format!("undeclared axis '{tag}'"))),
        None => Ok(()),
    }
}

impl DesignSpaceModel {
    /// Validate and assemble a model.
    ///
    /// With [`OutOfRange::Clamp`] sources must lie within the axis ranges;
    /// with [`OutOfRange::Extrapolate`] they may lie beyond.
    pub fn new(
        axes: Axes,
        sources: Vec<Source>,
        instances: Vec<Instance>,
        rules: Vec<Rule>,
        out_of_range: OutOfRange,
    ) -> Result<DesignSpaceModel, Error> {
        let resolver = LocationResolver::new(&axes, out_of_range);

        let mut seen: BTreeMap<DesignLocation, &str> = BTreeMap::new();
        for source in sources.iter() {
            let entity = || format!("source '{}'", source.name);
            check_axes(&axes, entity, source.location.axis_tags())?;
            if out_of_range == OutOfRange::Clamp {
                resolver.check_bounds(&source.location).map_err(|e| {
                    malformed(entity(), format!("{e} and extrapolation is disabled"))
                })?;
            }
            let location = resolver.complete(&source.location)?;
            if let Some(other) = seen.insert(location.clone(), &source.name) {
                return Err(malformed(
                    entity(),
                    format!("same location as source '{other}', {location:?}"),
                ));
            }
        }

        for (idx, instance) in instances.iter().enumerate() {
            let entity = || format!("instance {idx} '{}'", instance.display_name());
            check_axes(&axes, entity, instance.location.axis_tags())?;
            if let Some(y) = &instance.y_location {
                check_axes(&axes, entity, y.axis_tags())?;
            }
        }

        for rule in rules.iter() {
            let tags: Vec<_> = rule.axis_tags().collect();
            check_axes(&axes, || format!("rule '{}'", rule.name), tags.iter())?;
        }

        let default_location = axes.default_design_location();
        let default_source = sources
            .iter()
            .position(|s| {
                !s.is_layer()
                    && resolver
                        .complete(&s.location)
                        .is_ok_and(|loc| loc == default_location)
            })
            .ok_or_else(|| Error::NoDefaultSource(default_location.clone()))?;
        debug!(
            "Default source is '{}' of {} sources",
            sources[default_source].name,
            sources.len()
        );

        if let Some(source) = sources.iter().find(|s| s.glyphs().is_none()) {
            return Err(malformed(
                format!("source '{}'", source.name),
                format!(
                    "no layer named '{}'",
                    source.layer.as_deref().unwrap_or_default()
                ),
            ));
        }

        Ok(DesignSpaceModel {
            axes,
            sources,
            instances,
            rules,
            labels: Default::default(),
            lib: Default::default(),
            default_source,
        })
    }

    /// Add named locations usable in place of explicit coordinates.
    ///
    /// Instances that name a label take its location, whatever coordinates
    /// they also give.
    pub fn with_labels(mut self, labels: BTreeMap<String, UserLocation>) -> Result<Self, Error> {
        self.labels = labels;
        let mut instances = std::mem::take(&mut self.instances);
        for (idx, instance) in instances.iter_mut().enumerate() {
            let Some(label) = &instance.location_label else {
                continue;
            };
            let entity = format!("instance {idx} '{}'", instance.display_name());
            let location = self
                .label_location(label)?
                .ok_or_else(|| malformed(entity, format!("no location label named '{label}'")))?;
            instance.location = location;
            instance.y_location = None;
        }
        self.instances = instances;
        Ok(self)
    }

    pub fn with_lib(mut self, lib: plist::Dictionary) -> Self {
        self.lib = lib;
        self
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Sources that are whole fonts, not layers
    pub fn masters(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| !s.is_layer())
    }

    pub fn default_source(&self) -> &Source {
        &self.sources[self.default_source]
    }

    pub fn default_source_index(&self) -> usize {
        self.default_source
    }

    pub fn default_font(&self) -> &Font {
        &self.default_source().font
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn filtered_instances<'a>(
        &'a self,
        filter: Option<&'a InstanceFilter>,
    ) -> impl Iterator<Item = &'a Instance> {
        self.instances
            .iter()
            .filter(move |i| filter.map_or(true, |f| f.matches(i)))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn lib(&self) -> &plist::Dictionary {
        &self.lib
    }

    /// A location named by a label, in design space
    pub fn label_location(&self, name: &str) -> Result<Option<DesignLocation>, Error> {
        self.labels
            .get(name)
            .map(|loc| loc.to_design(&self.axes).map_err(Error::from))
            .transpose()
    }

    /// Does the instance belong to family, if one is given
    pub fn is_in_family(&self, instance: &Instance, family: Option<&str>) -> bool {
        let Some(family) = family else {
            return true;
        };
        let instance_family = instance
            .family_name
            .as_deref()
            .or_else(|| self.default_font().info.family_name());
        instance_family == Some(family)
    }

    pub fn resolver(&self, out_of_range: OutOfRange) -> LocationResolver {
        LocationResolver::new(&self.axes, out_of_range)
    }

    pub fn default_location(&self) -> DesignLocation {
        self.axes.default_design_location()
    }

    pub fn normalized_location(
        &self,
        location: &DesignLocation,
        out_of_range: OutOfRange,
    ) -> Result<NormalizedLocation, Error> {
        Ok(self
            .resolver(out_of_range)
            .design_to_normalized(location)?)
    }

    /// Glyph order of the default source
    pub fn glyph_order(&self) -> impl Iterator<Item = &GlyphName> {
        self.default_font().glyph_order()
    }

    /// Glyphs not to export.
    ///
    /// The designspace lib's list when it has one, else the union of the sources'.
    pub fn skip_export_glyphs(&self) -> BTreeSet<GlyphName> {
        let from_lib: Option<BTreeSet<GlyphName>> = self
            .lib
            .get(SKIP_EXPORT_GLYPHS)
            .and_then(plist::Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(plist::Value::as_string)
                    .map(GlyphName::new)
                    .collect()
            });
        from_lib.unwrap_or_else(|| {
            self.masters()
                .flat_map(|s| s.font.skip_export_glyphs())
                .collect()
        })
    }

    /// Warn about glyphs only present in non-default sources.
    ///
    /// Instances take their glyph set from the default source so such glyphs are dropped.
    pub fn warn_about_orphan_glyphs(&self) {
        let default = self.default_font();
        for source in self.sources.iter() {
            let Some(glyphs) = source.glyphs() else {
                continue;
            };
            let orphans: Vec<_> = glyphs
                .keys()
                .filter(|name| !default.glyphs.contains_key(*name))
                .map(|name| name.as_str())
                .collect();
            if !orphans.is_empty() {
                warn!(
                    "Source '{}' has glyphs missing from the default source, they will be ignored: {}",
                    source.name,
                    orphans.join(", ")
                );
            }
        }
    }
}

//! An ordered chain of glyph filters.
//!
//! Filters are declared by name, either on the command line or in a font's
//! lib. Names resolve against the built-in filters first and then against a
//! [`FilterRegistry`] of externally supplied implementations. Anything left
//! unresolved fails before any font is touched.

mod color;
mod cu2qu;
mod decompose;
mod overlaps;
mod transform;

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    sync::Arc,
};

use log::debug;
use millcore::types::GlyphName;
use millir::font::{Font, Glyph, GlyphSet};

use crate::{
    declaration::{Declaration, OptionValue, Options},
    error::Error,
};

pub use color::{ExplodeColorLayerGlyphs, COLOR_LAYERS, COLOR_LAYER_MAPPING};
pub use cu2qu::CubicToQuadratic;
pub use decompose::{
    decompose_glyph, DecomposeComponents, DecomposeTransformedComponents, FlattenComponents,
};
pub use overlaps::{OverlapRemover, RemoveOverlaps, WarnOnlyOverlapRemover};
pub use transform::{PropagateAnchors, ReverseContourDirection, Transformations};

/// Font lib key holding filter declarations
pub const FILTERS_KEY: &str = "com.github.googlei18n.ufo2ft.filters";

const BUILTIN_NAMESPACE: &str = "ufo2ft.filters";

/// Where in the build a filter runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterPosition {
    /// Before outline conversion
    Pre,
    /// After outline conversion, before assembly
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinFilter {
    ExplodeColorLayerGlyphs,
    DecomposeComponents,
    DecomposeTransformedComponents,
    FlattenComponents,
    RemoveOverlaps,
    CubicToQuadratic,
    Transformations,
    PropagateAnchors,
    ReverseContourDirection,
}

impl BuiltinFilter {
    const ALL: [BuiltinFilter; 9] = [
        BuiltinFilter::ExplodeColorLayerGlyphs,
        BuiltinFilter::DecomposeComponents,
        BuiltinFilter::DecomposeTransformedComponents,
        BuiltinFilter::FlattenComponents,
        BuiltinFilter::RemoveOverlaps,
        BuiltinFilter::CubicToQuadratic,
        BuiltinFilter::Transformations,
        BuiltinFilter::PropagateAnchors,
        BuiltinFilter::ReverseContourDirection,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            BuiltinFilter::ExplodeColorLayerGlyphs => "explodeColorLayerGlyphs",
            BuiltinFilter::DecomposeComponents => "decomposeComponents",
            BuiltinFilter::DecomposeTransformedComponents => "decomposeTransformedComponents",
            BuiltinFilter::FlattenComponents => "flattenComponents",
            BuiltinFilter::RemoveOverlaps => "removeOverlaps",
            BuiltinFilter::CubicToQuadratic => "cubicToQuadratic",
            BuiltinFilter::Transformations => "transformations",
            BuiltinFilter::PropagateAnchors => "propagateAnchors",
            BuiltinFilter::ReverseContourDirection => "reverseContourDirection",
        }
    }

    /// Look up by short name (`decomposeComponents`) or class name
    /// (`DecomposeComponentsFilter`).
    pub fn from_name(name: &str) -> Option<BuiltinFilter> {
        let name = name.strip_suffix("Filter").unwrap_or(name);
        BuiltinFilter::ALL
            .into_iter()
            .find(|f| f.short_name().eq_ignore_ascii_case(name))
    }

    fn create(self, options: &Options, registry: &FilterRegistry) -> Result<Box<dyn Filter>, Error> {
        Ok(match self {
            BuiltinFilter::ExplodeColorLayerGlyphs => Box::new(ExplodeColorLayerGlyphs),
            BuiltinFilter::DecomposeComponents => Box::new(DecomposeComponents),
            BuiltinFilter::DecomposeTransformedComponents => {
                Box::new(DecomposeTransformedComponents)
            }
            BuiltinFilter::FlattenComponents => Box::new(FlattenComponents),
            BuiltinFilter::RemoveOverlaps => {
                Box::new(RemoveOverlaps::new(registry.overlap_remover.clone()))
            }
            BuiltinFilter::CubicToQuadratic => Box::new(CubicToQuadratic::from_options(options)?),
            BuiltinFilter::Transformations => Box::new(Transformations::from_options(options)?),
            BuiltinFilter::PropagateAnchors => Box::new(PropagateAnchors),
            BuiltinFilter::ReverseContourDirection => Box::new(ReverseContourDirection),
        })
    }
}

/// What a filter spec resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    Builtin(BuiltinFilter),
    /// An identity registered with a [`FilterRegistry`]
    External(String),
}

/// Which glyphs a filter may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GlyphRestriction {
    #[default]
    All,
    Include(BTreeSet<GlyphName>),
    Exclude(BTreeSet<GlyphName>),
}

impl GlyphRestriction {
    pub fn matches(&self, name: &GlyphName) -> bool {
        match self {
            GlyphRestriction::All => true,
            GlyphRestriction::Include(names) => names.contains(name),
            GlyphRestriction::Exclude(names) => !names.contains(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub position: FilterPosition,
    pub options: Options,
    pub restriction: GlyphRestriction,
}

impl FilterSpec {
    pub fn builtin(filter: BuiltinFilter, position: FilterPosition) -> FilterSpec {
        FilterSpec {
            kind: FilterKind::Builtin(filter),
            position,
            options: Default::default(),
            restriction: GlyphRestriction::All,
        }
    }

    pub fn with_option(mut self, key: &str, value: OptionValue) -> FilterSpec {
        self.options.insert(key.to_string(), value);
        self
    }

    /// Resolve a declaration; `pre`, `include` and `exclude` are lifted out of
    /// its options.
    pub fn from_declaration(
        declaration: &Declaration,
        registry: &FilterRegistry,
    ) -> Result<FilterSpec, Error> {
        let (name, namespace, options) = match declaration {
            Declaration::Named {
                name,
                namespace,
                options,
            } => (name, namespace.as_deref(), options),
            Declaration::Defaults => return Err(not_a_filter("...")),
            Declaration::Disabled => return Err(not_a_filter("None")),
        };
        let resolution_error = |reason: String| Error::FilterResolution {
            name: name.clone(),
            reason,
        };

        let mut options = options.clone();
        let position = match options.remove("pre") {
            None => FilterPosition::Post,
            Some(pre) => match pre.as_bool() {
                Some(true) => FilterPosition::Pre,
                Some(false) => FilterPosition::Post,
                None => return Err(resolution_error(format!("'pre' must be a bool, not {pre:?}"))),
            },
        };
        let include = options.remove("include");
        let exclude = options.remove("exclude");
        let restriction = match (include, exclude) {
            (Some(_), Some(_)) => {
                return Err(resolution_error(
                    "'include' and 'exclude' are mutually exclusive".to_string(),
                ))
            }
            (Some(names), None) => GlyphRestriction::Include(
                names
                    .as_names()
                    .ok_or_else(|| resolution_error("'include' must list glyph names".into()))?,
            ),
            (None, Some(names)) => GlyphRestriction::Exclude(
                names
                    .as_names()
                    .ok_or_else(|| resolution_error("'exclude' must list glyph names".into()))?,
            ),
            (None, None) => GlyphRestriction::All,
        };

        let builtin = match namespace {
            None => BuiltinFilter::from_name(name),
            Some(ns) if ns.starts_with(BUILTIN_NAMESPACE) => BuiltinFilter::from_name(name),
            Some(_) => None,
        };
        let kind = match builtin {
            Some(builtin) => FilterKind::Builtin(builtin),
            None => {
                let identity = external_identity(namespace, name);
                if !registry.contains(&identity) {
                    return Err(resolution_error(format!(
                        "'{identity}' is neither a built-in filter nor registered"
                    )));
                }
                FilterKind::External(identity)
            }
        };

        Ok(FilterSpec {
            kind,
            position,
            options,
            restriction,
        })
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            FilterKind::Builtin(builtin) => builtin.short_name(),
            FilterKind::External(identity) => identity,
        }
    }
}

fn not_a_filter(name: &str) -> Error {
    Error::FilterResolution {
        name: name.to_string(),
        reason: "only feature writer lists accept this".to_string(),
    }
}

fn external_identity(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}::{name}"),
        None => name.to_string(),
    }
}

/// A step that mutates glyphs in place.
pub trait Filter: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Apply to the named glyphs of a layer, None for the default layer.
    ///
    /// Returns the number of glyphs modified.
    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error>;
}

/// Builds an external filter from its options
pub type FilterFactory = Arc<dyn Fn(&Options) -> Result<Box<dyn Filter>, Error> + Send + Sync>;

/// Externally supplied filters and the overlap removal backend.
#[derive(Clone)]
pub struct FilterRegistry {
    external: HashMap<String, FilterFactory>,
    overlap_remover: Arc<dyn OverlapRemover>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        FilterRegistry {
            external: Default::default(),
            overlap_remover: Arc::new(WarnOnlyOverlapRemover),
        }
    }
}

impl Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.external.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("external", &names)
            .field("overlap_remover", &self.overlap_remover)
            .finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a filter under `namespace::Name`, or a bare name
    pub fn register(mut self, identity: impl Into<String>, factory: FilterFactory) -> Self {
        self.external.insert(identity.into(), factory);
        self
    }

    pub fn with_overlap_remover(mut self, remover: Arc<dyn OverlapRemover>) -> Self {
        self.overlap_remover = remover;
        self
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.external.contains_key(identity)
    }

    fn create(&self, spec: &FilterSpec) -> Result<Box<dyn Filter>, Error> {
        match &spec.kind {
            FilterKind::Builtin(builtin) => builtin.create(&spec.options, self),
            FilterKind::External(identity) => match self.external.get(identity) {
                Some(factory) => factory(&spec.options),
                None => Err(Error::FilterResolution {
                    name: identity.clone(),
                    reason: "not registered".to_string(),
                }),
            },
        }
    }
}

/// The built-in steps that run between manual pre and post filters
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinChain {
    pub explode_color_layers: bool,
    pub decompose_components: bool,
    pub flatten_components: bool,
    pub remove_overlaps: bool,
    /// Options for the cubic to quadratic step, None to skip it
    pub cubic_to_quadratic: Option<Options>,
}

impl BuiltinChain {
    /// Nothing but what the caller asks for
    pub fn none() -> BuiltinChain {
        BuiltinChain {
            explode_color_layers: false,
            decompose_components: false,
            flatten_components: false,
            remove_overlaps: false,
            cubic_to_quadratic: None,
        }
    }

    fn specs(&self) -> Vec<FilterSpec> {
        let mut specs = Vec::new();
        let mut push = |enabled: bool, filter: BuiltinFilter| {
            if enabled {
                specs.push(FilterSpec::builtin(filter, FilterPosition::Pre));
            }
        };
        push(self.explode_color_layers, BuiltinFilter::ExplodeColorLayerGlyphs);
        push(self.decompose_components, BuiltinFilter::DecomposeComponents);
        push(self.flatten_components, BuiltinFilter::FlattenComponents);
        push(self.remove_overlaps, BuiltinFilter::RemoveOverlaps);
        if let Some(options) = &self.cubic_to_quadratic {
            let mut spec = FilterSpec::builtin(BuiltinFilter::CubicToQuadratic, FilterPosition::Pre);
            spec.options = options.clone();
            specs.push(spec);
        }
        specs
    }
}

#[derive(Debug)]
struct Step {
    spec: FilterSpec,
    filter: Box<dyn Filter>,
}

/// The resolved, ordered filters for a build.
///
/// Pre runs manual pre filters then the built-ins; post runs manual post
/// filters. Each filter sees the output of the one before it.
#[derive(Debug)]
pub struct FilterPipeline {
    pre: Vec<Step>,
    post: Vec<Step>,
}

impl FilterPipeline {
    pub fn resolve(
        declarations: &[Declaration],
        builtins: &BuiltinChain,
        registry: &FilterRegistry,
    ) -> Result<FilterPipeline, Error> {
        let specs = declarations
            .iter()
            .map(|d| FilterSpec::from_declaration(d, registry))
            .collect::<Result<Vec<_>, _>>()?;
        FilterPipeline::from_specs(specs, builtins, registry)
    }

    pub fn from_specs(
        specs: Vec<FilterSpec>,
        builtins: &BuiltinChain,
        registry: &FilterRegistry,
    ) -> Result<FilterPipeline, Error> {
        let mut pre = Vec::new();
        let mut post = Vec::new();
        for spec in specs {
            let filter = registry.create(&spec)?;
            let step = Step { spec, filter };
            match step.spec.position {
                FilterPosition::Pre => pre.push(step),
                FilterPosition::Post => post.push(step),
            }
        }
        for spec in builtins.specs() {
            let filter = registry.create(&spec)?;
            pre.push(Step { spec, filter });
        }
        Ok(FilterPipeline { pre, post })
    }

    fn steps(&self, position: FilterPosition) -> &[Step] {
        match position {
            FilterPosition::Pre => &self.pre,
            FilterPosition::Post => &self.post,
        }
    }

    /// Names of the filters at a position, in execution order
    pub fn names(&self, position: FilterPosition) -> Vec<&str> {
        self.steps(position)
            .iter()
            .map(|s| s.filter.name())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    pub fn apply(
        &self,
        font: &mut Font,
        position: FilterPosition,
        layer: Option<&str>,
    ) -> Result<(), Error> {
        for step in self.steps(position) {
            let glyphs: BTreeSet<GlyphName> = layer_glyphs(font, layer)?
                .keys()
                .filter(|name| step.spec.restriction.matches(name))
                .cloned()
                .collect();
            let modified = step.filter.filter(font, layer, &glyphs)?;
            debug!(
                "Filter '{}' modified {modified} of {} glyphs{}",
                step.filter.name(),
                glyphs.len(),
                layer.map(|l| format!(" in layer '{l}'")).unwrap_or_default()
            );
        }
        Ok(())
    }
}

pub(crate) fn layer_glyphs<'a>(font: &'a Font, layer: Option<&str>) -> Result<&'a GlyphSet, Error> {
    font.layer(layer)
        .ok_or_else(|| Error::MissingLayer(layer.unwrap_or_default().to_string()))
}

pub(crate) fn layer_glyphs_mut<'a>(
    font: &'a mut Font,
    layer: Option<&str>,
) -> Result<&'a mut GlyphSet, Error> {
    match layer {
        None => Ok(&mut font.glyphs),
        Some(name) => font
            .layers
            .get_mut(name)
            .ok_or_else(|| Error::MissingLayer(name.to_string())),
    }
}

/// Finds glyphs in a layer, falling back to the default layer
#[derive(Debug, Clone, Copy)]
pub(crate) struct GlyphLookup<'a> {
    layer: &'a GlyphSet,
    default: &'a GlyphSet,
}

impl<'a> GlyphLookup<'a> {
    pub(crate) fn new(font: &'a Font, layer: Option<&str>) -> Result<Self, Error> {
        Ok(GlyphLookup {
            layer: layer_glyphs(font, layer)?,
            default: &font.glyphs,
        })
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'a Glyph> {
        self.layer.get(name).or_else(|| self.default.get(name))
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kurbo::Affine;
    use millir::font::Component;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{test_util::square, *};
    use crate::declaration::parse_declaration;

    /// Records the glyphs it sees and appends a suffix to their lib
    #[derive(Debug)]
    struct Marker {
        mark: String,
    }

    impl Filter for Marker {
        fn name(&self) -> &str {
            &self.mark
        }

        fn filter(
            &self,
            font: &mut Font,
            layer: Option<&str>,
            glyphs: &BTreeSet<GlyphName>,
        ) -> Result<usize, Error> {
            let set = layer_glyphs_mut(font, layer)?;
            for name in glyphs {
                let Some(glyph) = set.get_mut(name) else {
                    continue;
                };
                let trail = glyph
                    .lib
                    .get("trail")
                    .and_then(plist::Value::as_string)
                    .unwrap_or_default()
                    .to_string();
                glyph
                    .lib
                    .insert("trail".into(), format!("{trail}{}", self.mark).into());
            }
            Ok(glyphs.len())
        }
    }

    fn marker_registry() -> FilterRegistry {
        let factory: FilterFactory = Arc::new(|options: &Options| {
            let mark = options
                .get("mark")
                .and_then(OptionValue::as_str)
                .unwrap_or("?")
                .to_string();
            Ok(Box::new(Marker { mark }) as Box<dyn Filter>)
        });
        FilterRegistry::new()
            .register("test.filters::Marker", factory.clone())
            .register("Marker", factory)
    }

    fn trail(font: &Font, name: &str) -> String {
        font.glyphs[name]
            .lib
            .get("trail")
            .and_then(plist::Value::as_string)
            .unwrap_or_default()
            .to_string()
    }

    fn test_font() -> Font {
        let mut font = Font::new();
        font.add_glyph(Glyph::new("a").with_contour(square(0.0, 0.0, 100.0)));
        font.add_glyph(Glyph::new("b").with_contour(square(0.0, 0.0, 200.0)));
        font.add_glyph(
            Glyph::new("c").with_component(Component::new("a", Affine::translate((10.0, 0.0)))),
        );
        font
    }

    fn decls(texts: &[&str]) -> Vec<Declaration> {
        texts.iter().map(|t| parse_declaration(t).unwrap()).collect()
    }

    #[rstest]
    #[case("decomposeComponents", BuiltinFilter::DecomposeComponents)]
    #[case("DecomposeComponentsFilter", BuiltinFilter::DecomposeComponents)]
    #[case("ufo2ft.filters.decomposeComponents::DecomposeComponentsFilter", BuiltinFilter::DecomposeComponents)]
    #[case("PropagateAnchorsFilter(pre=True)", BuiltinFilter::PropagateAnchors)]
    fn resolves_builtins(#[case] text: &str, #[case] expected: BuiltinFilter) {
        let spec = FilterSpec::from_declaration(
            &parse_declaration(text).unwrap(),
            &FilterRegistry::new(),
        )
        .unwrap();
        assert_eq!(FilterKind::Builtin(expected), spec.kind);
    }

    #[test]
    fn resolves_external() {
        let spec = FilterSpec::from_declaration(
            &parse_declaration("test.filters::Marker(mark='x', exclude=['b'])").unwrap(),
            &marker_registry(),
        )
        .unwrap();
        assert_eq!(FilterKind::External("test.filters::Marker".into()), spec.kind);
        assert_eq!(FilterPosition::Post, spec.position);
        assert_eq!(
            GlyphRestriction::Exclude(BTreeSet::from([GlyphName::new("b")])),
            spec.restriction
        );
        assert!(!spec.options.contains_key("exclude"));
    }

    #[rstest]
    #[case("NoSuchFilter")]
    #[case("some.module::Marker")]
    #[case("Marker(include=['a'], exclude=['b'])")]
    #[case("Marker(pre='yes')")]
    #[case("...")]
    fn resolution_fails_up_front(#[case] text: &str) {
        let result = FilterPipeline::resolve(&decls(&[text]), &BuiltinChain::none(), &marker_registry());
        assert!(
            matches!(result, Err(Error::FilterResolution { .. })),
            "{text}: {result:?}"
        );
    }

    #[test]
    fn builtin_order_puts_overlaps_before_conversion() {
        let chain = BuiltinChain {
            explode_color_layers: true,
            decompose_components: true,
            flatten_components: true,
            remove_overlaps: true,
            cubic_to_quadratic: Some(Options::new()),
        };
        let pipeline = FilterPipeline::resolve(&[], &chain, &FilterRegistry::new()).unwrap();
        assert_eq!(
            vec![
                "explodeColorLayerGlyphs",
                "decomposeComponents",
                "flattenComponents",
                "removeOverlaps",
                "cubicToQuadratic"
            ],
            pipeline.names(FilterPosition::Pre)
        );
        assert!(pipeline.names(FilterPosition::Post).is_empty());
    }

    #[test]
    fn manual_filters_wrap_builtins() {
        let chain = BuiltinChain {
            remove_overlaps: true,
            ..BuiltinChain::none()
        };
        let pipeline = FilterPipeline::resolve(
            &decls(&["Marker(mark='1', pre=True)", "Marker(mark='2')", "Marker(mark='3', pre=True)"]),
            &chain,
            &marker_registry(),
        )
        .unwrap();
        assert_eq!(vec!["1", "3", "removeOverlaps"], pipeline.names(FilterPosition::Pre));
        assert_eq!(vec!["2"], pipeline.names(FilterPosition::Post));
    }

    #[test]
    fn filters_compose_in_order() {
        let pipeline = FilterPipeline::resolve(
            &decls(&["Marker(mark='x', pre=True)", "Marker(mark='y', pre=True, include=['a'])"]),
            &BuiltinChain::none(),
            &marker_registry(),
        )
        .unwrap();
        let mut font = test_font();
        pipeline.apply(&mut font, FilterPosition::Pre, None).unwrap();
        assert_eq!("xy", trail(&font, "a"));
        assert_eq!("x", trail(&font, "b"));
        pipeline.apply(&mut font, FilterPosition::Post, None).unwrap();
        assert_eq!("xy", trail(&font, "a"));
    }

    /// Adds a glyph the first time it runs
    #[derive(Debug, Default)]
    struct AddsGlyph {
        runs: AtomicUsize,
    }

    impl Filter for AddsGlyph {
        fn name(&self) -> &str {
            "addsGlyph"
        }

        fn filter(
            &self,
            font: &mut Font,
            _: Option<&str>,
            _: &BTreeSet<GlyphName>,
        ) -> Result<usize, Error> {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                font.add_glyph(Glyph::new("d"));
            }
            Ok(1)
        }
    }

    #[test]
    fn restriction_is_evaluated_per_invocation() {
        let registry = marker_registry().register(
            "AddsGlyph",
            Arc::new(|_: &Options| Ok(Box::<AddsGlyph>::default() as Box<dyn Filter>)),
        );
        let pipeline = FilterPipeline::resolve(
            &decls(&["AddsGlyph(pre=True)", "Marker(mark='z', pre=True, exclude=['a'])"]),
            &BuiltinChain::none(),
            &registry,
        )
        .unwrap();
        let mut font = test_font();
        pipeline.apply(&mut font, FilterPosition::Pre, None).unwrap();
        assert_eq!("z", trail(&font, "d"));
        assert_eq!("", trail(&font, "a"));
    }

    #[test]
    fn missing_layer_is_an_error() {
        let pipeline = FilterPipeline::resolve(
            &decls(&["Marker(pre=True)"]),
            &BuiltinChain::none(),
            &marker_registry(),
        )
        .unwrap();
        let mut font = test_font();
        assert!(matches!(
            pipeline.apply(&mut font, FilterPosition::Pre, Some("nope")),
            Err(Error::MissingLayer(..))
        ));
    }
}

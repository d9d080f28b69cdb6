//! Generates OpenType feature source from kerning, anchors and glyph categories.
//!
//! Writers run in order against a font's explicit feature text. A writer in
//! [`WriterMode::Skip`] leaves a feature alone when the text already has it,
//! unless the text carries an [`INSERT_MARKER`] line, in which case its output
//! replaces the marker line. [`WriterMode::Append`] always adds its output
//! after the explicit text, marker or not.
//!
//! A table such as GDEF can only be defined once, so a table block is never
//! written if the explicit text or an earlier writer already has one.

mod gdef;
mod kern;
mod marks;

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Debug, Write},
    sync::{Arc, OnceLock},
};

use log::debug;
use millcore::types::GlyphName;
use millir::font::{Font, Glyph};
use regex::Regex;

use crate::{
    declaration::{Declaration, Options},
    error::Error,
};

pub use gdef::GdefFeatureWriter;
pub use kern::KernFeatureWriter;
pub use marks::MarkFeatureWriter;

/// Font lib key holding feature writer declarations
pub const FEATURE_WRITERS_KEY: &str = "com.github.googlei18n.ufo2ft.featureWriters";

/// A line with exactly this comment is where generated features go
pub const INSERT_MARKER: &str = "# Automatic Code";

/// Font lib key mapping glyph names to base, mark, ligature or component
pub const OPENTYPE_CATEGORIES: &str = "public.openTypeCategories";

const BUILTIN_NAMESPACE: &str = "ufo2ft.featureWriters";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriterMode {
    #[default]
    Skip,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinWriter {
    Kern,
    Mark,
    Gdef,
}

impl BuiltinWriter {
    /// The writers used when nothing is declared, in order
    pub const DEFAULTS: [BuiltinWriter; 3] =
        [BuiltinWriter::Kern, BuiltinWriter::Mark, BuiltinWriter::Gdef];

    pub fn short_name(self) -> &'static str {
        match self {
            BuiltinWriter::Kern => "kern",
            BuiltinWriter::Mark => "mark",
            BuiltinWriter::Gdef => "gdef",
        }
    }

    /// Look up by short name (`kern`) or class name (`KernFeatureWriter`)
    pub fn from_name(name: &str) -> Option<BuiltinWriter> {
        let name = name
            .strip_suffix("FeatureWriter")
            .or_else(|| name.strip_suffix("Writer"))
            .unwrap_or(name);
        BuiltinWriter::DEFAULTS
            .into_iter()
            .find(|w| w.short_name().eq_ignore_ascii_case(name))
    }

    fn create(self, options: &Options) -> Result<Box<dyn FeatureWriter>, Error> {
        Ok(match self {
            BuiltinWriter::Kern => Box::new(KernFeatureWriter::from_options(options)?),
            BuiltinWriter::Mark => Box::new(MarkFeatureWriter),
            BuiltinWriter::Gdef => Box::new(GdefFeatureWriter),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterKind {
    Builtin(BuiltinWriter),
    External(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWriterSpec {
    pub kind: WriterKind,
    pub mode: WriterMode,
    pub options: Options,
}

impl FeatureWriterSpec {
    pub fn builtin(writer: BuiltinWriter) -> FeatureWriterSpec {
        FeatureWriterSpec {
            kind: WriterKind::Builtin(writer),
            mode: WriterMode::Skip,
            options: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            WriterKind::Builtin(builtin) => builtin.short_name(),
            WriterKind::External(identity) => identity,
        }
    }
}

/// One generated feature or table block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureBlock {
    /// A feature tag, or `GDEF` for the table
    pub tag: String,
    pub text: String,
}

impl FeatureBlock {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> FeatureBlock {
        FeatureBlock {
            tag: tag.into(),
            text: text.into(),
        }
    }

    fn is_table(&self) -> bool {
        self.tag == "GDEF"
    }

    fn is_present_in(&self, fea: &str) -> bool {
        let keyword = if self.is_table() { "table" } else { "feature" };
        let pattern = format!(r"(?m)^\s*{keyword}\s+{}\b", regex::escape(&self.tag));
        Regex::new(&pattern)
            .map(|re| re.is_match(fea))
            .unwrap_or(false)
    }
}

/// What a writer produced for a font
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// Definitions the blocks rely on, emitted once ahead of the first block written
    pub prelude: String,
    pub blocks: Vec<FeatureBlock>,
}

impl Generated {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub trait FeatureWriter: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, font: &Font) -> Result<Generated, Error>;
}

/// Builds an external writer from its options
pub type WriterFactory =
    Arc<dyn Fn(&Options) -> Result<Box<dyn FeatureWriter>, Error> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FeatureWriterRegistry {
    external: HashMap<String, WriterFactory>,
}

impl Debug for FeatureWriterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.external.keys().collect();
        names.sort();
        f.debug_struct("FeatureWriterRegistry")
            .field("external", &names)
            .finish()
    }
}

impl FeatureWriterRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(mut self, identity: impl Into<String>, factory: WriterFactory) -> Self {
        self.external.insert(identity.into(), factory);
        self
    }

    fn spec(&self, declaration: &Declaration) -> Result<FeatureWriterSpec, Error> {
        let Declaration::Named {
            name,
            namespace,
            options,
        } = declaration
        else {
            return Err(Error::FeatureWriterResolution {
                name: format!("{declaration:?}"),
                reason: "not a writer".to_string(),
            });
        };
        let resolution_error = |reason: String| Error::FeatureWriterResolution {
            name: name.clone(),
            reason,
        };
        let mut options = options.clone();
        let mode = match options.remove("mode") {
            None => WriterMode::Skip,
            Some(mode) => match mode.as_str() {
                Some("skip") => WriterMode::Skip,
                Some("append") => WriterMode::Append,
                _ => {
                    return Err(resolution_error(format!(
                        "mode must be 'skip' or 'append', not {mode:?}"
                    )))
                }
            },
        };
        let builtin = match namespace.as_deref() {
            None => BuiltinWriter::from_name(name),
            Some(ns) if ns.starts_with(BUILTIN_NAMESPACE) => BuiltinWriter::from_name(name),
            Some(_) => None,
        };
        let kind = match builtin {
            Some(builtin) => WriterKind::Builtin(builtin),
            None => {
                let identity = match namespace {
                    Some(ns) => format!("{ns}::{name}"),
                    None => name.clone(),
                };
                if !self.external.contains_key(&identity) {
                    return Err(resolution_error(format!(
                        "'{identity}' is neither a built-in writer nor registered"
                    )));
                }
                WriterKind::External(identity)
            }
        };
        Ok(FeatureWriterSpec {
            kind,
            mode,
            options,
        })
    }

    fn create(&self, spec: &FeatureWriterSpec) -> Result<Box<dyn FeatureWriter>, Error> {
        match &spec.kind {
            WriterKind::Builtin(builtin) => builtin.create(&spec.options),
            WriterKind::External(identity) => match self.external.get(identity) {
                Some(factory) => factory(&spec.options),
                None => Err(Error::FeatureWriterResolution {
                    name: identity.clone(),
                    reason: "not registered".to_string(),
                }),
            },
        }
    }

    /// Resolve a declaration list; None means the defaults.
    ///
    /// `...` expands to the defaults in place, a lone `None` disables writing.
    pub fn resolve(&self, declarations: Option<&[Declaration]>) -> Result<FeatureWriters, Error> {
        let Some(declarations) = declarations else {
            return self.resolve_specs(default_specs());
        };
        if declarations.contains(&Declaration::Disabled) {
            if declarations.len() > 1 {
                return Err(Error::FeatureWriterResolution {
                    name: "None".to_string(),
                    reason: "disabling writers excludes declaring any".to_string(),
                });
            }
            return Ok(FeatureWriters::disabled());
        }
        let mut specs = Vec::new();
        for declaration in declarations {
            match declaration {
                Declaration::Defaults => specs.extend(default_specs()),
                _ => specs.push(self.spec(declaration)?),
            }
        }
        self.resolve_specs(specs)
    }

    pub fn resolve_specs(&self, specs: Vec<FeatureWriterSpec>) -> Result<FeatureWriters, Error> {
        let writers = specs
            .into_iter()
            .map(|spec| {
                let writer = self.create(&spec)?;
                Ok(ResolvedWriter { spec, writer })
            })
            .collect::<Result<_, Error>>()?;
        Ok(FeatureWriters {
            writers,
            disabled: false,
        })
    }
}

fn default_specs() -> Vec<FeatureWriterSpec> {
    BuiltinWriter::DEFAULTS
        .into_iter()
        .map(FeatureWriterSpec::builtin)
        .collect()
}

#[derive(Debug)]
struct ResolvedWriter {
    spec: FeatureWriterSpec,
    writer: Box<dyn FeatureWriter>,
}

/// An ordered, resolved chain of writers
#[derive(Debug)]
pub struct FeatureWriters {
    writers: Vec<ResolvedWriter>,
    disabled: bool,
}

impl FeatureWriters {
    pub fn disabled() -> FeatureWriters {
        FeatureWriters {
            writers: Vec::new(),
            disabled: true,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn names(&self) -> Vec<&str> {
        self.writers.iter().map(|w| w.spec.name()).collect()
    }

    /// Run every writer and update the font's feature text.
    ///
    /// Returns the number of blocks written.
    pub fn write(&self, font: &mut Font) -> Result<usize, Error> {
        if self.disabled {
            debug!("Feature writers disabled");
            return Ok(0);
        }
        let explicit = font.features.clone();
        let marker = marker_regex();
        let has_marker = marker.is_match(&explicit);

        let mut at_marker = String::new();
        let mut appended = String::new();
        let mut written = 0;
        for resolved in self.writers.iter() {
            let generated = resolved.writer.generate(font)?;
            let mut prelude = Some(generated.prelude.as_str()).filter(|p| !p.is_empty());
            for block in generated.blocks {
                let in_explicit = block.is_present_in(&explicit);
                let in_generated = block.is_present_in(&format!("{at_marker}\n{appended}"));
                let dest = match resolved.spec.mode {
                    _ if block.is_table() && (in_explicit || in_generated) => None,
                    WriterMode::Append => Some(&mut appended),
                    WriterMode::Skip if in_generated => None,
                    WriterMode::Skip if has_marker => Some(&mut at_marker),
                    WriterMode::Skip if in_explicit => None,
                    WriterMode::Skip => Some(&mut appended),
                };
                let Some(dest) = dest else {
                    debug!(
                        "{} skips '{}', the features already have it",
                        resolved.spec.name(),
                        block.tag
                    );
                    continue;
                };
                if let Some(prelude) = prelude.take() {
                    push_text(dest, prelude);
                }
                push_text(dest, &block.text);
                written += 1;
            }
        }

        let mut features = if !at_marker.is_empty() {
            marker
                .replace(&explicit, regex::NoExpand(at_marker.trim_end()))
                .into_owned()
        } else {
            explicit
        };
        if !appended.is_empty() {
            if !features.is_empty() {
                push_text(&mut features, "");
            }
            features.push_str(&appended);
        }
        font.features = features;
        Ok(written)
    }
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(&format!(r"(?m)^[ \t]*{}[ \t]*$", regex::escape(INSERT_MARKER))).unwrap()
    })
}

/// Append a chunk, separated from what came before by a blank line
fn push_text(dest: &mut String, text: &str) {
    if !dest.is_empty() {
        if !dest.ends_with('\n') {
            dest.push('\n');
        }
        if !dest.ends_with("\n\n") {
            dest.push('\n');
        }
    }
    dest.push_str(text);
}

/// How GDEF classifies a glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GlyphCategory {
    Base,
    Ligature,
    Mark,
    Component,
}

impl GlyphCategory {
    fn from_name(name: &str) -> Option<GlyphCategory> {
        Some(match name {
            "base" => GlyphCategory::Base,
            "ligature" => GlyphCategory::Ligature,
            "mark" => GlyphCategory::Mark,
            "component" => GlyphCategory::Component,
            _ => return None,
        })
    }
}

/// True for names like `top_2` that attach to one part of a ligature
fn ligature_anchor(name: &str) -> Option<(&str, usize)> {
    let (base, idx) = name.rsplit_once('_')?;
    if base.is_empty() || base.starts_with('_') {
        return None;
    }
    let idx = idx.parse::<usize>().ok().filter(|i| *i > 0)?;
    Some((base, idx))
}

fn category_from_anchors(glyph: &Glyph) -> Option<GlyphCategory> {
    if glyph.anchors.is_empty() {
        return None;
    }
    if glyph.anchors.iter().any(|a| a.name.starts_with('_')) {
        Some(GlyphCategory::Mark)
    } else if glyph.anchors.iter().any(|a| ligature_anchor(&a.name).is_some()) {
        Some(GlyphCategory::Ligature)
    } else {
        Some(GlyphCategory::Base)
    }
}

/// Categories of the exported glyphs.
///
/// `public.openTypeCategories` wins when the font has it, otherwise
/// anchors decide.
pub fn glyph_categories(font: &Font) -> BTreeMap<GlyphName, GlyphCategory> {
    let skip = font.skip_export_glyphs();
    let explicit = font
        .lib
        .get(OPENTYPE_CATEGORIES)
        .and_then(plist::Value::as_dictionary);
    font.glyphs
        .values()
        .filter(|g| !skip.contains(&g.name))
        .filter_map(|glyph| {
            let category = match explicit {
                Some(explicit) => explicit
                    .get(glyph.name.as_str())
                    .and_then(plist::Value::as_string)
                    .and_then(GlyphCategory::from_name),
                None => category_from_anchors(glyph),
            }?;
            Some((glyph.name.clone(), category))
        })
        .collect()
}

/// Exported glyphs in glyph order
fn export_glyphs(font: &Font) -> impl Iterator<Item = &Glyph> {
    let skip = font.skip_export_glyphs();
    font.glyphs.values().filter(move |g| !skip.contains(&g.name))
}

/// `[a b c]`
fn glyph_class<'a>(names: impl IntoIterator<Item = &'a GlyphName>) -> String {
    let mut class = String::from("[");
    for (idx, name) in names.into_iter().enumerate() {
        if idx > 0 {
            class.push(' ');
        }
        let _ = write!(class, "{name}");
    }
    class.push(']');
    class
}

/// Make a string usable as a feature file class name
fn class_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use kurbo::BezPath;
    use millir::font::Anchor;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::declaration::parse_declaration;

    /// Emits a fixed block for a fixed tag
    #[derive(Debug)]
    struct Fixed {
        tag: String,
    }

    impl FeatureWriter for Fixed {
        fn name(&self) -> &str {
            &self.tag
        }

        fn generate(&self, _: &Font) -> Result<Generated, Error> {
            Ok(Generated {
                prelude: String::new(),
                blocks: vec![FeatureBlock::new(
                    self.tag.clone(),
                    format!("feature {0} {{\n    # generated\n}} {0};\n", self.tag),
                )],
            })
        }
    }

    fn fixed_registry() -> FeatureWriterRegistry {
        FeatureWriterRegistry::new().register(
            "test.writers::Fixed",
            Arc::new(|options: &Options| {
                let tag = options
                    .get("tag")
                    .and_then(|v| v.as_str())
                    .unwrap_or("liga")
                    .to_string();
                Ok(Box::new(Fixed { tag }) as Box<dyn FeatureWriter>)
            }),
        )
    }

    fn decls(texts: &[&str]) -> Vec<Declaration> {
        texts.iter().map(|t| parse_declaration(t).unwrap()).collect()
    }

    fn font_with_features(fea: &str) -> Font {
        let mut font = Font::new();
        font.features = fea.to_string();
        font
    }

    #[rstest]
    #[case("KernFeatureWriter", BuiltinWriter::Kern)]
    #[case("MarkFeatureWriter", BuiltinWriter::Mark)]
    #[case("ufo2ft.featureWriters.gdefFeatureWriter::GdefFeatureWriter", BuiltinWriter::Gdef)]
    #[case("kern", BuiltinWriter::Kern)]
    fn resolves_builtins(#[case] text: &str, #[case] expected: BuiltinWriter) {
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&[text])))
            .unwrap();
        assert_eq!(vec![expected.short_name()], writers.names());
    }

    #[test]
    fn defaults_when_undeclared() {
        let writers = FeatureWriterRegistry::new().resolve(None).unwrap();
        assert_eq!(vec!["kern", "mark", "gdef"], writers.names());
    }

    #[test]
    fn ellipsis_expands_in_place() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed", "...", "GdefFeatureWriter"])))
            .unwrap();
        assert_eq!(
            vec!["test.writers::Fixed", "kern", "mark", "gdef", "gdef"],
            writers.names()
        );
    }

    #[test]
    fn explicit_order_overrides_default() {
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&["MarkFeatureWriter", "KernFeatureWriter"])))
            .unwrap();
        assert_eq!(vec!["mark", "kern"], writers.names());
    }

    #[test]
    fn none_disables() {
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&["None"])))
            .unwrap();
        assert!(writers.is_disabled());
        let mut font = font_with_features("feature liga { sub f i by f_i; } liga;");
        let before = font.clone();
        assert_eq!(0, writers.write(&mut font).unwrap());
        assert_eq!(before, font);
    }

    #[rstest]
    #[case(&["NoSuchWriter"])]
    #[case(&["other.module::Fixed"])]
    #[case(&["KernFeatureWriter(mode='sometimes')"])]
    #[case(&["None", "KernFeatureWriter"])]
    fn resolution_fails(#[case] texts: &[&str]) {
        assert!(matches!(
            fixed_registry().resolve(Some(&decls(texts))),
            Err(Error::FeatureWriterResolution { .. })
        ));
    }

    #[test]
    fn skip_leaves_existing_feature_alone() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed(tag='liga')"])))
            .unwrap();
        let fea = "feature liga {\n    sub f i by f_i;\n} liga;\n";
        let mut font = font_with_features(fea);
        assert_eq!(0, writers.write(&mut font).unwrap());
        assert_eq!(fea, font.features);
    }

    #[test]
    fn skip_appends_missing_feature() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed(tag='kern')"])))
            .unwrap();
        let mut font = font_with_features("feature liga {\n    sub f i by f_i;\n} liga;\n");
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(
            "feature liga {\n    sub f i by f_i;\n} liga;\n\nfeature kern {\n    # generated\n} kern;\n",
            font.features
        );
    }

    #[test]
    fn append_mode_adds_after_existing() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed(tag='liga', mode='append')"])))
            .unwrap();
        let mut font = font_with_features("feature liga {\n    sub f i by f_i;\n} liga;\n");
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(
            "feature liga {\n    sub f i by f_i;\n} liga;\n\nfeature liga {\n    # generated\n} liga;\n",
            font.features
        );
    }

    #[test]
    fn marker_is_replaced_in_place() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed(tag='liga')"])))
            .unwrap();
        let mut font = font_with_features(
            "languagesystem DFLT dflt;\n\n# Automatic Code\n\nfeature liga {\n    sub f i by f_i;\n} liga;\n",
        );
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(
            "languagesystem DFLT dflt;\n\nfeature liga {\n    # generated\n} liga;\n\nfeature liga {\n    sub f i by f_i;\n} liga;\n",
            font.features
        );
    }

    #[test]
    fn gdef_written_once() {
        let mut font = font_with_mark("");
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&["GdefFeatureWriter", "GdefFeatureWriter"])))
            .unwrap();
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(1, font.features.matches("table GDEF").count());
    }

    fn font_with_mark(fea: &str) -> Font {
        let mut font = font_with_features(fea);
        let mut mark = millir::font::Glyph::new("acutecomb")
            .with_contour(BezPath::from_svg("M0,0 L10,0 L10,10 Z").unwrap());
        mark.anchors.push(Anchor::new("_top", (5.0, 0.0)));
        font.add_glyph(mark);
        font
    }

    #[test]
    fn gdef_written_once_with_marker() {
        let mut font = font_with_mark("languagesystem DFLT dflt;\n\n# Automatic Code\n");
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&["GdefFeatureWriter", "GdefFeatureWriter"])))
            .unwrap();
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(1, font.features.matches("table GDEF").count());
        assert!(!font.features.contains(INSERT_MARKER));
    }

    #[test]
    fn explicit_gdef_wins_over_marker() {
        let fea = "table GDEF {\n    GlyphClassDef , , [acutecomb], ;\n} GDEF;\n\n# Automatic Code\n";
        let mut font = font_with_mark(fea);
        let writers = FeatureWriterRegistry::new()
            .resolve(Some(&decls(&["GdefFeatureWriter"])))
            .unwrap();
        assert_eq!(0, writers.write(&mut font).unwrap());
        assert_eq!(1, font.features.matches("table GDEF").count());
    }

    #[test]
    fn append_mode_ignores_marker() {
        let writers = fixed_registry()
            .resolve(Some(&decls(&["test.writers::Fixed(tag='liga', mode='append')"])))
            .unwrap();
        let mut font = font_with_features("# Automatic Code\n\nfeature liga {\n    sub f i by f_i;\n} liga;\n");
        assert_eq!(1, writers.write(&mut font).unwrap());
        assert_eq!(
            "# Automatic Code\n\nfeature liga {\n    sub f i by f_i;\n} liga;\n\nfeature liga {\n    # generated\n} liga;\n",
            font.features
        );
    }

    #[test]
    fn categories_from_lib_win() {
        let mut font = Font::new();
        let mut a = millir::font::Glyph::new("a");
        a.anchors.push(Anchor::new("_top", (0.0, 0.0)));
        font.add_glyph(a);
        font.add_glyph(millir::font::Glyph::new("b"));
        let mut categories = plist::Dictionary::new();
        categories.insert("a".into(), "base".into());
        font.lib
            .insert(OPENTYPE_CATEGORIES.into(), plist::Value::Dictionary(categories));
        assert_eq!(
            BTreeMap::from([(GlyphName::new("a"), GlyphCategory::Base)]),
            glyph_categories(&font)
        );
    }

    #[rstest]
    #[case("top_1", Some(("top", 1)))]
    #[case("top_0", None)]
    #[case("_top", None)]
    #[case("top", None)]
    fn ligature_anchors(#[case] name: &str, #[case] expected: Option<(&str, usize)>) {
        assert_eq!(expected, ligature_anchor(name));
    }
}

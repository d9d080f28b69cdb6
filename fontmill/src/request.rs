//! The immutable description of one build.

use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::warn;
use millbe::{
    declaration::{parse_declaration, Declaration},
    features::FeatureWriterRegistry,
    filters::{FilterRegistry, FilterSpec},
};
use millir::{
    designspace::{DesignSpaceModel, Instance, InstanceFilter},
    instancer::{Engine, InstanceOptions},
};

use crate::{args::OutputFormat, output::OutputLayout, Args, Error};

/// What to build from
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Designspace(PathBuf),
    Ufos(Vec<PathBuf>),
}

impl Input {
    fn new(args: &Args) -> Result<Input, Error> {
        if let Some(glyphs) = &args.glyphs_path {
            return Err(Error::UnsupportedInput(glyphs.clone()));
        }
        match (&args.mm_designspace, args.ufo_paths.as_slice()) {
            (Some(designspace), []) => {
                if designspace.extension().and_then(OsStr::to_str) != Some("designspace") {
                    return Err(Error::UnsupportedInput(designspace.clone()));
                }
                Ok(Input::Designspace(designspace.clone()))
            }
            (None, ufos) if !ufos.is_empty() => {
                if let Some(bad) = ufos
                    .iter()
                    .find(|p| p.extension().and_then(OsStr::to_str) != Some("ufo"))
                {
                    return Err(Error::UnsupportedInput(bad.clone()));
                }
                Ok(Input::Ufos(ufos.to_vec()))
            }
            (None, _) => Err(Error::Args(
                "one of --mm-designspace or --ufo-paths is required".to_string(),
            )),
            (Some(_), _) => Err(Error::Args(
                "--mm-designspace and --ufo-paths are exclusive".to_string(),
            )),
        }
    }

    /// The stem variable fonts are named after
    pub fn stem(&self) -> String {
        let path = match self {
            Input::Designspace(path) => Some(path.as_path()),
            Input::Ufos(paths) => paths.first().map(PathBuf::as_path),
        };
        path.and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "font".to_string())
    }
}

/// Which instances to interpolate
#[derive(Debug, Clone)]
pub enum InstanceSelection {
    All,
    Matching(InstanceFilter),
    /// None of the designspace's instances; masters as instances only
    Nothing,
}

impl InstanceSelection {
    /// The designspace instances selected, restricted to a family if given
    pub fn select(&self, model: &DesignSpaceModel, family: Option<&str>) -> Vec<Instance> {
        let filter = match self {
            InstanceSelection::All => None,
            InstanceSelection::Matching(filter) => Some(filter),
            InstanceSelection::Nothing => return Vec::new(),
        };
        model
            .filtered_instances(filter)
            .filter(|instance| model.is_in_family(instance, family))
            .cloned()
            .collect()
    }
}

/// Filter and feature writer declarations given on the command line.
///
/// They replace whatever the font lib declares. Filters are resolved here so
/// a typo fails before anything is loaded.
#[derive(Debug, Clone, Default)]
pub struct ChainOverrides {
    pub filters: Option<Vec<FilterSpec>>,
    pub feature_writers: Option<Vec<Declaration>>,
}

/// One compilation job, resolved and validated up front.
///
/// Stages read it; nothing changes it once built.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub input: Input,
    pub outputs: BTreeSet<OutputFormat>,
    /// None builds masters only
    pub instances: Option<InstanceSelection>,
    pub masters_as_instances: bool,
    pub family_name: Option<String>,
    pub engine: Engine,
    pub instance_options: InstanceOptions,
    pub overrides: ChainOverrides,
    pub filter_registry: Arc<FilterRegistry>,
    pub writer_registry: Arc<FeatureWriterRegistry>,
    pub remove_overlaps: bool,
    pub reverse_direction: bool,
    pub conversion_error: f64,
    /// None decides per font
    pub production_names: Option<bool>,
    /// None decides per font
    pub subset: Option<bool>,
    /// None checks only when an output needs compatible masters
    pub check_compatibility: Option<bool>,
    /// ttfautohint arguments, if hinting
    pub autohint: Option<String>,
    pub fail_fast: bool,
    pub jobs: usize,
    pub timing: bool,
    pub layout: OutputLayout,
}

fn parse_all(texts: &[String]) -> Result<Option<Vec<Declaration>>, Error> {
    if texts.is_empty() {
        return Ok(None);
    }
    texts
        .iter()
        .map(|text| parse_declaration(text).map_err(Error::from))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

impl BuildRequest {
    /// A request using only the built-in filters and feature writers
    pub fn new(args: &Args) -> Result<BuildRequest, Error> {
        BuildRequest::with_registries(args, FilterRegistry::new(), FeatureWriterRegistry::new())
    }

    /// A request that may also use externally supplied filters and writers
    pub fn with_registries(
        args: &Args,
        filter_registry: FilterRegistry,
        writer_registry: FeatureWriterRegistry,
    ) -> Result<BuildRequest, Error> {
        let input = Input::new(args)?;
        let outputs: BTreeSet<OutputFormat> = args.output.iter().copied().collect();
        if outputs.is_empty() {
            return Err(Error::Args("no outputs requested".to_string()));
        }
        if args.jobs == 0 {
            return Err(Error::Args("--jobs must be at least 1".to_string()));
        }
        if args.conversion_error.is_nan() || args.conversion_error <= 0.0 {
            return Err(Error::Args(format!(
                "--conversion-error must be positive, not {}",
                args.conversion_error
            )));
        }

        let instances = match args.interpolate.as_deref() {
            None if args.masters_as_instances => Some(InstanceSelection::Nothing),
            None => None,
            Some(".*") => Some(InstanceSelection::All),
            Some(pattern) => Some(InstanceSelection::Matching(InstanceFilter::new(pattern)?)),
        };
        let needs_designspace = instances.is_some() || outputs.iter().any(|o| o.is_variable());
        if needs_designspace && matches!(input, Input::Ufos(_)) {
            return Err(Error::Args(
                "instances and variable fonts need a designspace".to_string(),
            ));
        }
        if args.mti_source.is_some() {
            return Err(Error::UnsupportedOption("--mti-source"));
        }
        if args.interpolate_binary_layout {
            if matches!(input, Input::Ufos(_)) {
                return Err(Error::Args(
                    "--interpolate-binary-layout needs a designspace".to_string(),
                ));
            }
            // kerning, anchors and GDEF classes are interpolated before features are written
            warn!(
                "Instance layout always comes from interpolated sources, \
                 --interpolate-binary-layout changes nothing"
            );
        }

        let filters = parse_all(&args.filters)?
            .map(|declarations| {
                declarations
                    .iter()
                    .map(|d| FilterSpec::from_declaration(d, &filter_registry))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        let feature_writers = parse_all(&args.feature_writers)?;
        if let Some(declarations) = &feature_writers {
            // resolve once to reject unknown writers now, not per font
            writer_registry.resolve(Some(declarations))?;
        }

        Ok(BuildRequest {
            input,
            outputs,
            instances,
            masters_as_instances: args.masters_as_instances,
            family_name: args.family_name.clone(),
            engine: args.interpolation_engine.into(),
            instance_options: InstanceOptions {
                round_geometry: true,
                reuse_masters: !args.masters_as_instances,
            },
            overrides: ChainOverrides {
                filters,
                feature_writers,
            },
            filter_registry: Arc::new(filter_registry),
            writer_registry: Arc::new(writer_registry),
            remove_overlaps: !args.keep_overlaps,
            reverse_direction: !args.keep_direction,
            conversion_error: args.conversion_error,
            production_names: args.production_names(),
            subset: args.subset(),
            check_compatibility: args.check_compatibility(),
            autohint: args.autohint.clone(),
            fail_fast: args.fail_fast,
            jobs: args.jobs,
            timing: args.timing,
            layout: OutputLayout::new(args),
        })
    }

    pub fn wants(&self, output: OutputFormat) -> bool {
        self.outputs.contains(&output)
    }

    /// Static binaries for each master, when instances aren't requested
    pub fn builds_static_masters(&self) -> bool {
        self.instances.is_none() && self.outputs.iter().any(|o| o.is_static_binary())
    }

    /// Should masters be checked for compatibility before this output
    pub fn checks_compatibility(&self, output: OutputFormat) -> bool {
        self.check_compatibility
            .unwrap_or(output.is_variable() || output.is_interpolatable())
    }
}

#[cfg(test)]
mod tests {
    use millbe::filters::FilterKind;

    use super::*;

    fn designspace_args() -> Args {
        Args::for_designspace("Test.designspace", "build")
    }

    #[test]
    fn masters_only_by_default() {
        let request = BuildRequest::new(&designspace_args()).unwrap();
        assert!(request.instances.is_none());
        assert!(request.builds_static_masters());
        assert_eq!(Input::Designspace("Test.designspace".into()), request.input);
        assert_eq!("Test", request.input.stem());
    }

    #[test]
    fn glyphs_is_unsupported() {
        let mut args = designspace_args();
        args.mm_designspace = None;
        args.glyphs_path = Some("Test.glyphs".into());
        assert!(matches!(
            BuildRequest::new(&args),
            Err(Error::UnsupportedInput(_))
        ));
    }

    #[test]
    fn binary_layout_interpolation_needs_a_designspace() {
        let mut args = Args::for_ufos(vec!["A.ufo".into()], "build");
        args.interpolate_binary_layout = true;
        assert!(matches!(BuildRequest::new(&args), Err(Error::Args(_))));

        let mut args = designspace_args();
        args.interpolate_binary_layout = true;
        args.interpolate = Some(".*".to_string());
        assert!(BuildRequest::new(&args).is_ok());
    }

    #[test]
    fn mti_sources_are_unsupported() {
        let mut args = designspace_args();
        args.mti_source = Some("Test.plist".into());
        assert!(matches!(
            BuildRequest::new(&args),
            Err(Error::UnsupportedOption("--mti-source"))
        ));
    }

    #[test]
    fn instances_need_a_designspace() {
        let mut args = Args::for_ufos(vec!["A.ufo".into()], "build");
        args.interpolate = Some(".*".to_string());
        assert!(matches!(BuildRequest::new(&args), Err(Error::Args(_))));
    }

    #[test]
    fn masters_as_instances_alone_selects_no_designspace_instances() {
        let mut args = designspace_args();
        args.masters_as_instances = true;
        let request = BuildRequest::new(&args).unwrap();
        assert!(!request.instance_options.reuse_masters);
        assert!(matches!(request.instances, Some(InstanceSelection::Nothing)));
        assert!(!request.builds_static_masters());
    }

    #[test]
    fn command_line_filters_resolve_up_front() {
        let mut args = designspace_args();
        args.filters = vec!["DecomposeComponentsFilter(pre=True)".to_string()];
        let request = BuildRequest::new(&args).unwrap();
        let filters = request.overrides.filters.unwrap();
        assert!(matches!(filters[0].kind, FilterKind::Builtin(_)));

        args.filters = vec!["NoSuchFilter".to_string()];
        assert!(matches!(
            BuildRequest::new(&args),
            Err(Error::Backend(millbe::Error::FilterResolution { .. }))
        ));
    }

    #[test]
    fn unknown_writer_fails_up_front() {
        let mut args = designspace_args();
        args.feature_writers = vec!["NoSuchWriter".to_string()];
        assert!(matches!(
            BuildRequest::new(&args),
            Err(Error::Backend(millbe::Error::FeatureWriterResolution { .. }))
        ));
    }

    #[test]
    fn compatibility_defaults_per_output() {
        let request = BuildRequest::new(&designspace_args()).unwrap();
        assert!(!request.checks_compatibility(OutputFormat::Ttf));
        assert!(request.checks_compatibility(OutputFormat::Variable));
        assert!(request.checks_compatibility(OutputFormat::TtfInterpolatable));
    }
}

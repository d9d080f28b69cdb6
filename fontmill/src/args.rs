//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use millir::instancer::Engine;
use serde::{Deserialize, Serialize};

/// A font output fontmill knows how to produce
#[derive(
    Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Ufo,
    Otf,
    Ttf,
    TtfInterpolatable,
    OtfInterpolatable,
    Variable,
    VariableCff2,
}

impl OutputFormat {
    /// Outputs that are a single font built from every master
    pub fn is_variable(self) -> bool {
        matches!(self, OutputFormat::Variable | OutputFormat::VariableCff2)
    }

    pub fn is_interpolatable(self) -> bool {
        matches!(
            self,
            OutputFormat::TtfInterpolatable | OutputFormat::OtfInterpolatable
        )
    }

    /// Outputs produced for each static master or instance
    pub fn is_static_binary(self) -> bool {
        matches!(self, OutputFormat::Otf | OutputFormat::Ttf)
    }
}

#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationEngine {
    /// Within the masters only, isotropic locations only
    #[default]
    Minimal,
    /// Extrapolation and anisotropic locations
    Extended,
}

impl From<InterpolationEngine> for Engine {
    fn from(value: InterpolationEngine) -> Self {
        match value {
            InterpolationEngine::Minimal => Engine::Minimal,
            InterpolationEngine::Extended => Engine::Extended,
        }
    }
}

#[derive(Serialize, Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<Verbosity> for log::LevelFilter {
    fn from(value: Verbosity) -> Self {
        match value {
            Verbosity::Error => log::LevelFilter::Error,
            Verbosity::Warn => log::LevelFilter::Warn,
            Verbosity::Info => log::LevelFilter::Info,
            Verbosity::Debug => log::LevelFilter::Debug,
            Verbosity::Trace => log::LevelFilter::Trace,
        }
    }
}

/// What font can we build for you today?
#[derive(Serialize, Deserialize, Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Args {
    /// One or more UFOs, each built as a master
    #[arg(short = 'u', long, num_args = 1.., conflicts_with_all = ["mm_designspace", "glyphs_path"])]
    #[serde(default)]
    pub ufo_paths: Vec<PathBuf>,

    /// A designspace document
    #[arg(short = 'm', long, conflicts_with = "glyphs_path")]
    pub mm_designspace: Option<PathBuf>,

    /// A .glyphs file. Not supported; UFO and designspace sources only.
    #[arg(short = 'g', long)]
    pub glyphs_path: Option<PathBuf>,

    /// Output formats
    #[arg(short = 'o', long, value_enum, num_args = 1.., default_values_t = [OutputFormat::Ttf])]
    pub output: Vec<OutputFormat>,

    /// Interpolate static instances; all of them, or those whose name matches the regex
    #[arg(short = 'i', long, num_args = 0..=1, default_missing_value = ".*")]
    pub interpolate: Option<String>,

    /// Also build masters as if they were instances
    #[arg(short = 'M', long)]
    #[serde(default)]
    pub masters_as_instances: bool,

    /// Only build instances of this family
    #[arg(long)]
    pub family_name: Option<String>,

    /// How to interpolate instances
    #[arg(long, value_enum, default_value_t)]
    #[serde(default)]
    pub interpolation_engine: InterpolationEngine,

    /// Filters to run, e.g. 'DecomposeComponentsFilter(pre=True)'. Overrides the font lib.
    #[arg(long = "filter")]
    #[serde(default)]
    pub filters: Vec<String>,

    /// Feature writers to run, e.g. 'KernFeatureWriter(mode="append")'. Overrides the font lib.
    #[arg(long = "feature-writer")]
    #[serde(default)]
    pub feature_writers: Vec<String>,

    /// Interpolate instance layout from compiled master layout. Designspace only.
    #[arg(long)]
    #[serde(default)]
    pub interpolate_binary_layout: bool,

    /// A plist mapping master names to MTI layout sources. Not supported.
    #[arg(long)]
    pub mti_source: Option<PathBuf>,

    /// Don't remove overlaps
    #[arg(long)]
    #[serde(default)]
    pub keep_overlaps: bool,

    /// Don't reverse contours when converting to TrueType
    #[arg(long)]
    #[serde(default)]
    pub keep_direction: bool,

    /// Maximum cubic to quadratic error, relative to the em
    #[arg(short = 'e', long, default_value_t = millbe::outline::DEFAULT_CONVERSION_ERROR)]
    pub conversion_error: f64,

    /// Rename glyphs to their production names
    #[arg(long, overrides_with = "no_production_names")]
    #[serde(default)]
    pub production_names: bool,

    #[arg(long)]
    #[serde(default)]
    pub no_production_names: bool,

    /// Remove glyphs marked not to export
    #[arg(long, overrides_with = "no_subset")]
    #[serde(default)]
    pub subset: bool,

    #[arg(long)]
    #[serde(default)]
    pub no_subset: bool,

    /// Check masters are compatible before interpolatable or variable outputs
    #[arg(long, overrides_with = "no_check_compatibility")]
    #[serde(default)]
    pub check_compatibility: bool,

    #[arg(long)]
    #[serde(default)]
    pub no_check_compatibility: bool,

    /// Run ttfautohint on TrueType outputs, with optional arguments
    #[arg(short = 'a', long, num_args = 0..=1, default_missing_value = "")]
    pub autohint: Option<String>,

    /// Stop at the first instance that fails
    #[arg(long)]
    #[serde(default)]
    pub fail_fast: bool,

    /// How many instances to build at once
    #[arg(short = 'j', long, default_value_t = 1)]
    pub jobs: usize,

    /// Print how long each stage took
    #[arg(long)]
    #[serde(default)]
    pub timing: bool,

    /// Write every output here instead of per-kind directories
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Where to write master UFOs
    #[arg(long)]
    pub master_dir: Option<PathBuf>,

    /// Where to write instance UFOs
    #[arg(long)]
    pub instance_dir: Option<PathBuf>,

    /// Working directory for the build; outputs land beneath it
    #[arg(short, long, default_value = "build")]
    pub build_dir: PathBuf,

    /// Log level, if RUST_LOG isn't set
    #[arg(short, long, value_enum, default_value_t)]
    #[serde(default)]
    pub verbose: Verbosity,
}

/// A --flag/--no-flag pair; None if neither was given
fn paired(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

impl Args {
    pub fn production_names(&self) -> Option<bool> {
        paired(self.production_names, self.no_production_names)
    }

    pub fn subset(&self) -> Option<bool> {
        paired(self.subset, self.no_subset)
    }

    pub fn check_compatibility(&self) -> Option<bool> {
        paired(self.check_compatibility, self.no_check_compatibility)
    }

    /// Defaults as if parsed from `fontmill -m <designspace>`, for tests
    pub fn for_designspace(designspace: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Args {
        Args {
            mm_designspace: Some(designspace.into()),
            build_dir: build_dir.into(),
            ..Args::default_values()
        }
    }

    /// Defaults as if parsed from `fontmill -u <ufos>`, for tests
    pub fn for_ufos(ufos: Vec<PathBuf>, build_dir: impl Into<PathBuf>) -> Args {
        Args {
            ufo_paths: ufos,
            build_dir: build_dir.into(),
            ..Args::default_values()
        }
    }

    fn default_values() -> Args {
        Args {
            ufo_paths: Vec::new(),
            mm_designspace: None,
            glyphs_path: None,
            output: vec![OutputFormat::Ttf],
            interpolate: None,
            masters_as_instances: false,
            family_name: None,
            interpolation_engine: InterpolationEngine::default(),
            filters: Vec::new(),
            feature_writers: Vec::new(),
            interpolate_binary_layout: false,
            mti_source: None,
            keep_overlaps: false,
            keep_direction: false,
            conversion_error: millbe::outline::DEFAULT_CONVERSION_ERROR,
            production_names: false,
            no_production_names: false,
            subset: false,
            no_subset: false,
            check_compatibility: false,
            no_check_compatibility: false,
            autohint: None,
            fail_fast: false,
            jobs: 1,
            timing: false,
            output_dir: None,
            master_dir: None,
            instance_dir: None,
            build_dir: PathBuf::from("build"),
            verbose: Verbosity::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_defaults_match_test_defaults() {
        let parsed = Args::parse_from(["fontmill", "-m", "Test.designspace"]);
        assert_eq!(
            Args::for_designspace("Test.designspace", "build"),
            parsed
        );
    }

    #[test]
    fn interpolate_with_and_without_pattern() {
        let all = Args::parse_from(["fontmill", "-m", "Test.designspace", "-i", "-o", "ttf"]);
        assert_eq!(Some(".*"), all.interpolate.as_deref());
        let some = Args::parse_from(["fontmill", "-m", "Test.designspace", "-i", "Test Bold"]);
        assert_eq!(Some("Test Bold"), some.interpolate.as_deref());
    }

    #[test]
    fn several_outputs() {
        let args = Args::parse_from([
            "fontmill",
            "-u",
            "A.ufo",
            "B.ufo",
            "-o",
            "ufo",
            "ttf-interpolatable",
        ]);
        assert_eq!(2, args.ufo_paths.len());
        assert_eq!(
            vec![OutputFormat::Ufo, OutputFormat::TtfInterpolatable],
            args.output
        );
    }

    #[test]
    fn paired_flags() {
        let args = Args::parse_from([
            "fontmill",
            "-m",
            "Test.designspace",
            "--no-subset",
            "--production-names",
        ]);
        assert_eq!(Some(false), args.subset());
        assert_eq!(Some(true), args.production_names());
        assert_eq!(None, args.check_compatibility());
    }

    #[test]
    fn autohint_without_args() {
        let args = Args::parse_from(["fontmill", "-m", "Test.designspace", "-a"]);
        assert_eq!(Some(""), args.autohint.as_deref());
    }

    #[test]
    fn sources_conflict() {
        assert!(Args::try_parse_from(["fontmill", "-m", "A.designspace", "-u", "A.ufo"]).is_err());
    }
}

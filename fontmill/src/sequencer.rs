//! Drives a build from sources to written fonts.
//!
//! A build moves through [`BuildState`]s: sources are loaded, masters are
//! prepared (and written, if asked for), then binaries are built and written.
//! Masters are shared by everything that follows so any failure while
//! preparing or building them ends the build. Instances are independent; one
//! that fails is reported and skipped unless the request says to fail fast.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, info, warn};
use millbe::{
    autohint::Autohinter,
    declaration::{declarations_from_lib, OptionValue, Options},
    features::{FeatureWriters, FEATURE_WRITERS_KEY},
    filters::{BuiltinChain, FilterPipeline, FilterPosition, FilterSpec, COLOR_LAYERS, FILTERS_KEY},
    font::{source_fonts, FontAssembler, OutlineFlavor},
    outline::convert_compatible,
    postprocess::{has_non_export_glyphs, rename_to_production_names, subset},
};
use millir::{
    compatibility::CompatibilityChecker,
    designspace::{DesignSpaceModel, Instance},
    font::Font,
    instancer::InstanceGenerator,
};
use rayon::prelude::*;
use ufo2millir::{load_designspace, load_ufo_as_model, save_ufo, DesignSpaceWriter};

use crate::{
    args::OutputFormat,
    diagnostics::{Diagnostic, DiagnosticSink, Severity, Stage},
    output::{font_stem, require_dir, write_file, OutputKind},
    request::{BuildRequest, Input},
    timing::StageTimer,
    Error,
};

/// Where a build is up to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Start,
    Loaded,
    MastersPrepared,
    OtfBuilt,
    TtfBuilt,
    VariableBuilt,
    Written,
    Done,
    Failed,
}

impl BuildState {
    fn is_terminal(self) -> bool {
        matches!(self, BuildState::Done | BuildState::Failed)
    }

    fn is_built(self) -> bool {
        matches!(
            self,
            BuildState::OtfBuilt | BuildState::TtfBuilt | BuildState::VariableBuilt
        )
    }

    pub fn can_advance_to(self, next: BuildState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            BuildState::Failed => true,
            BuildState::Loaded => self == BuildState::Start,
            BuildState::MastersPrepared => self == BuildState::Loaded,
            BuildState::OtfBuilt | BuildState::TtfBuilt | BuildState::VariableBuilt => {
                self == BuildState::MastersPrepared || self.is_built()
            }
            // a build of only UFOs has no binaries to build
            BuildState::Written => self == BuildState::MastersPrepared || self.is_built(),
            BuildState::Done => self == BuildState::Written,
            BuildState::Start => false,
        }
    }
}

/// What a build produced
#[derive(Debug, Default)]
pub struct BuildReport {
    pub written: Vec<PathBuf>,
    /// Instances that failed and were skipped, by name
    pub failures: Vec<(String, Error)>,
    /// How many instances were attempted
    pub instances: usize,
}

impl BuildReport {
    /// True if every requested output was produced
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How a static font's outlines end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Flavor {
    Ttf,
    Otf,
    /// Cubic until converted together with the other masters
    Interpolatable,
}

/// The filters and feature writers resolved for one designspace
#[derive(Debug)]
struct Chains {
    filters: BTreeMap<Flavor, FilterPipeline>,
    writers: FeatureWriters,
}

impl Chains {
    fn filters(&self, flavor: Flavor) -> Result<&FilterPipeline, Error> {
        self.filters.get(&flavor).ok_or_else(|| {
            Error::Args(format!("no filters were resolved for {flavor:?} outputs"))
        })
    }
}

fn outline_flavor(output: OutputFormat) -> OutlineFlavor {
    match output {
        OutputFormat::Otf | OutputFormat::OtfInterpolatable => OutlineFlavor::Cff,
        OutputFormat::VariableCff2 => OutlineFlavor::Cff2,
        _ => OutlineFlavor::TrueType,
    }
}

pub struct StageSequencer {
    request: BuildRequest,
    sink: Arc<dyn DiagnosticSink>,
    timer: StageTimer,
    state: BuildState,
}

impl StageSequencer {
    pub fn new(request: BuildRequest, sink: Arc<dyn DiagnosticSink>) -> StageSequencer {
        StageSequencer {
            request,
            sink,
            timer: StageTimer::new(),
            state: BuildState::Start,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn timer(&self) -> &StageTimer {
        &self.timer
    }

    fn record(&self, stage: Stage, entity: &str, severity: Severity, message: impl Into<String>) {
        self.sink
            .record(Diagnostic::new(stage, entity, severity, message));
    }

    fn advance(&mut self, next: BuildState) {
        if self.state == next {
            return;
        }
        if !self.state.can_advance_to(next) {
            warn!("Unexpected build transition {:?} => {next:?}", self.state);
        }
        debug!("Build {:?} => {next:?}", self.state);
        self.state = next;
    }

    /// Run the whole build.
    ///
    /// Fatal problems are returned as errors; skipped instances are in the
    /// report's failures.
    pub fn run(&mut self) -> Result<BuildReport, Error> {
        match self.run_stages() {
            Ok(report) => {
                self.advance(BuildState::Done);
                Ok(report)
            }
            Err(e) => {
                self.advance(BuildState::Failed);
                let (stage, entity) = match &e {
                    Error::Stage { stage, entity, .. } => (*stage, entity.clone()),
                    _ => (Stage::Load, "build".to_string()),
                };
                self.record(stage, &entity, Severity::Error, format!("build failed: {e}"));
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<BuildReport, Error> {
        let models = self.load()?;
        self.advance(BuildState::Loaded);

        let chains = models
            .iter()
            .map(|model| self.resolve_chains(model))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = BuildReport::default();
        for model in models.iter() {
            report.written.extend(self.write_master_ufos(model)?);
        }
        // everything that follows reads masters; they are complete from here on
        self.advance(BuildState::MastersPrepared);

        if self.request.builds_static_masters() {
            for (model, chains) in models.iter().zip(chains.iter()) {
                report
                    .written
                    .extend(self.build_static_masters(model, chains)?);
            }
            for output in self.static_outputs() {
                self.advance(match outline_flavor(output) {
                    OutlineFlavor::TrueType => BuildState::TtfBuilt,
                    _ => BuildState::OtfBuilt,
                });
            }
        }

        let interpolatable: Vec<OutputFormat> = self
            .request
            .outputs
            .iter()
            .copied()
            .filter(|o| o.is_interpolatable())
            .collect();
        for output in interpolatable {
            report
                .written
                .extend(self.build_interpolatable_masters(&models, &chains, output)?);
            self.advance(match outline_flavor(output) {
                OutlineFlavor::TrueType => BuildState::TtfBuilt,
                _ => BuildState::OtfBuilt,
            });
        }

        let variable: Vec<OutputFormat> = self
            .request
            .outputs
            .iter()
            .copied()
            .filter(|o| o.is_variable())
            .collect();
        for output in variable {
            for (model, chains) in models.iter().zip(chains.iter()) {
                report
                    .written
                    .push(self.build_variable(model, chains, output)?);
            }
            self.advance(BuildState::VariableBuilt);
        }

        if self.request.instances.is_some() {
            for (model, chains) in models.iter().zip(chains.iter()) {
                self.build_instances(model, chains, &mut report)?;
            }
        }

        self.advance(BuildState::Written);
        Ok(report)
    }

    fn static_outputs(&self) -> Vec<OutputFormat> {
        self.request
            .outputs
            .iter()
            .copied()
            .filter(|o| o.is_static_binary())
            .collect()
    }

    fn load(&self) -> Result<Vec<DesignSpaceModel>, Error> {
        let out_of_range = self.request.engine.out_of_range();
        match &self.request.input {
            Input::Designspace(path) => {
                let entity = path.display().to_string();
                let model = self
                    .timer
                    .time(Stage::Load, &entity, || load_designspace(path, out_of_range))
                    .map_err(|e| Error::from(e).at(Stage::Load, &entity))?;
                model.warn_about_orphan_glyphs();
                self.record(
                    Stage::Load,
                    &entity,
                    Severity::Info,
                    format!(
                        "{} axes, {} sources, {} instances, {} rules",
                        model.axes().len(),
                        model.sources().len(),
                        model.instances().len(),
                        model.rules().len()
                    ),
                );
                Ok(vec![model])
            }
            Input::Ufos(paths) => paths
                .iter()
                .map(|path| {
                    let entity = path.display().to_string();
                    self.timer
                        .time(Stage::Load, &entity, || load_ufo_as_model(path))
                        .map_err(|e| Error::from(e).at(Stage::Load, &entity))
                })
                .collect(),
        }
    }

    fn filter_specs(&self, model: &DesignSpaceModel) -> Result<Vec<FilterSpec>, Error> {
        if let Some(specs) = &self.request.overrides.filters {
            return Ok(specs.clone());
        }
        let Some(declarations) = declarations_from_lib(&model.default_font().lib, FILTERS_KEY)?
        else {
            return Ok(Vec::new());
        };
        declarations
            .iter()
            .map(|d| FilterSpec::from_declaration(d, &self.request.filter_registry))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn builtins(&self, model: &DesignSpaceModel, flavor: Flavor) -> BuiltinChain {
        let explode_color_layers = model.default_font().lib.contains_key(COLOR_LAYERS);
        match flavor {
            Flavor::Ttf => {
                let mut options = Options::new();
                options.insert(
                    "conversionError".to_string(),
                    OptionValue::Float(self.request.conversion_error),
                );
                options.insert(
                    "reverseDirection".to_string(),
                    OptionValue::Bool(self.request.reverse_direction),
                );
                BuiltinChain {
                    explode_color_layers,
                    remove_overlaps: self.request.remove_overlaps,
                    cubic_to_quadratic: Some(options),
                    ..BuiltinChain::none()
                }
            }
            // CFF has no components
            Flavor::Otf => BuiltinChain {
                explode_color_layers,
                decompose_components: true,
                remove_overlaps: self.request.remove_overlaps,
                ..BuiltinChain::none()
            },
            // overlap removal would break compatibility
            Flavor::Interpolatable => BuiltinChain {
                explode_color_layers,
                ..BuiltinChain::none()
            },
        }
    }

    /// Resolve every chain the request needs, before any font is processed
    fn resolve_chains(&self, model: &DesignSpaceModel) -> Result<Chains, Error> {
        let entity = model.default_source().name.clone();
        let resolve = || -> Result<Chains, Error> {
            let specs = self.filter_specs(model)?;
            let mut flavors = Vec::new();
            for output in self.request.outputs.iter() {
                match output {
                    OutputFormat::Ufo => (),
                    OutputFormat::Ttf => flavors.push(Flavor::Ttf),
                    OutputFormat::Otf => flavors.push(Flavor::Otf),
                    _ => flavors.push(Flavor::Interpolatable),
                }
            }
            let mut filters = BTreeMap::new();
            for flavor in flavors {
                if filters.contains_key(&flavor) {
                    continue;
                }
                let pipeline = FilterPipeline::from_specs(
                    specs.clone(),
                    &self.builtins(model, flavor),
                    &self.request.filter_registry,
                )?;
                debug!(
                    "{flavor:?} filters: pre {:?}, post {:?}",
                    pipeline.names(FilterPosition::Pre),
                    pipeline.names(FilterPosition::Post)
                );
                filters.insert(flavor, pipeline);
            }

            let lib_writers;
            let writer_declarations = match &self.request.overrides.feature_writers {
                Some(declarations) => Some(declarations.as_slice()),
                None => {
                    lib_writers =
                        declarations_from_lib(&model.default_font().lib, FEATURE_WRITERS_KEY)?;
                    lib_writers.as_deref()
                }
            };
            let writers = self.request.writer_registry.resolve(writer_declarations)?;
            debug!("Feature writers {:?}", writers.names());
            Ok(Chains { filters, writers })
        };
        self.timer
            .time(Stage::Resolve, &entity, resolve)
            .map_err(|e| e.at(Stage::Resolve, &entity))
    }

    fn write_master_ufos(&self, model: &DesignSpaceModel) -> Result<Vec<PathBuf>, Error> {
        if !self.request.wants(OutputFormat::Ufo) {
            return Ok(Vec::new());
        }
        let layout = &self.request.layout;
        let mut written = Vec::new();
        let mut filenames: BTreeMap<usize, String> = BTreeMap::new();
        for (idx, source) in model.sources().iter().enumerate() {
            let stem = font_stem(&source.font.info);
            filenames.insert(idx, format!("{stem}.ufo"));
            if source.is_layer() {
                continue;
            }
            let file = layout
                .prepare_file(OutputKind::MasterUfo, &stem)
                .and_then(|file| {
                    self.timer.time(Stage::Write, &source.name, || {
                        save_ufo(&source.font, &file).map_err(Error::from)
                    })?;
                    Ok(file)
                })
                .map_err(|e| e.at(Stage::Write, &source.name))?;
            self.record(
                Stage::Write,
                &source.name,
                Severity::Info,
                format!("wrote {}", file.display()),
            );
            written.push(file);
        }

        if let Input::Designspace(_) = &self.request.input {
            let mut writer = DesignSpaceWriter::new(model.axes());
            for (idx, source) in model.sources().iter().enumerate() {
                writer = writer.source(
                    &source.name,
                    &filenames[&idx],
                    &source.location,
                    source.layer.as_deref(),
                );
            }
            for instance in model.instances() {
                writer = writer.instance(instance);
            }
            let dir = require_dir(&layout.dir(OutputKind::MasterUfo))?;
            let file = dir.join(format!("{}.designspace", self.request.input.stem()));
            for rule in model.rules() {
                writer = writer
                    .rule(rule)
                    .map_err(|e| Error::from(e).at(Stage::Write, file.display().to_string()))?;
            }
            writer
                .lib(model.lib().clone())
                .save(&file)
                .map_err(|e| Error::from(e).at(Stage::Write, file.display().to_string()))?;
            written.push(file);
        }
        Ok(written)
    }

    fn should_subset(&self, font: &Font) -> bool {
        self.request
            .subset
            .unwrap_or_else(|| has_non_export_glyphs(font))
    }

    /// Filters, feature writers and post-processing for a font that is
    /// about to become a static binary. Outlines are converted by the
    /// filters for [`Flavor::Ttf`], by the caller for interpolatable masters.
    fn prepare_static(
        &self,
        font: &mut Font,
        chains: &Chains,
        flavor: Flavor,
        entity: &str,
    ) -> Result<(), Error> {
        let filters = chains.filters(flavor)?;
        let subset_font = self.should_subset(font);
        self.timer
            .time(Stage::Filter, entity, || {
                filters.apply(font, FilterPosition::Pre, None)
            })
            .map_err(|e| Error::from(e).at(Stage::Filter, entity))?;
        self.timer
            .time(Stage::Features, entity, || chains.writers.write(font))
            .map_err(|e| Error::from(e).at(Stage::Features, entity))?;
        if subset_font {
            let removed = self
                .timer
                .time(Stage::Subset, entity, || subset(font))
                .map_err(|e| Error::from(e).at(Stage::Subset, entity))?;
            if removed > 0 {
                self.record(
                    Stage::Subset,
                    entity,
                    Severity::Debug,
                    format!("removed {removed} glyphs"),
                );
            }
        }
        Ok(())
    }

    /// Post filters and production names for a font about to be assembled.
    ///
    /// Post filters see the glyphs after outline conversion and feature
    /// writing, but they still run on glyphs: nothing here touches compiled
    /// tables, so they come before [`FontAssembler`] rather than after it.
    fn finish_static(
        &self,
        font: &mut Font,
        chains: &Chains,
        flavor: Flavor,
        entity: &str,
    ) -> Result<(), Error> {
        let filters = chains.filters(flavor)?;
        filters
            .apply(font, FilterPosition::Post, None)
            .map_err(|e| Error::from(e).at(Stage::Filter, entity))?;
        if self.request.production_names.unwrap_or(true) {
            let renamed = self
                .timer
                .time(Stage::ProductionNames, entity, || {
                    rename_to_production_names(font)
                });
            if renamed > 0 {
                self.record(
                    Stage::ProductionNames,
                    entity,
                    Severity::Debug,
                    format!("renamed {renamed} glyphs"),
                );
            }
        }
        Ok(())
    }

    fn assemble_and_write(
        &self,
        font: &Font,
        output: OutputFormat,
        kind: OutputKind,
        entity: &str,
    ) -> Result<PathBuf, Error> {
        let assembler = FontAssembler::new(outline_flavor(output));
        let bytes = self
            .timer
            .time(Stage::Assemble, entity, || assembler.assemble_static(font))
            .map_err(|e| Error::from(e).at(Stage::Assemble, entity))?;
        let file = self.write(kind, &font_stem(&font.info), &bytes, entity)?;
        self.autohint(&file, output, entity)?;
        Ok(file)
    }

    fn write(
        &self,
        kind: OutputKind,
        stem: &str,
        bytes: &[u8],
        entity: &str,
    ) -> Result<PathBuf, Error> {
        let file = self
            .request
            .layout
            .prepare_file(kind, stem)
            .and_then(|file| {
                self.timer
                    .time(Stage::Write, entity, || write_file(&file, bytes))?;
                Ok(file)
            })
            .map_err(|e| e.at(Stage::Write, entity))?;
        self.record(
            Stage::Write,
            entity,
            Severity::Info,
            format!("wrote {}", file.display()),
        );
        Ok(file)
    }

    fn autohint(&self, file: &Path, output: OutputFormat, entity: &str) -> Result<(), Error> {
        let Some(args) = &self.request.autohint else {
            return Ok(());
        };
        if outline_flavor(output) != OutlineFlavor::TrueType {
            return Ok(());
        }
        let hinter = Autohinter::new(Some(args.as_str()));
        self.timer
            .time(Stage::Autohint, entity, || hinter.autohint(file))
            .map_err(|e| Error::from(e).at(Stage::Autohint, entity))
    }

    /// One static binary per master per flavor; any failure is fatal
    fn build_static_masters(
        &self,
        model: &DesignSpaceModel,
        chains: &Chains,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut written = Vec::new();
        for source in model.masters() {
            for output in self.static_outputs() {
                let (flavor, kind) = match output {
                    OutputFormat::Otf => (Flavor::Otf, OutputKind::MasterOtf),
                    _ => (Flavor::Ttf, OutputKind::MasterTtf),
                };
                let entity = format!("master {}", source.name);
                let mut font = source.font.as_ref().clone();
                self.prepare_static(&mut font, chains, flavor, &entity)?;
                self.finish_static(&mut font, chains, flavor, &entity)?;
                written.push(self.assemble_and_write(&font, output, kind, &entity)?);
            }
        }
        Ok(written)
    }

    fn check_compatibility(&self, model: &DesignSpaceModel, output: OutputFormat) -> Result<(), Error> {
        let entity = format!("{} {output:?}", self.request.input.stem());
        if !self.request.checks_compatibility(output) {
            debug!("Skip compatibility check for {entity}");
            return Ok(());
        }
        self.timer
            .time(Stage::CompatibilityCheck, &entity, || {
                CompatibilityChecker::new(model).ensure_compatible()
            })
            .map_err(|e| {
                self.record(
                    Stage::CompatibilityCheck,
                    &entity,
                    Severity::Error,
                    e.to_string(),
                );
                Error::from(e).at(Stage::CompatibilityCheck, &entity)
            })
    }

    /// Convert masters to quadratic together so they stay compatible
    fn convert_masters(&self, fonts: &mut [Font], output: OutputFormat, entity: &str) -> Result<(), Error> {
        if outline_flavor(output) != OutlineFlavor::TrueType {
            return Ok(());
        }
        let converted = self
            .timer
            .time(Stage::Convert, entity, || {
                convert_compatible(
                    fonts,
                    self.request.conversion_error,
                    self.request.reverse_direction,
                )
            })
            .map_err(|e| Error::from(e).at(Stage::Convert, entity))?;
        debug!("Converted {converted} glyphs of {entity} to quadratic");
        Ok(())
    }

    /// Static masters with compatible quadratic outlines, one file per master
    fn build_interpolatable_masters(
        &self,
        models: &[DesignSpaceModel],
        chains: &[Chains],
        output: OutputFormat,
    ) -> Result<Vec<PathBuf>, Error> {
        if let [model] = models {
            self.check_compatibility(model, output)?;
        } else {
            debug!("Separate UFOs have no designspace to check compatibility against");
        }
        let kind = match outline_flavor(output) {
            OutlineFlavor::TrueType => OutputKind::MasterTtfInterpolatable,
            _ => OutputKind::MasterOtfInterpolatable,
        };

        let mut fonts = Vec::new();
        let mut entities = Vec::new();
        let mut font_chains = Vec::new();
        for (model, chains) in models.iter().zip(chains.iter()) {
            for source in model.masters() {
                let entity = format!("master {}", source.name);
                let mut font = source.font.as_ref().clone();
                self.prepare_static(&mut font, chains, Flavor::Interpolatable, &entity)?;
                fonts.push(font);
                entities.push(entity);
                font_chains.push(chains);
            }
        }
        self.convert_masters(&mut fonts, output, &self.request.input.stem())?;

        let mut written = Vec::new();
        for ((mut font, entity), chains) in fonts.into_iter().zip(entities).zip(font_chains) {
            self.finish_static(&mut font, chains, Flavor::Interpolatable, &entity)?;
            written.push(self.assemble_and_write(&font, output, kind, &entity)?);
        }
        Ok(written)
    }

    fn build_variable(
        &self,
        model: &DesignSpaceModel,
        chains: &Chains,
        output: OutputFormat,
    ) -> Result<PathBuf, Error> {
        let stem = format!("{}-VF", self.request.input.stem());
        // masters must be compatible before anything is assembled
        self.check_compatibility(model, output)?;

        let filters = chains.filters(Flavor::Interpolatable)?;
        let mut fonts =
            source_fonts(model).map_err(|e| Error::from(e).at(Stage::Masters, &stem))?;
        let skip = model.skip_export_glyphs();
        let subset_fonts = self
            .request
            .subset
            .unwrap_or_else(|| fonts.iter().any(has_non_export_glyphs) || !skip.is_empty());
        let default_idx = model.default_source_index();
        for (idx, (font, source)) in fonts.iter_mut().zip(model.sources()).enumerate() {
            let entity = format!("source {}", source.name);
            filters
                .apply(font, FilterPosition::Pre, None)
                .map_err(|e| Error::from(e).at(Stage::Filter, &entity))?;
            // layout comes from the default master
            if idx == default_idx {
                chains
                    .writers
                    .write(font)
                    .map_err(|e| Error::from(e).at(Stage::Features, &entity))?;
            }
            if subset_fonts {
                // every master loses the same glyphs
                font.set_skip_export_glyphs(&skip);
                subset(font).map_err(|e| Error::from(e).at(Stage::Subset, &entity))?;
            }
        }
        self.convert_masters(&mut fonts, output, &stem)?;
        for (font, source) in fonts.iter_mut().zip(model.sources()) {
            filters
                .apply(font, FilterPosition::Post, None)
                .map_err(|e| Error::from(e).at(Stage::Filter, format!("source {}", source.name)))?;
        }

        let assembler = FontAssembler::new(outline_flavor(output));
        let bytes = self
            .timer
            .time(Stage::Assemble, &stem, || {
                assembler.assemble_variable(model, &fonts)
            })
            .map_err(|e| Error::from(e).at(Stage::Assemble, &stem))?;
        let kind = match outline_flavor(output) {
            OutlineFlavor::TrueType => OutputKind::VariableTtf,
            _ => OutputKind::VariableOtf,
        };
        self.write(kind, &stem, &bytes, &stem)
    }

    /// The instances to build: requested designspace instances, after the
    /// masters if they are to be built as instances.
    fn instances(&self, model: &DesignSpaceModel) -> Vec<Instance> {
        let mut instances = Vec::new();
        if self.request.masters_as_instances {
            instances.extend(model.masters().map(Instance::for_source));
        }
        if let Some(selection) = &self.request.instances {
            instances.extend(selection.select(model, self.request.family_name.as_deref()));
        }
        instances
    }

    fn build_instance(
        &self,
        model: &DesignSpaceModel,
        generator: &dyn InstanceGenerator,
        chains: &Chains,
        instance: &Instance,
    ) -> Result<Vec<PathBuf>, Error> {
        let entity = format!("instance {}", instance.display_name());
        let font = self
            .timer
            .time(Stage::Interpolate, &entity, || {
                generator.generate(model, instance)
            })
            .map_err(|e| Error::from(e).at(Stage::Interpolate, &entity))?;

        let mut written = Vec::new();
        if let Err(e) = self.write_instance(&font, chains, &entity, &mut written) {
            // an instance that fails leaves nothing behind
            discard(&written, &entity);
            return Err(e);
        }
        Ok(written)
    }

    /// Every requested output for one interpolated instance, in order
    fn write_instance(
        &self,
        font: &Font,
        chains: &Chains,
        entity: &str,
        written: &mut Vec<PathBuf>,
    ) -> Result<(), Error> {
        if self.request.wants(OutputFormat::Ufo) {
            let file = self
                .request
                .layout
                .prepare_file(OutputKind::InstanceUfo, &font_stem(&font.info))
                .and_then(|file| {
                    save_ufo(font, &file)?;
                    Ok(file)
                })
                .map_err(|e| e.at(Stage::Write, entity))?;
            written.push(file);
        }
        for output in self.static_outputs() {
            let (flavor, kind) = match output {
                OutputFormat::Otf => (Flavor::Otf, OutputKind::InstanceOtf),
                _ => (Flavor::Ttf, OutputKind::InstanceTtf),
            };
            let mut font = font.clone();
            self.prepare_static(&mut font, chains, flavor, entity)?;
            self.finish_static(&mut font, chains, flavor, entity)?;
            written.push(self.assemble_and_write(&font, output, kind, entity)?);
        }
        Ok(())
    }

    /// Build each instance independently; failures are skipped unless failing fast
    fn build_instances(
        &self,
        model: &DesignSpaceModel,
        chains: &Chains,
        report: &mut BuildReport,
    ) -> Result<(), Error> {
        let instances = self.instances(model);
        if instances.is_empty() {
            warn!("No instances to build");
            return Ok(());
        }
        if !self.request.wants(OutputFormat::Ufo) && self.static_outputs().is_empty() {
            warn!("Instances requested without an output format that can hold them");
            return Ok(());
        }
        let generator = self
            .request
            .engine
            .generator(self.request.instance_options);
        info!(
            "Building {} instances with the {} engine",
            instances.len(),
            generator.name()
        );

        // coarse cancellation: checked before each instance starts
        let abort = AtomicBool::new(false);
        let build = |instance: &Instance| -> Option<Result<Vec<PathBuf>, Error>> {
            if abort.load(Ordering::Relaxed) {
                return None;
            }
            let result = self.build_instance(model, generator.as_ref(), chains, instance);
            if result.is_err() && self.request.fail_fast {
                abort.store(true, Ordering::Relaxed);
            }
            Some(result)
        };
        let results: Vec<Option<Result<Vec<PathBuf>, Error>>> = if self.request.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.request.jobs)
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            pool.install(|| instances.par_iter().map(build).collect())
        } else {
            instances.iter().map(build).collect()
        };

        report.instances += instances.len();
        for (instance, result) in instances.iter().zip(results) {
            let Some(result) = result else {
                continue;
            };
            match result {
                Ok(files) => report.written.extend(files),
                Err(e) => {
                    let name = instance.display_name();
                    let stage = match &e {
                        Error::Stage { stage, .. } => *stage,
                        _ => Stage::Interpolate,
                    };
                    if self.request.fail_fast {
                        return Err(e);
                    }
                    self.record(
                        stage,
                        &format!("instance {name}"),
                        Severity::Error,
                        format!("skipped: {e}"),
                    );
                    report.failures.push((name, e));
                }
            }
        }
        if self.request.instances.is_some() && !report.is_success() {
            warn!(
                "{} of {} instances failed",
                report.failures.len(),
                report.instances
            );
        }
        Ok(())
    }
}

/// Remove what a failed instance already wrote
fn discard(files: &[PathBuf], entity: &str) {
    for file in files {
        let removed = if file.is_dir() {
            fs::remove_dir_all(file)
        } else {
            fs::remove_file(file)
        };
        match removed {
            Ok(()) => debug!("Removed {} of failed {entity}", file.display()),
            Err(e) => warn!("Unable to remove {} of failed {entity}: {e}", file.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BuildState::Start, BuildState::Loaded, true)]
    #[case(BuildState::Loaded, BuildState::MastersPrepared, true)]
    #[case(BuildState::Loaded, BuildState::TtfBuilt, false)]
    #[case(BuildState::MastersPrepared, BuildState::VariableBuilt, true)]
    #[case(BuildState::TtfBuilt, BuildState::VariableBuilt, true)]
    #[case(BuildState::MastersPrepared, BuildState::Written, true)]
    #[case(BuildState::Written, BuildState::Done, true)]
    #[case(BuildState::TtfBuilt, BuildState::Done, false)]
    #[case(BuildState::Loaded, BuildState::Failed, true)]
    #[case(BuildState::Done, BuildState::Failed, false)]
    #[case(BuildState::Failed, BuildState::Loaded, false)]
    fn transitions(#[case] from: BuildState, #[case] to: BuildState, #[case] allowed: bool) {
        assert_eq!(allowed, from.can_advance_to(to), "{from:?} => {to:?}");
    }

    #[test]
    fn outline_flavors() {
        assert_eq!(OutlineFlavor::TrueType, outline_flavor(OutputFormat::Ttf));
        assert_eq!(
            OutlineFlavor::TrueType,
            outline_flavor(OutputFormat::TtfInterpolatable)
        );
        assert_eq!(OutlineFlavor::Cff, outline_flavor(OutputFormat::Otf));
        assert_eq!(OutlineFlavor::Cff2, outline_flavor(OutputFormat::VariableCff2));
    }
}

//! Where outputs are written.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use millir::font::FontInfo;

use crate::{Args, Error};

/// The kinds of file a build writes, each with its own default directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputKind {
    MasterUfo,
    InstanceUfo,
    MasterTtf,
    MasterTtfInterpolatable,
    MasterOtf,
    MasterOtfInterpolatable,
    InstanceTtf,
    InstanceOtf,
    VariableTtf,
    VariableOtf,
}

impl OutputKind {
    fn default_dir(self) -> &'static str {
        match self {
            OutputKind::MasterUfo => "master_ufo",
            OutputKind::InstanceUfo => "instance_ufo",
            OutputKind::MasterTtf => "master_ttf",
            OutputKind::MasterTtfInterpolatable => "master_ttf_interpolatable",
            OutputKind::MasterOtf => "master_otf",
            OutputKind::MasterOtfInterpolatable => "master_otf_interpolatable",
            OutputKind::InstanceTtf => "instance_ttf",
            OutputKind::InstanceOtf => "instance_otf",
            OutputKind::VariableTtf => "variable_ttf",
            OutputKind::VariableOtf => "variable_otf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::MasterUfo | OutputKind::InstanceUfo => "ufo",
            OutputKind::MasterTtf
            | OutputKind::MasterTtfInterpolatable
            | OutputKind::InstanceTtf
            | OutputKind::VariableTtf => "ttf",
            OutputKind::MasterOtf
            | OutputKind::MasterOtfInterpolatable
            | OutputKind::InstanceOtf
            | OutputKind::VariableOtf => "otf",
        }
    }

    fn is_ufo(self) -> bool {
        matches!(self, OutputKind::MasterUfo | OutputKind::InstanceUfo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    build_dir: PathBuf,
    output_dir: Option<PathBuf>,
    master_dir: Option<PathBuf>,
    instance_dir: Option<PathBuf>,
}

impl OutputLayout {
    pub fn new(args: &Args) -> OutputLayout {
        OutputLayout {
            build_dir: args.build_dir.clone(),
            output_dir: args.output_dir.clone(),
            master_dir: args.master_dir.clone(),
            instance_dir: args.instance_dir.clone(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// The directory for a kind of output.
    ///
    /// Relative directories are relative to the build directory.
    pub fn dir(&self, kind: OutputKind) -> PathBuf {
        let explicit = match kind {
            OutputKind::MasterUfo => self.master_dir.as_ref(),
            OutputKind::InstanceUfo => self.instance_dir.as_ref(),
            _ => None,
        };
        match explicit.or(self.output_dir.as_ref()) {
            Some(dir) => self.build_dir.join(dir),
            None => self.build_dir.join(kind.default_dir()),
        }
    }

    pub fn file(&self, kind: OutputKind, stem: &str) -> PathBuf {
        self.dir(kind).join(format!("{stem}.{}", kind.extension()))
    }

    /// The file for a font, created along with its directory if need be
    pub fn prepare_file(&self, kind: OutputKind, stem: &str) -> Result<PathBuf, Error> {
        let dir = require_dir(&self.dir(kind))?;
        let file = dir.join(format!("{stem}.{}", kind.extension()));
        // UFOs are directories, replace rather than merge
        if kind.is_ufo() && file.is_dir() {
            fs::remove_dir_all(&file).map_err(|source| Error::FileIo {
                path: file.clone(),
                source,
            })?;
        }
        Ok(file)
    }
}

/// `Family-Style` with spaces removed
pub fn font_stem(info: &FontInfo) -> String {
    let family = info.family_name().unwrap_or("New Font");
    let style = info.style_name().unwrap_or("Regular");
    format!("{family}-{style}")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

pub fn require_dir(dir: &Path) -> Result<PathBuf, Error> {
    if dir.exists() && !dir.is_dir() {
        return Err(Error::ExpectedDirectory(dir.to_path_buf()));
    }
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| Error::FileIo {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    debug!("require_dir {:?}", dir);
    Ok(dir.to_path_buf())
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    fs::write(path, bytes).map_err(|source| Error::FileIo {
        path: path.to_path_buf(),
        source,
    })
}

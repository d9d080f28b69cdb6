use std::{io, path::PathBuf};

use norad::error::{DesignSpaceLoadError, DesignSpaceSaveError, FontLoadError, FontWriteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to load designspace '{path}': {source}")]
    Designspace {
        path: PathBuf,
        #[source]
        source: DesignSpaceLoadError,
    },
    #[error("Unable to save designspace '{path}': {source}")]
    DesignspaceSave {
        path: PathBuf,
        #[source]
        source: DesignSpaceSaveError,
    },
    #[error("Unable to load UFO '{path}': {source}")]
    Ufo {
        path: PathBuf,
        #[source]
        source: Box<FontLoadError>,
    },
    #[error("Unable to write UFO '{path}': {source}")]
    UfoSave {
        path: PathBuf,
        #[source]
        source: Box<FontWriteError>,
    },
    #[error("Bad xml in '{path}': {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
    #[error("Bad plist '{path}': {source}")]
    Plist {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },
    #[error("'{path}' should hold a dictionary")]
    NotADictionary { path: PathBuf },
    #[error("'{0}' is not a valid UFO name")]
    InvalidName(String),
    #[error("Axis '{axis}': {reason}")]
    InvalidAxis { axis: String, reason: String },
    #[error(transparent)]
    Ir(#[from] millir::Error),
}

impl From<millcore::Error> for Error {
    fn from(value: millcore::Error) -> Self {
        Error::Ir(value.into())
    }
}

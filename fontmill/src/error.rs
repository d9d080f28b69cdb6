use std::{io, path::PathBuf};

use thiserror::Error;

use crate::diagnostics::Stage;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bad arguments: {0}")]
    Args(String),
    #[error("Unsupported input '{0}', only UFO and designspace sources can be built")]
    UnsupportedInput(PathBuf),
    #[error("{0} needs compiled layout tables, which fontmill doesn't build")]
    UnsupportedOption(&'static str),
    #[error("'{0}' exists but is not a directory")]
    ExpectedDirectory(PathBuf),
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Ir(#[from] millir::Error),
    #[error(transparent)]
    Source(#[from] ufo2millir::Error),
    #[error(transparent)]
    Backend(#[from] millbe::Error),
    #[error("{stage} failed for {entity}: {source}")]
    Stage {
        stage: Stage,
        entity: String,
        #[source]
        source: Box<Error>,
    },
    #[error("{failed} of {requested} outputs failed")]
    OutputsFailed { failed: usize, requested: usize },
    #[error("Unable to start worker threads: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Attach the stage and entity a failure happened in
    pub(crate) fn at(self, stage: Stage, entity: impl Into<String>) -> Error {
        // the innermost stage is the most precise
        if matches!(self, Error::Stage { .. }) {
            return self;
        }
        Error::Stage {
            stage,
            entity: entity.into(),
            source: Box::new(self),
        }
    }

    /// The error beneath any stage context
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

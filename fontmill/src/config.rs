//! The arguments of the previous build, persisted in the build directory

use std::{fs, path::PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{Args, Error};

/// The settings of a single build run.
///
/// Saved as `fontmill.yml` so the next run can tell whether it is being
/// asked for the same thing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub args: Args,
    // The version that wrote the config, so a new fontmill doesn't look unchanged
    version: String,
}

impl Config {
    pub fn new(args: Args) -> Config {
        Config {
            args,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Returns the path to the config file for this build
    fn file(&self) -> PathBuf {
        self.args.build_dir.join("fontmill.yml")
    }

    /// Record this run's config if it differs from the last one.
    ///
    /// Returns true if it changed.
    pub fn init(&self) -> Result<bool, Error> {
        let changed = self.has_changed();
        if changed {
            info!("Config changed, writing a new one");
            let config_file = self.file();
            fs::write(&config_file, serde_yaml::to_string(self)?).map_err(|source| {
                Error::FileIo {
                    path: config_file,
                    source,
                }
            })?;
        }
        Ok(changed)
    }

    /// Compare this config to the one saved by the previous run.
    pub fn has_changed(&self) -> bool {
        let config_file = self.file();
        if !config_file.is_file() {
            return true;
        }
        let yml = match fs::read_to_string(&config_file) {
            Ok(yml) => yml,
            Err(err) => {
                warn!("Unable to read prior config {config_file:?}: {err}");
                return true;
            }
        };
        match serde_yaml::from_str::<Config>(&yml) {
            Ok(prior_config) => self != &prior_config,
            Err(err) => {
                warn!("Unable to parse prior config {err:#?}");
                true
            }
        }
    }
}

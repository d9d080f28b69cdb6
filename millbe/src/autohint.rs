//! Hinting TrueType binaries with an external ttfautohint.

use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, warn};

use crate::error::Error;

const TTFAUTOHINT: &str = "ttfautohint";

/// Runs `ttfautohint [args] in out` and replaces the input with the result
#[derive(Debug, Clone)]
pub struct Autohinter {
    program: PathBuf,
    args: Vec<String>,
}

impl Autohinter {
    /// ttfautohint from PATH, with extra arguments given as a single string
    pub fn new(args: Option<&str>) -> Autohinter {
        Autohinter::with_program(TTFAUTOHINT, args)
    }

    pub fn with_program(program: impl Into<PathBuf>, args: Option<&str>) -> Autohinter {
        Autohinter {
            program: program.into(),
            args: args
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn autohint(&self, font_file: &Path) -> Result<(), Error> {
        let hinted = font_file.with_extension("hinted.ttf");
        debug!("{} {:?} {}", self.program.display(), self.args, font_file.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(font_file)
            .arg(&hinted)
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => Error::AutohintNotFound,
                _ => Error::FileIo {
                    path: self.program.clone(),
                    source,
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                warn!("{}: {}", self.program.display(), stderr.trim());
            }
            // don't leave partial output lying around
            let _ = std::fs::remove_file(&hinted);
            return Err(Error::TTFA {
                path: font_file.to_path_buf(),
                exit_code: output.status.code(),
            });
        }

        std::fs::rename(&hinted, font_file).map_err(|source| Error::FileIo {
            path: font_file.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_args() {
        let hinter = Autohinter::new(Some("--no-info  --stem-width-mode=nnn"));
        assert_eq!(vec!["--no-info", "--stem-width-mode=nnn"], hinter.args);
        assert!(Autohinter::new(None).args.is_empty());
    }

    #[test]
    fn missing_program() {
        let temp_dir = tempfile::tempdir().unwrap();
        let font_file = temp_dir.path().join("Test-Regular.ttf");
        std::fs::write(&font_file, b"not really a font").unwrap();
        let hinter = Autohinter::with_program(temp_dir.path().join("no-such-hinter"), None);
        assert!(matches!(
            hinter.autohint(&font_file),
            Err(Error::AutohintNotFound)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let font_file = temp_dir.path().join("Test-Regular.ttf");
        std::fs::write(&font_file, b"not really a font").unwrap();
        let hinter = Autohinter::with_program("false", None);
        let Err(Error::TTFA { path, exit_code }) = hinter.autohint(&font_file) else {
            panic!("should fail");
        };
        assert_eq!(font_file, path);
        assert_eq!(Some(1), exit_code);
        // the input is untouched
        assert_eq!(b"not really a font".to_vec(), std::fs::read(&font_file).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn output_replaces_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let font_file = temp_dir.path().join("Test-Regular.ttf");
        std::fs::write(&font_file, b"font bytes").unwrap();
        // cp in out has the same shape as ttfautohint in out
        let hinter = Autohinter::with_program("cp", None);
        hinter.autohint(&font_file).unwrap();
        assert_eq!(b"font bytes".to_vec(), std::fs::read(&font_file).unwrap());
        assert!(!font_file.with_extension("hinted.ttf").exists());
    }
}

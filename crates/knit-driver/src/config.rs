//! Options of a driver run.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{fs, io};
use thiserror::Error;

use knit_link::CompilerOptions;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Cannot read options file '{path}'")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid options file '{path}'")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What to load and how to link it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DriverOptions {
    /// Root of the source tree.
    pub source_dir: Utf8PathBuf,
    /// Modules to load, the root module when empty.
    pub modules: Vec<String>,
    /// Also load the test modules below the selected modules.
    pub test: bool,
    /// Load every module of the source tree.
    pub all: bool,
    #[serde(flatten)]
    pub compiler: CompilerOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            source_dir: Utf8PathBuf::from("."),
            modules: Vec::new(),
            test: false,
            all: false,
            compiler: CompilerOptions::default(),
        }
    }
}

impl DriverOptions {
    /// Reads options from a JSON file, missing fields take their defaults.
    pub fn load(path: &Utf8Path) -> Result<Self, OptionsError> {
        let text = fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| OptionsError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

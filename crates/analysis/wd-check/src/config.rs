//! Checker configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wd_borrow::ReborrowNesting;

/// What to do after the first violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    /// Stop at the first violation; later operations are reported unchecked.
    FailFast,
    /// Keep going and report every violation.
    #[default]
    CollectAll,
}

/// Settings for one analysis run.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```toml
/// mode = "fail-fast"
/// reborrow-nesting = "allow-equal"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CheckerConfig {
    /// Fail-fast or collect-all
    pub mode: CheckMode,
    /// How strictly reborrows must nest inside their parent loan
    pub reborrow_nesting: ReborrowNesting,
}

impl CheckerConfig {
    /// Default settings with the given mode.
    #[must_use]
    pub fn new(mode: CheckMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Replaces the reborrow nesting rule.
    #[must_use]
    pub fn with_reborrow_nesting(mut self, nesting: ReborrowNesting) -> Self {
        self.reborrow_nesting = nesting;
        self
    }

    /// Parses a TOML config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid TOML or has unknown
    /// keys or values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Errors loading a [`CheckerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read checker config {}", .path.display())]
    Io {
        /// The file that was read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The config text is invalid.
    #[error("invalid checker config: {0}")]
    Parse(#[from] toml::de::Error),
}

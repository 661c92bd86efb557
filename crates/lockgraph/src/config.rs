//! Settings (`lockgraph.toml`).
//!
//! ```toml
//! lock-file = "project.lock.json"
//! output-dir = "bin"
//! shared-sources-dir = "shared"
//! source-language = "csharp"
//!
//! [retry]
//! retries = 3
//! delay-ms = 1000
//! ```
//!
//! Every key is optional.

use crate::fs::RetryPolicy;
use crate::model::LOCK_FILE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default settings file name.
pub const CONFIG_FILE: &str = "lockgraph.toml";

/// Errors that can occur when loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Resolver and I/O settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    /// Lock document file name inside a project directory.
    pub lock_file: PathBuf,

    /// Build output directory of a project, relative to its directory.
    pub output_dir: PathBuf,

    /// Package directory whose files are compiled into the consumer as sources.
    pub shared_sources_dir: PathBuf,

    /// `language` metadata given to shared source assets.
    pub source_language: String,

    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from(LOCK_FILE),
            output_dir: PathBuf::from("bin"),
            shared_sources_dir: PathBuf::from("shared"),
            source_language: String::from("csharp"),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse settings from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or has unknown keys.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `lockgraph.toml` from `dir` if present, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Bounded retry for reading documents another process may be rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct RetrySettings {
    /// Attempts after the first failure.
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            retries: policy.retries,
            delay_ms: u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.delay_ms))
    }
}

// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner configuration.
//!
//! The config is read from an embedded default TOML document, with an optional
//! host-provided file layered on top.

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Trait for handling configuration warnings.
///
/// This allows for different warning handling strategies, such as logging
/// warnings (the default behavior) or collecting them for testing purposes.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: Option<&Utf8Path>, unknown: &BTreeSet<String>);
}

/// Default implementation of [`ConfigWarnings`] that logs warnings using the
/// `tracing` crate.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: Option<&Utf8Path>, unknown: &BTreeSet<String>) {
        let keys = unknown
            .iter()
            .map(|key| format!("  - {key}"))
            .collect::<Vec<_>>()
            .join("\n");
        match config_file {
            Some(file) => warn!("ignoring unknown configuration keys in config file {file}:\n{keys}"),
            None => warn!("ignoring unknown configuration keys:\n{keys}"),
        }
    }
}

/// Settings for [`TestMethodRunner`](crate::runner::TestMethodRunner).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunnerConfig {
    capture_trace_output: bool,
    catch_panics: bool,
    map_inconclusive_to_failed: bool,
    missing_result_message: String,
}

impl Default for RunnerConfig {
    /// Returns the settings in [`RunnerConfig::DEFAULT_CONFIG`].
    fn default() -> Self {
        Self {
            capture_trace_output: true,
            catch_panics: true,
            map_inconclusive_to_failed: false,
            missing_result_message: "no test result was produced".to_owned(),
        }
    }
}

impl RunnerConfig {
    /// The default config, as a TOML document.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config, layering `config_file` over the defaults if it is
    /// provided. Unknown keys are logged.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(config_file, &mut DefaultConfigWarnings)
    }

    /// Reads the config, reporting unknown keys to `warnings`.
    pub fn from_sources_with_warnings(
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let mut builder = Self::make_default_config();
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::new(config_file.as_str(), FileFormat::Toml));
        }
        Self::build_and_deserialize(&builder, config_file, warnings)
    }

    /// Reads the config from a TOML string layered over the defaults.
    pub fn from_toml_str(
        contents: &str,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(contents, FileFormat::Toml));
        Self::build_and_deserialize(&builder, None, warnings)
    }

    /// Returns true if the trace stream is captured for units that request it.
    pub fn capture_trace_output(&self) -> bool {
        self.capture_trace_output
    }

    /// Returns true if panics in collaborators are turned into failing results.
    pub fn catch_panics(&self) -> bool {
        self.catch_panics
    }

    /// Returns true if inconclusive results are reported as failures.
    pub fn map_inconclusive_to_failed(&self) -> bool {
        self.map_inconclusive_to_failed
    }

    /// Returns the message attached to the result synthesized when no results are produced.
    pub fn missing_result_message(&self) -> &str {
        &self.missing_result_message
    }

    /// Sets whether the trace stream is captured.
    pub fn set_capture_trace_output(&mut self, capture_trace_output: bool) -> &mut Self {
        self.capture_trace_output = capture_trace_output;
        self
    }

    /// Sets whether panics in collaborators are caught.
    pub fn set_catch_panics(&mut self, catch_panics: bool) -> &mut Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Sets whether inconclusive results are reported as failures.
    pub fn set_map_inconclusive_to_failed(&mut self, map: bool) -> &mut Self {
        self.map_inconclusive_to_failed = map;
        self
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize(
        builder: &ConfigBuilder<DefaultState>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let to_error =
            |kind| ConfigParseError::new(config_file.map(Utf8Path::to_path_buf), kind);

        let config = builder
            .build_cloned()
            .map_err(|error| to_error(ConfigParseErrorKind::BuildError(Box::new(error))))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let deserialized: RunnerConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key.
                // Drop the key from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                to_error(ConfigParseErrorKind::DeserializeError(Box::new(
                    serde_path_to_error::Error::new(path, error),
                )))
            })?;

        if !ignored.is_empty() {
            warnings.unknown_config_keys(config_file, &ignored);
        }

        Ok(deserialized.runner.into_config())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    runner: RunnerSectionDeserialize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerSectionDeserialize {
    capture_trace_output: bool,
    catch_panics: bool,
    map_inconclusive_to_failed: bool,
    missing_result_message: String,
}

impl RunnerSectionDeserialize {
    fn into_config(self) -> RunnerConfig {
        RunnerConfig {
            capture_trace_output: self.capture_trace_output,
            catch_panics: self.catch_panics,
            map_inconclusive_to_failed: self.map_inconclusive_to_failed,
            missing_result_message: self.missing_result_message,
        }
    }
}

/// A [`ConfigWarnings`] that records unknown keys.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct TestConfigWarnings {
    pub(crate) unknown_keys: Vec<(Option<camino::Utf8PathBuf>, BTreeSet<String>)>,
}

#[cfg(test)]
impl ConfigWarnings for TestConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: Option<&Utf8Path>, unknown: &BTreeSet<String>) {
        self.unknown_keys
            .push((config_file.map(Utf8Path::to_path_buf), unknown.clone()));
    }
}

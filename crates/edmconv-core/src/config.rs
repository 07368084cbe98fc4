//! # Output Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! output = "events.redb"
//! run_number_offset = 100
//! event_number_offset = 0
//!
//! [event_parameters_int]
//! seed = "12345"
//!
//! [event_parameters_float]
//! beam_energy = "125.0"
//!
//! [event_parameters_string]
//! generator = "whizard"
//! ```

use crate::store::Parameters;
use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Converter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Output file. No output is written when unset.
    pub output: Option<PathBuf>,
    /// Added to every run number. Negative values count as 0.
    pub run_number_offset: i32,
    /// Added to every event number. Negative values count as 0.
    pub event_number_offset: i32,
    /// Run-level parameters. The output schema has no run header yet.
    pub run_header: BTreeMap<String, String>,
    pub event_parameters_int: BTreeMap<String, String>,
    pub event_parameters_float: BTreeMap<String, String>,
    pub event_parameters_string: BTreeMap<String, String>,
}

impl OutputConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        toml::from_str(text).map_err(|e| ConvertError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Run offset clamped at 0.
    #[must_use]
    pub fn run_offset(&self) -> i32 {
        self.run_number_offset.max(0)
    }

    /// Event offset clamped at 0.
    #[must_use]
    pub fn event_offset(&self) -> i32 {
        self.event_number_offset.max(0)
    }

    /// Write the configured event parameters into `target`.
    ///
    /// Values are trimmed and then parsed strictly. A value that does not
    /// parse is logged, reported and skipped; the others are still set.
    /// String values are copied verbatim.
    pub fn apply_event_parameters(&self, target: &mut Parameters) -> Vec<ConvertError> {
        let mut errors = Vec::new();

        for (name, text) in &self.event_parameters_int {
            match text.trim().parse::<i32>() {
                Ok(value) => target.set_int(name.as_str(), value),
                Err(_) => errors.push(parse_error(name, text, "int")),
            }
        }
        for (name, text) in &self.event_parameters_float {
            match text.trim().parse::<f32>() {
                Ok(value) => target.set_float(name.as_str(), value),
                Err(_) => errors.push(parse_error(name, text, "float")),
            }
        }
        for (name, text) in &self.event_parameters_string {
            target.set_string(name.as_str(), text.as_str());
        }

        errors
    }
}

fn parse_error(name: &str, value: &str, expected: &'static str) -> ConvertError {
    let e = ConvertError::Parse {
        name: name.to_string(),
        value: value.to_string(),
        expected,
    };
    tracing::error!("{e}");
    e
}

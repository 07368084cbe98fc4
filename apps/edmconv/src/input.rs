//! # Event Input
//!
//! Events are read from a JSON document grouping them by run:
//!
//! ```json
//! { "runs": [ { "run_id": 0, "events": [ { "event_id": 0, ... } ] } ] }
//! ```

use edmconv_core::{ConvertError, RunInfo, SimEvent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum input file size (1 GB).
const MAX_INPUT_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// One run worth of simulated events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InputRun {
    pub run_id: i32,
    pub events: Vec<SimEvent>,
}

impl InputRun {
    #[must_use]
    pub fn info(&self) -> RunInfo {
        RunInfo {
            run_id: self.run_id,
        }
    }
}

/// The whole input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InputFile {
    pub runs: Vec<InputRun>,
}

impl InputFile {
    /// Total number of events over all runs.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.runs.iter().map(|run| run.events.len()).sum()
    }

    /// Parse an input document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConvertError> {
        serde_json::from_str(text).map_err(|e| ConvertError::Serialization(e.to_string()))
    }

    /// Read and parse an input file.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let path = validate_file_path(path)?;
        let metadata = std::fs::metadata(&path)
            .map_err(|e| ConvertError::Io(format!("Cannot read file metadata: {}", e)))?;
        if metadata.len() > MAX_INPUT_FILE_SIZE {
            return Err(ConvertError::Io(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_INPUT_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConvertError::Io(format!("Read file: {}", e)))?;
        Self::from_json(&text)
    }
}

/// Canonicalize `path` and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, ConvertError> {
    let canonical = path.canonicalize().map_err(|e| {
        ConvertError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(ConvertError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

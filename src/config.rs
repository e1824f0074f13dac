use crate::core::composite::CompositeParams;
use crate::core::indices::DeriverParams;
use crate::io::export::ExportParams;
use crate::io::table::TableParams;
use crate::types::{BurnError, BurnResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full pipeline configuration. Every section falls back to its defaults
/// when absent from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub composite: CompositeParams,
    pub layers: DeriverParams,
    pub export: ExportParams,
    pub table: TableParams,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> BurnResult<Self> {
        serde_json::from_str(json).map_err(|e| BurnError::Config(format!("Invalid configuration: {}", e)))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> BurnResult<Self> {
        log::info!("Loading configuration from {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> BurnResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BurnError::Config(e.to_string()))
    }
}

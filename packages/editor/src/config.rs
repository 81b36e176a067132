use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::EditorResult;
use crate::orchestrator::OverlayMode;

pub const DEFAULT_CONFIG_NAME: &str = "eac-editor.config.json";

pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Number of snapshots kept by the history engine
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Which proposals are composed on top of the live document at read time
    #[serde(default)]
    pub overlay: OverlayMode,
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl EngineConfig {
    /// Load config from a directory, falling back to defaults when no file exists
    pub fn load(dir: impl AsRef<Path>) -> EditorResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from an inline JSON document
    pub fn from_json(content: &str) -> EditorResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// History bound, never below one snapshot
    pub fn history_bound(&self) -> usize {
        self.max_history.max(1)
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayMode) -> Self {
        self.overlay = overlay;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            overlay: OverlayMode::None,
        }
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::fs_utils::write_json_atomic;

/// Hub configuration stored in ~/.skills-hub/config.json
///
/// Only the keys this crate owns are typed; everything else (hub path, agent
/// list, project roots) belongs to other tools and is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    /// Maximum number of snapshots to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_retention: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HubConfig {
    /// Read config from file, returning default if file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Write config atomically: temp file in the same directory, then rename
    pub fn write(&self, path: &Path) -> Result<()> {
        let value = serde_json::to_value(self).context("Failed to serialize config")?;
        write_json_atomic(path, &value)
            .with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Retention value as a raw string for [`crate::snapshot::resolve_retention`]
    pub fn retention_hint(&self) -> Option<String> {
        self.snapshot_retention.map(|r| r.to_string())
    }
}

use serde_json::{Map, Value};
use std::path::PathBuf;

use super::{LiveAdapter, deep_merge, ensure_object, strip_profile};
use crate::app::AppType;
use crate::error::Result;
use crate::fs_utils::{read_json_or_empty, write_json_atomic};

/// Claude Code: the whole config is ~/.claude/settings.json
#[derive(Debug, Clone)]
pub struct ClaudeAdapter {
    settings_path: PathBuf,
}

impl ClaudeAdapter {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }
}

impl LiveAdapter for ClaudeAdapter {
    fn app_type(&self) -> AppType {
        AppType::Claude
    }

    fn read_live(&self) -> Result<Value> {
        read_json_or_empty(&self.settings_path)
    }

    fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
        let base = if live.is_object() {
            live.clone()
        } else {
            Value::Object(Map::new())
        };
        Ok(deep_merge(&base, &strip_profile(provider)))
    }

    fn validate(&self, config: &Value) -> Result<()> {
        ensure_object(config, "Claude provider config")?;
        Ok(())
    }

    fn write_live(&self, config: &Value) -> Result<()> {
        ensure_object(config, "Claude provider config")?;
        write_json_atomic(&self.settings_path, config)
    }
}

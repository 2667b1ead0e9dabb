use serde_json::{Value, json};
use std::path::PathBuf;

use super::env_file::{parse_env, stringify_env};
use super::{LiveAdapter, ensure_object, merge_section, strip_profile};
use crate::app::AppType;
use crate::error::{HubError, Result};
use crate::fs_utils::{atomic_write, read_json_or_empty, read_optional, write_json_atomic};

/// Gemini CLI: ~/.gemini/.env plus ~/.gemini/settings.json, each optional
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    env_path: PathBuf,
    settings_path: PathBuf,
}

impl GeminiAdapter {
    pub fn new(env_path: PathBuf, settings_path: PathBuf) -> Self {
        Self {
            env_path,
            settings_path,
        }
    }
}

impl LiveAdapter for GeminiAdapter {
    fn app_type(&self) -> AppType {
        AppType::Gemini
    }

    fn read_live(&self) -> Result<Value> {
        let env = read_optional(&self.env_path)?
            .map(|raw| parse_env(&raw))
            .unwrap_or_default();
        let settings = read_json_or_empty(&self.settings_path)?;
        Ok(json!({
            "env": Value::Object(env),
            "settings": settings,
        }))
    }

    fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
        let provider = strip_profile(provider);
        let mut merged = serde_json::Map::new();
        for key in ["env", "settings"] {
            if let Some(section) = merge_section(live, &provider, key) {
                merged.insert(key.to_string(), section);
            }
        }
        Ok(Value::Object(merged))
    }

    fn validate(&self, config: &Value) -> Result<()> {
        let map = ensure_object(config, "Gemini provider config")?;
        let has_env = map.get("env").is_some_and(Value::is_object);
        let has_settings = map.get("settings").is_some_and(Value::is_object);
        if !has_env && !has_settings {
            return Err(HubError::Validation(
                "Gemini provider config must include env and/or settings object".into(),
            ));
        }
        Ok(())
    }

    fn write_live(&self, config: &Value) -> Result<()> {
        let map = ensure_object(config, "Gemini provider config")?;

        if let Some(Value::Object(env)) = map.get("env") {
            atomic_write(&self.env_path, stringify_env(env).as_bytes())?;
        }
        if let Some(settings @ Value::Object(_)) = map.get("settings") {
            write_json_atomic(&self.settings_path, settings)?;
        }
        Ok(())
    }
}

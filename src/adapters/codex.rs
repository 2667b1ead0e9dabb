use serde_json::{Map, Number, Value, json};
use std::path::{Path, PathBuf};

use super::{LiveAdapter, deep_merge, ensure_object, strip_profile};
use crate::app::AppType;
use crate::error::{HubError, Result};
use crate::fs_utils::{atomic_write, read_json_or_empty, read_optional, write_json_atomic};

pub const AUTH_KEY: &str = "auth";
pub const SETTINGS_TOML_KEY: &str = "settingsToml";
/// Wraps a TOML datetime inside the JSON form of the settings, so a write
/// (or a restored backup) emits a datetime again instead of a string
pub const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Codex CLI: ~/.codex/auth.json plus ~/.codex/config.toml, each optional
///
/// The config value is `{auth?: object, settingsToml?: object}`; the TOML
/// document is carried as a JSON object and serialized back on write.
#[derive(Debug, Clone)]
pub struct CodexAdapter {
    auth_path: PathBuf,
    config_path: PathBuf,
}

/// Both halves of a Codex config after legacy shapes are folded in
#[derive(Debug, Default, Clone, PartialEq)]
struct CodexParts {
    auth: Option<Map<String, Value>>,
    settings: Option<Map<String, Value>>,
}

impl CodexAdapter {
    pub fn new(auth_path: PathBuf, config_path: PathBuf) -> Self {
        Self {
            auth_path,
            config_path,
        }
    }

    fn read_settings_toml(&self) -> Result<Map<String, Value>> {
        match read_optional(&self.config_path)? {
            Some(raw) => parse_toml_object(&raw, &self.config_path),
            None => Ok(Map::new()),
        }
    }
}

impl LiveAdapter for CodexAdapter {
    fn app_type(&self) -> AppType {
        AppType::Codex
    }

    fn read_live(&self) -> Result<Value> {
        let auth = read_json_or_empty(&self.auth_path)?;
        let settings = self.read_settings_toml()?;
        Ok(json!({
            AUTH_KEY: auth,
            SETTINGS_TOML_KEY: Value::Object(settings),
        }))
    }

    fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
        let live = normalize(live, &self.config_path)?;
        let next = normalize(&strip_profile(provider), &self.config_path)?;

        let mut merged = Map::new();
        if let Some(auth) = next.auth {
            let base = Value::Object(live.auth.unwrap_or_default());
            merged.insert(AUTH_KEY.into(), deep_merge(&base, &Value::Object(auth)));
        }
        if let Some(settings) = next.settings {
            let base = Value::Object(live.settings.unwrap_or_default());
            merged.insert(
                SETTINGS_TOML_KEY.into(),
                deep_merge(&base, &Value::Object(settings)),
            );
        }
        Ok(Value::Object(merged))
    }

    fn validate(&self, config: &Value) -> Result<()> {
        ensure_object(config, "Codex provider config")?;
        let parts = normalize(config, &self.config_path)?;
        if parts.auth.is_none() && parts.settings.is_none() {
            return Err(HubError::Validation(
                "Codex provider config must include auth and/or settingsToml".into(),
            ));
        }
        Ok(())
    }

    fn write_live(&self, config: &Value) -> Result<()> {
        ensure_object(config, "Codex provider config")?;
        let parts = normalize(config, &self.config_path)?;

        if let Some(auth) = parts.auth {
            write_json_atomic(&self.auth_path, &Value::Object(auth))?;
        }
        if let Some(settings) = parts.settings {
            let rendered = render_toml(&settings)?;
            atomic_write(&self.config_path, rendered.as_bytes())?;
        }
        Ok(())
    }
}

/// Fold the accepted Codex config shapes into auth/settings halves
///
/// `settingsToml` may be an object or a TOML string; older records used a
/// `config` TOML string or a `configToml` object instead.
fn normalize(config: &Value, origin: &Path) -> Result<CodexParts> {
    let Some(map) = config.as_object() else {
        return Ok(CodexParts::default());
    };

    let auth = map
        .get(AUTH_KEY)
        .and_then(Value::as_object)
        .map(normalize_auth);

    let settings = match (
        map.get(SETTINGS_TOML_KEY),
        map.get("config"),
        map.get("configToml"),
    ) {
        (Some(Value::Object(obj)), _, _) => Some(obj.clone()),
        (Some(Value::String(raw)), _, _) => Some(parse_toml_object(raw, origin)?),
        (_, Some(Value::String(raw)), _) => Some(parse_toml_object(raw, origin)?),
        (_, _, Some(Value::Object(obj))) => Some(obj.clone()),
        _ => None,
    };

    Ok(CodexParts { auth, settings })
}

fn normalize_auth(auth: &Map<String, Value>) -> Map<String, Value> {
    let mut auth = auth.clone();
    let has_key = matches!(auth.get("OPENAI_API_KEY"), Some(Value::String(_)));
    if !has_key {
        if let Some(Value::String(key)) = auth.get("api_key").cloned() {
            auth.insert("OPENAI_API_KEY".into(), Value::String(key));
        }
    }
    auth
}

fn parse_toml_object(raw: &str, origin: &Path) -> Result<Map<String, Value>> {
    let table: toml::Table = toml::from_str(raw).map_err(|source| HubError::Toml {
        path: origin.to_path_buf(),
        source,
    })?;
    Ok(table
        .into_iter()
        .map(|(k, v)| (k, toml_to_json(v)))
        .collect())
}

fn render_toml(settings: &Map<String, Value>) -> Result<String> {
    let table: toml::Table = settings
        .iter()
        .filter_map(|(k, v)| json_to_toml(v).map(|v| (k.clone(), v)))
        .collect();
    Ok(toml::to_string(&table)?)
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => json!({ TOML_DATETIME_KEY: dt.to_string() }),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// TOML has no null; null values (and nulls inside arrays) are dropped
fn json_to_toml(value: &Value) -> Option<toml::Value> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(toml::Value::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(toml::Value::Integer(i)),
            None => n.as_f64().map(toml::Value::Float),
        },
        Value::String(s) => Some(toml::Value::String(s.clone())),
        Value::Array(items) => Some(toml::Value::Array(
            items.iter().filter_map(json_to_toml).collect(),
        )),
        Value::Object(map) => match datetime_marker(map) {
            Some(dt) => Some(toml::Value::Datetime(dt)),
            None => Some(toml::Value::Table(
                map.iter()
                    .filter_map(|(k, v)| json_to_toml(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        },
    }
}

fn datetime_marker(map: &Map<String, Value>) -> Option<toml::value::Datetime> {
    if map.len() != 1 {
        return None;
    }
    map.get(TOML_DATETIME_KEY)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn adapter(temp: &TempDir) -> CodexAdapter {
        CodexAdapter::new(
            temp.path().join(".codex/auth.json"),
            temp.path().join(".codex/config.toml"),
        )
    }

    #[test]
    fn test_read_missing_files() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            adapter(&temp).read_live().unwrap(),
            json!({"auth": {}, "settingsToml": {}})
        );
    }

    #[test]
    fn test_read_live_parses_both_files() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        fs::create_dir_all(temp.path().join(".codex")).unwrap();
        fs::write(&codex.auth_path, r#"{"OPENAI_API_KEY": null, "auth_mode": "chatgpt"}"#).unwrap();
        fs::write(
            &codex.config_path,
            "model = \"old-model\"\n\n[model_providers.openai]\nbase_url = \"https://api.openai.com/v1\"\n",
        )
        .unwrap();

        let live = codex.read_live().unwrap();
        assert_eq!(live["auth"]["auth_mode"], "chatgpt");
        assert_eq!(live["settingsToml"]["model"], "old-model");
        assert_eq!(
            live["settingsToml"]["model_providers"]["openai"]["base_url"],
            "https://api.openai.com/v1"
        );
    }

    #[test]
    fn test_merge_only_touches_sections_the_provider_carries() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        let live = json!({
            "auth": {"OPENAI_API_KEY": "live-key"},
            "settingsToml": {"model": "gpt-5", "approval": "never"}
        });

        let merged = codex
            .merge(&live, &json!({"settingsToml": {"model": "gpt-5.2"}}))
            .unwrap();
        assert_eq!(
            merged,
            json!({"settingsToml": {"model": "gpt-5.2", "approval": "never"}})
        );
    }

    #[test]
    fn test_legacy_config_string_and_api_key_alias() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        let provider = json!({
            "auth": {"api_key": "sk-legacy"},
            "config": "model = \"gpt-5\"\n",
            "_profile": {"kind": "api"}
        });

        let merged = codex.merge(&json!({}), &provider).unwrap();
        assert_eq!(merged["auth"]["OPENAI_API_KEY"], "sk-legacy");
        assert_eq!(merged["settingsToml"]["model"], "gpt-5");
        assert!(merged.get("_profile").is_none());
    }

    #[test]
    fn test_validate_requires_a_section() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        let err = codex.validate(&json!({"other": 1})).unwrap_err();
        assert!(err.to_string().contains("auth and/or settingsToml"));
        assert!(codex.validate(&json!({"auth": {}})).is_ok());
    }

    #[test]
    fn test_write_live_writes_present_halves_only() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);

        codex
            .write_live(&json!({
                "settingsToml": {
                    "model": "gpt-5",
                    "dropped": null,
                    "model_providers": {"openai": {"base_url": "https://api.openai.com/v1"}}
                }
            }))
            .unwrap();

        assert!(!codex.auth_path.exists());
        let raw = fs::read_to_string(&codex.config_path).unwrap();
        let parsed: toml::Table = toml::from_str(&raw).unwrap();
        assert_eq!(parsed["model"].as_str(), Some("gpt-5"));
        assert!(parsed.get("dropped").is_none());
        assert_eq!(
            parsed["model_providers"]["openai"]["base_url"].as_str(),
            Some("https://api.openai.com/v1")
        );
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        fs::create_dir_all(temp.path().join(".codex")).unwrap();
        fs::write(&codex.config_path, "model = ").unwrap();

        let err = codex.read_live().unwrap_err();
        assert!(matches!(err, HubError::Toml { .. }));
    }

    #[test]
    fn test_datetimes_survive_read_and_write() {
        let temp = TempDir::new().unwrap();
        let codex = adapter(&temp);
        fs::create_dir_all(temp.path().join(".codex")).unwrap();
        fs::write(
            &codex.config_path,
            "trusted_since = 1979-05-27T07:32:00Z\n\n[history]\nsince = 2024-01-02\n",
        )
        .unwrap();

        let live = codex.read_live().unwrap();
        assert_eq!(
            live["settingsToml"]["trusted_since"],
            json!({TOML_DATETIME_KEY: "1979-05-27T07:32:00Z"})
        );

        let merged = codex.merge(&live, &json!({"settingsToml": {"model": "gpt-5"}})).unwrap();
        codex.write_live(&merged).unwrap();

        let parsed: toml::Table = toml::from_str(&fs::read_to_string(&codex.config_path).unwrap()).unwrap();
        assert_eq!(
            parsed["trusted_since"].as_datetime().map(|dt| dt.to_string()),
            Some("1979-05-27T07:32:00Z".to_string())
        );
        assert_eq!(
            parsed["history"]["since"].as_datetime().map(|dt| dt.to_string()),
            Some("2024-01-02".to_string())
        );
        assert_eq!(parsed["model"].as_str(), Some("gpt-5"));
    }

    #[test]
    fn test_marker_lookalikes_stay_tables() {
        let rendered = render_toml(
            json!({"t": {TOML_DATETIME_KEY: "not a date"}, "u": {TOML_DATETIME_KEY: "2024-01-02", "x": 1}})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        let parsed: toml::Table = toml::from_str(&rendered).unwrap();
        assert!(parsed["t"].is_table());
        assert!(parsed["u"].is_table());
    }
}

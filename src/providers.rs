//! Provider records and their management.
//!
//! This module handles the "data model" of providers:
//! - Adding, updating and removing provider records
//! - The `_profile` metadata block carried inside a provider config
//! - Universal providers, which fan one endpoint/key out to every app
//!
//! Switching between providers lives in `crate::switch`; this module only
//! touches the store, never the live files.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::adapters::PROFILE_KEY;
use crate::app::AppType;
use crate::error::{HubError, Result};
use crate::store::Store;

/// A stored provider configuration for one app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub id: String,
    pub app_type: AppType,
    pub name: String,
    pub config: Value,
    pub is_current: bool,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProviderRecord {
    /// The `_profile` block, if the config carries a well-formed one
    pub fn profile(&self) -> Option<ProviderProfile> {
        self.config
            .get(PROFILE_KEY)
            .filter(|p| p.is_object())
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }
}

/// One row of the append-only live config backup ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBackup {
    pub id: i64,
    pub app_type: AppType,
    pub backup: Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    #[default]
    Api,
    Official,
}

/// Display metadata stored under `_profile`; never written to live files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    #[serde(default)]
    pub kind: ProfileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Attach `profile` to a config object, replacing any previous `_profile`
pub fn attach_profile(config: Value, profile: &ProviderProfile) -> Result<Value> {
    let mut map = match config {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert(PROFILE_KEY.to_string(), serde_json::to_value(profile)?);
    Ok(Value::Object(map))
}

/// Carry the `_profile` of `previous` over onto `next`
///
/// Used when a provider's stored config is replaced by what was live, so the
/// user's labels survive the backfill.
pub fn preserve_profile(next: &Value, previous: &Value) -> Value {
    match (next, previous.get(PROFILE_KEY)) {
        (Value::Object(map), Some(profile @ Value::Object(_))) => {
            let mut map = map.clone();
            map.insert(PROFILE_KEY.to_string(), profile.clone());
            Value::Object(map)
        }
        _ => next.clone(),
    }
}

/// Official Codex logins must not carry API-key credentials
pub fn sanitize_official_config(app: AppType, config: &Value) -> Value {
    if app != AppType::Codex {
        return config.clone();
    }
    let Value::Object(map) = config else {
        return config.clone();
    };

    let mut map = map.clone();
    let mut auth = map
        .get("auth")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    auth.insert("OPENAI_API_KEY".into(), Value::Null);
    auth.shift_remove("api_key");
    map.insert("auth".into(), Value::Object(auth));
    Value::Object(map)
}

fn sanitize_if_official(app: AppType, config: &Value) -> Value {
    let is_official = config
        .get(PROFILE_KEY)
        .and_then(|p| p.get("kind"))
        .and_then(Value::as_str)
        == Some("official");
    if is_official {
        sanitize_official_config(app, config)
    } else {
        config.clone()
    }
}

fn ensure_config_object(config: &Value) -> Result<()> {
    if config.is_object() {
        Ok(())
    } else {
        Err(HubError::Validation("Provider config must be an object".into()))
    }
}

/// Parse user-supplied provider config text; it must be a JSON object
pub fn parse_provider_config(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| HubError::Validation(format!("Provider config is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(HubError::Validation(
            "Provider config must be a JSON object.".into(),
        ));
    }
    Ok(value)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Add a provider record; it never starts out as current
pub fn add_provider(
    store: &Store,
    app: AppType,
    name: Option<&str>,
    config: Value,
) -> Result<ProviderRecord> {
    ensure_config_object(&config)?;
    let config = sanitize_if_official(app, &config);

    let id = uuid::Uuid::new_v4().to_string();
    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}-{}", app, &id[..8]),
    };
    let ts = now_millis();

    let record = ProviderRecord {
        id,
        app_type: app,
        name,
        config,
        is_current: false,
        created_at: ts,
        updated_at: ts,
    };
    store.insert_provider(&record)?;
    tracing::info!(provider_id = %record.id, app = %app, "Added provider");

    get_provider_raw(store, &record.id)
}

/// Update a provider's name and/or config; a blank name keeps the old one
pub fn update_provider(
    store: &Store,
    id: &str,
    name: Option<&str>,
    config: Option<Value>,
) -> Result<ProviderRecord> {
    let existing = get_provider_raw(store, id)?;

    let config = match config {
        Some(config) => {
            ensure_config_object(&config)?;
            sanitize_if_official(existing.app_type, &config)
        }
        None => existing.config.clone(),
    };
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&existing.name);

    store.update_provider(id, name, &config, now_millis())?;
    get_provider_raw(store, id)
}

pub fn delete_provider(store: &Store, id: &str) -> Result<bool> {
    let deleted = store.delete_provider(id)?;
    if deleted {
        tracing::info!(provider_id = %id, "Deleted provider");
    }
    Ok(deleted)
}

/// The only accessor that returns a provider with its secrets intact
pub fn get_provider_raw(store: &Store, id: &str) -> Result<ProviderRecord> {
    store
        .get_provider(id)?
        .ok_or_else(|| HubError::not_found("Provider", id))
}

// -----------------------------------------------------------------------------
// Universal providers
// -----------------------------------------------------------------------------

/// Which apps a universal provider is applied to; absent means enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalApps {
    #[serde(default = "enabled")]
    pub claude: bool,
    #[serde(default = "enabled")]
    pub codex: bool,
    #[serde(default = "enabled")]
    pub gemini: bool,
}

fn enabled() -> bool {
    true
}

impl Default for UniversalApps {
    fn default() -> Self {
        Self {
            claude: true,
            codex: true,
            gemini: true,
        }
    }
}

impl UniversalApps {
    pub fn is_enabled(&self, app: AppType) -> bool {
        match app {
            AppType::Claude => self.claude,
            AppType::Codex => self.codex,
            AppType::Gemini => self.gemini,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Per-app model overrides for a universal provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalModels {
    #[serde(default)]
    pub claude: ModelChoice,
    #[serde(default)]
    pub codex: ModelChoice,
    #[serde(default)]
    pub gemini: ModelChoice,
}

impl UniversalModels {
    pub fn model_for(&self, app: AppType) -> Option<&str> {
        let choice = match app {
            AppType::Claude => &self.claude,
            AppType::Codex => &self.codex,
            AppType::Gemini => &self.gemini,
        };
        choice.model.as_deref().filter(|m| !m.is_empty())
    }
}

/// One base URL and API key shared across every enabled app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalProvider {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub apps: UniversalApps,
    pub models: UniversalModels,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for [`add_universal_provider`] and [`update_universal_provider`]
///
/// For updates, `None` and blank strings keep the existing value.
#[derive(Debug, Clone, Default)]
pub struct UniversalProviderInput {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub website_url: Option<String>,
    pub notes: Option<String>,
    pub apps: Option<UniversalApps>,
    pub models: Option<UniversalModels>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn add_universal_provider(
    store: &Store,
    input: UniversalProviderInput,
) -> Result<UniversalProvider> {
    let name = non_blank(input.name.as_ref())
        .ok_or_else(|| HubError::Validation("Universal provider name is required".into()))?;
    let base_url = non_blank(input.base_url.as_ref())
        .ok_or_else(|| HubError::Validation("Universal provider baseUrl is required".into()))?;
    let api_key = non_blank(input.api_key.as_ref())
        .ok_or_else(|| HubError::Validation("Universal provider apiKey is required".into()))?;

    let ts = now_millis();
    let provider = UniversalProvider {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        base_url,
        api_key,
        website_url: non_blank(input.website_url.as_ref()),
        notes: non_blank(input.notes.as_ref()),
        apps: input.apps.unwrap_or_default(),
        models: input.models.unwrap_or_default(),
        created_at: ts,
        updated_at: ts,
    };
    store.insert_universal(&provider)?;
    tracing::info!(universal_id = %provider.id, "Added universal provider");
    Ok(provider)
}

pub fn update_universal_provider(
    store: &Store,
    id: &str,
    input: UniversalProviderInput,
) -> Result<UniversalProvider> {
    let existing = get_universal_provider(store, id)?;

    let next = UniversalProvider {
        name: non_blank(input.name.as_ref()).unwrap_or(existing.name),
        base_url: non_blank(input.base_url.as_ref()).unwrap_or(existing.base_url),
        api_key: non_blank(input.api_key.as_ref()).unwrap_or(existing.api_key),
        website_url: match input.website_url {
            Some(url) => non_blank(Some(&url)),
            None => existing.website_url,
        },
        notes: match input.notes {
            Some(notes) => non_blank(Some(&notes)),
            None => existing.notes,
        },
        apps: input.apps.unwrap_or(existing.apps),
        models: input.models.unwrap_or(existing.models),
        updated_at: now_millis(),
        ..existing
    };
    store.update_universal(&next)?;
    Ok(next)
}

pub fn get_universal_provider(store: &Store, id: &str) -> Result<UniversalProvider> {
    store
        .get_universal(id)?
        .ok_or_else(|| HubError::not_found("Universal provider", id))
}

/// Codex provider table key: lowercase, `[a-z0-9_]` only, `custom` if empty
pub fn codex_provider_key(name: &str) -> String {
    let replaced: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "custom".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build the provider config a universal provider synthesizes for `app`
pub fn universal_provider_config(universal: &UniversalProvider, app: AppType) -> Result<Value> {
    let model = universal.models.model_for(app);
    let endpoint = universal.base_url.as_str();
    let profile = ProviderProfile {
        kind: ProfileKind::Api,
        vendor_key: Some("universal".into()),
        universal_id: Some(universal.id.clone()),
        endpoint: Some(endpoint.to_string()),
        website: universal.website_url.clone(),
        model: model.map(str::to_string),
        note: universal.notes.clone(),
        ..Default::default()
    };

    let config = match app {
        AppType::Claude => json!({
            "api_key": universal.api_key,
            "model": model.unwrap_or("claude-sonnet-4"),
            "api_base_url": endpoint,
        }),
        AppType::Codex => {
            let key = codex_provider_key(&universal.name);
            let mut providers = Map::new();
            providers.insert(
                key.clone(),
                json!({
                    "name": key,
                    "base_url": endpoint,
                    "wire_api": "responses",
                    "requires_openai_auth": true,
                }),
            );
            json!({
                "auth": { "OPENAI_API_KEY": universal.api_key },
                "settingsToml": {
                    "model_provider": key,
                    "model": model.unwrap_or("gpt-5.2"),
                    "model_reasoning_effort": "high",
                    "disable_response_storage": true,
                    "model_providers": Value::Object(providers),
                },
            })
        }
        AppType::Gemini => json!({
            "env": { "GEMINI_API_KEY": universal.api_key },
            "settings": {
                "model": model.unwrap_or("gemini-2.5-pro"),
                "api_base_url": endpoint,
            },
        }),
    };

    attach_profile(config, &profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_store;

    #[test]
    fn test_add_provider_defaults_name() {
        let store = memory_store();
        let record = add_provider(&store, AppType::Claude, Some("  "), json!({"model": "m"})).unwrap();

        assert!(record.name.starts_with("claude-"));
        assert_eq!(record.name.len(), "claude-".len() + 8);
        assert!(!record.is_current);
        assert_eq!(record.config, json!({"model": "m"}));
    }

    #[test]
    fn test_add_provider_rejects_non_object() {
        let store = memory_store();
        let err = add_provider(&store, AppType::Claude, None, json!([1, 2])).unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[test]
    fn test_official_codex_provider_drops_api_key() {
        let store = memory_store();
        let record = add_provider(
            &store,
            AppType::Codex,
            Some("official"),
            json!({
                "auth": {"OPENAI_API_KEY": "sk-live", "api_key": "sk-live", "auth_mode": "chatgpt"},
                "_profile": {"kind": "official"}
            }),
        )
        .unwrap();

        assert_eq!(record.config["auth"]["OPENAI_API_KEY"], Value::Null);
        assert!(record.config["auth"].get("api_key").is_none());
        assert_eq!(record.config["auth"]["auth_mode"], "chatgpt");
        assert_eq!(record.profile().unwrap().kind, ProfileKind::Official);
    }

    #[test]
    fn test_update_provider_keeps_name_when_blank() {
        let store = memory_store();
        let record = add_provider(&store, AppType::Gemini, Some("g"), json!({"env": {}})).unwrap();

        let updated =
            update_provider(&store, &record.id, Some(""), Some(json!({"settings": {"a": 1}}))).unwrap();
        assert_eq!(updated.name, "g");
        assert_eq!(updated.config, json!({"settings": {"a": 1}}));

        let err = update_provider(&store, "missing", None, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_provider() {
        let store = memory_store();
        let record = add_provider(&store, AppType::Claude, None, json!({})).unwrap();
        assert!(delete_provider(&store, &record.id).unwrap());
        assert!(!delete_provider(&store, &record.id).unwrap());
        assert!(get_provider_raw(&store, &record.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_preserve_profile() {
        let live = json!({"api_key": "manual"});
        let previous = json!({"api_key": "old", "_profile": {"kind": "official", "note": "n"}});
        assert_eq!(
            preserve_profile(&live, &previous),
            json!({"api_key": "manual", "_profile": {"kind": "official", "note": "n"}})
        );
        assert_eq!(preserve_profile(&live, &json!({})), live);
    }

    #[test]
    fn test_parse_provider_config() {
        assert!(parse_provider_config(r#"{"a": 1}"#).is_ok());
        assert!(parse_provider_config("[1]").is_err());
        assert!(parse_provider_config("{oops").is_err());
    }

    #[test]
    fn test_universal_provider_requires_fields() {
        let store = memory_store();
        let err = add_universal_provider(
            &store,
            UniversalProviderInput {
                name: Some("relay".into()),
                base_url: Some(" ".into()),
                api_key: Some("sk".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Universal provider baseUrl is required");
    }

    #[test]
    fn test_universal_update_merges_fields() {
        let store = memory_store();
        let created = add_universal_provider(
            &store,
            UniversalProviderInput {
                name: Some("relay".into()),
                base_url: Some("https://relay.example/v1".into()),
                api_key: Some("sk-relay-123456".into()),
                notes: Some("team".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let updated = update_universal_provider(
            &store,
            &created.id,
            UniversalProviderInput {
                api_key: Some("sk-rotated-99".into()),
                notes: Some("".into()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.name, "relay");
        assert_eq!(updated.api_key, "sk-rotated-99");
        assert!(updated.notes.is_none());
        assert_eq!(get_universal_provider(&store, &created.id).unwrap(), updated);
    }

    #[test]
    fn test_codex_provider_key() {
        assert_eq!(codex_provider_key("My Relay!"), "my_relay");
        assert_eq!(codex_provider_key("__x__"), "x");
        assert_eq!(codex_provider_key("???"), "custom");
    }

    #[test]
    fn test_universal_provider_config_per_app() {
        let universal = UniversalProvider {
            id: "u-1".into(),
            name: "Relay".into(),
            base_url: "https://relay.example/v1".into(),
            api_key: "sk-relay".into(),
            website_url: None,
            notes: None,
            apps: UniversalApps::default(),
            models: UniversalModels {
                codex: ModelChoice {
                    model: Some("gpt-5".into()),
                },
                ..Default::default()
            },
            created_at: 0,
            updated_at: 0,
        };

        let claude = universal_provider_config(&universal, AppType::Claude).unwrap();
        assert_eq!(claude["model"], "claude-sonnet-4");
        assert_eq!(claude["_profile"]["universalId"], "u-1");
        assert_eq!(claude["_profile"]["vendorKey"], "universal");

        let codex = universal_provider_config(&universal, AppType::Codex).unwrap();
        assert_eq!(codex["auth"]["OPENAI_API_KEY"], "sk-relay");
        assert_eq!(codex["settingsToml"]["model"], "gpt-5");
        assert_eq!(codex["settingsToml"]["model_provider"], "relay");
        assert_eq!(
            codex["settingsToml"]["model_providers"]["relay"]["base_url"],
            "https://relay.example/v1"
        );

        let gemini = universal_provider_config(&universal, AppType::Gemini).unwrap();
        assert_eq!(gemini["env"]["GEMINI_API_KEY"], "sk-relay");
        assert_eq!(gemini["settings"]["model"], "gemini-2.5-pro");
    }
}

//! Live configuration adapters.
//!
//! Each supported tool keeps its configuration in a different on-disk shape:
//! - Claude Code: one JSON settings file.
//! - Codex CLI: a JSON auth file plus a TOML settings file.
//! - Gemini CLI: a `KEY=VALUE` env file plus a JSON settings file.
//!
//! Every adapter exposes the same four operations through [`LiveAdapter`]:
//! read the live files into one JSON value, merge a provider config over it,
//! validate the merged result and write it back atomically. Reading a missing
//! file never fails; it yields an empty object.

mod claude;
mod codex;
mod env_file;
mod gemini;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use env_file::{parse_env, stringify_env};
pub use gemini::GeminiAdapter;

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::app::AppType;
use crate::error::{HubError, Result};
use crate::paths::Paths;

/// Reserved provider-config key holding display metadata, never written live
pub const PROFILE_KEY: &str = "_profile";

/// Read, merge, validate and write one tool's live configuration
pub trait LiveAdapter {
    fn app_type(&self) -> AppType;

    /// Read the live files; missing files contribute empty objects
    fn read_live(&self) -> Result<Value>;

    /// Overlay a provider config on the live config
    fn merge(&self, live: &Value, provider: &Value) -> Result<Value>;

    fn validate(&self, config: &Value) -> Result<()>;

    /// Atomically replace the live files described by `config`
    fn write_live(&self, config: &Value) -> Result<()>;
}

/// The closed set of built-in adapters
#[derive(Debug, Clone)]
pub enum Adapter {
    Claude(ClaudeAdapter),
    Codex(CodexAdapter),
    Gemini(GeminiAdapter),
}

impl Adapter {
    pub fn for_app(app: AppType, paths: &Paths) -> Self {
        match app {
            AppType::Claude => Adapter::Claude(ClaudeAdapter::new(paths.claude_settings.clone())),
            AppType::Codex => Adapter::Codex(CodexAdapter::new(
                paths.codex_auth.clone(),
                paths.codex_config.clone(),
            )),
            AppType::Gemini => Adapter::Gemini(GeminiAdapter::new(
                paths.gemini_env.clone(),
                paths.gemini_settings.clone(),
            )),
        }
    }

    fn inner(&self) -> &dyn LiveAdapter {
        match self {
            Adapter::Claude(a) => a,
            Adapter::Codex(a) => a,
            Adapter::Gemini(a) => a,
        }
    }
}

impl LiveAdapter for Adapter {
    fn app_type(&self) -> AppType {
        self.inner().app_type()
    }

    fn read_live(&self) -> Result<Value> {
        self.inner().read_live()
    }

    fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
        self.inner().merge(live, provider)
    }

    fn validate(&self, config: &Value) -> Result<()> {
        self.inner().validate(config)
    }

    fn write_live(&self, config: &Value) -> Result<()> {
        self.inner().write_live(config)
    }
}

/// Lookup table from app type to the adapter that owns its live files
pub struct AdapterTable {
    adapters: HashMap<AppType, Box<dyn LiveAdapter>>,
}

impl AdapterTable {
    pub fn for_paths(paths: &Paths) -> Self {
        let adapters = AppType::all()
            .into_iter()
            .map(|app| (app, Box::new(Adapter::for_app(app, paths)) as Box<dyn LiveAdapter>))
            .collect();
        Self { adapters }
    }

    /// Swap in a different adapter for the app type it reports
    pub fn replace(&mut self, adapter: Box<dyn LiveAdapter>) {
        self.adapters.insert(adapter.app_type(), adapter);
    }

    pub fn get(&self, app: AppType) -> Result<&dyn LiveAdapter> {
        self.adapters
            .get(&app)
            .map(|a| a.as_ref())
            .ok_or_else(|| HubError::UnsupportedApp(app.to_string()))
    }
}

/// Recursively merge `next` over `base`
///
/// Objects merge key by key; any other value in `next` (including arrays)
/// replaces what `base` had.
pub fn deep_merge(base: &Value, next: &Value) -> Value {
    let (Value::Object(base_map), Value::Object(next_map)) = (base, next) else {
        return next.clone();
    };

    let mut merged = base_map.clone();
    for (key, value) in next_map {
        let combined = match (merged.get(key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(_)) => deep_merge(existing, value),
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    Value::Object(merged)
}

/// Drop the `_profile` metadata before a provider config touches live files
pub fn strip_profile(config: &Value) -> Value {
    match config {
        Value::Object(map) if map.contains_key(PROFILE_KEY) => {
            let mut map = map.clone();
            map.shift_remove(PROFILE_KEY);
            Value::Object(map)
        }
        other => other.clone(),
    }
}

pub(crate) fn ensure_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| HubError::Validation(format!("{} must be an object", what)))
}

/// Merge sub-object `key` of `provider` over the same key of `live`
///
/// Returns `None` when the provider does not carry that sub-object, which
/// leaves the corresponding live file untouched.
pub(crate) fn merge_section(live: &Value, provider: &Value, key: &str) -> Option<Value> {
    let next = provider.get(key).filter(|v| v.is_object())?;
    let base = live
        .get(key)
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    Some(deep_merge(&base, next))
}

//! Secret masking for anything shown to a user.

use serde_json::{Map, Value};

use crate::providers::{ProviderRecord, UniversalProvider, preserve_profile};

const MASK: &str = "****";

fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["key", "token", "secret", "password"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Mask one secret string: short values are fully hidden, longer ones keep
/// their first four and last two characters
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() <= 8 {
        return MASK.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

/// Recursively mask string values whose key looks like a credential
pub fn mask_config(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(mask_config).collect()),
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) if is_secret_key(key) => Value::String(mask_secret(s)),
                        other => mask_config(other),
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(masked)
        }
        other => other.clone(),
    }
}

/// `_profile` holds labels, not credentials, and is shown as stored
pub fn mask_provider(record: &ProviderRecord) -> ProviderRecord {
    ProviderRecord {
        config: preserve_profile(&mask_config(&record.config), &record.config),
        ..record.clone()
    }
}

pub fn mask_providers(records: &[ProviderRecord]) -> Vec<ProviderRecord> {
    records.iter().map(mask_provider).collect()
}

/// Universal provider keys show only their first three characters
pub fn mask_universal(provider: &UniversalProvider) -> UniversalProvider {
    let key = provider.api_key.trim();
    let api_key = if key.is_empty() {
        String::new()
    } else {
        format!("{}{}", key.chars().take(3).collect::<String>(), MASK)
    };
    UniversalProvider {
        api_key,
        ..provider.clone()
    }
}

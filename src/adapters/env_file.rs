use serde_json::{Map, Value};

/// Parse a `KEY=VALUE` env file
///
/// Blank lines and `#` comments are skipped, each line splits on its first
/// `=`, and a leading and/or trailing double quote is stripped from the value.
/// Lines without a key are ignored.
pub fn parse_env(raw: &str) -> Map<String, Value> {
    let mut result = Map::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value.strip_prefix('"').unwrap_or(value);
        let value = value.strip_suffix('"').unwrap_or(value);
        result.insert(key.to_string(), Value::String(value.to_string()));
    }
    result
}

/// Serialize env entries sorted by key, one unquoted `KEY=value` per line
pub fn stringify_env(env: &Map<String, Value>) -> String {
    let mut entries: Vec<(&String, &Value)> = env.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let lines: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::HubError;
use crate::paths::Paths;

/// AI coding tools whose live configuration is managed by skillhub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Claude,
    Codex,
    Gemini,
}

impl AppType {
    /// All supported app types, in the order batch operations visit them
    pub fn all() -> [AppType; 3] {
        [AppType::Claude, AppType::Codex, AppType::Gemini]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Claude => "claude",
            AppType::Codex => "codex",
            AppType::Gemini => "gemini",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            AppType::Claude => "Claude Code",
            AppType::Codex => "Codex CLI",
            AppType::Gemini => "Gemini CLI",
        }
    }

    /// Live files the tool reads at runtime
    pub fn live_files(&self, paths: &Paths) -> Vec<PathBuf> {
        match self {
            AppType::Claude => vec![paths.claude_settings.clone()],
            AppType::Codex => vec![paths.codex_auth.clone(), paths.codex_config.clone()],
            AppType::Gemini => vec![paths.gemini_env.clone(), paths.gemini_settings.clone()],
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(AppType::Claude),
            "codex" => Ok(AppType::Codex),
            "gemini" => Ok(AppType::Gemini),
            _ => Err(HubError::UnsupportedApp(s.to_string())),
        }
    }
}

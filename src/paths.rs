use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// All computed paths used by skillhub
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.skills-hub
    pub base_dir: PathBuf,
    /// ~/.skills-hub/skills-hub.db
    pub db_file: PathBuf,
    /// ~/.skills-hub/snapshots
    pub snapshots_dir: PathBuf,
    /// ~/.skills-hub/config.json
    pub config_file: PathBuf,
    /// ~/.claude/settings.json
    pub claude_settings: PathBuf,
    /// ~/.codex/auth.json
    pub codex_auth: PathBuf,
    /// ~/.codex/config.toml
    pub codex_config: PathBuf,
    /// ~/.gemini/.env
    pub gemini_env: PathBuf,
    /// ~/.gemini/settings.json
    pub gemini_settings: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        Ok(Self::from_home(base_dirs.home_dir()))
    }

    /// Compute every path relative to an explicit home directory
    pub fn from_home(home: &Path) -> Self {
        let base_dir = home.join(".skills-hub");
        let claude_dir = home.join(".claude");
        let codex_dir = home.join(".codex");
        let gemini_dir = home.join(".gemini");

        Self {
            db_file: base_dir.join("skills-hub.db"),
            snapshots_dir: base_dir.join("snapshots"),
            config_file: base_dir.join("config.json"),
            base_dir,
            claude_settings: claude_dir.join("settings.json"),
            codex_auth: codex_dir.join("auth.json"),
            codex_config: codex_dir.join("config.toml"),
            gemini_env: gemini_dir.join(".env"),
            gemini_settings: gemini_dir.join("settings.json"),
        }
    }
}

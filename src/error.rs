//! Error types for the safe mutation subsystem.
//!
//! The CLI layer wraps these in `anyhow`, but the library keeps them typed so
//! callers can tell a not-found from a failed switch and pull the backup id
//! out of the latter.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app::AppType;

pub type Result<T> = std::result::Result<T, HubError>;

/// The step of a provider switch that failed after the backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStep {
    Merge,
    Validate,
    WriteLive,
    SetCurrent,
}

impl fmt::Display for SwitchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwitchStep::Merge => "merge",
            SwitchStep::Validate => "validate",
            SwitchStep::WriteLive => "writeLive",
            SwitchStep::SetCurrent => "setCurrent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Unsupported app type: {0}")]
    UnsupportedApp(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Provider {provider_id} does not belong to app {app}")]
    AppMismatch { provider_id: String, app: AppType },

    #[error("No backup found for app {0}")]
    NoBackup(AppType),

    #[error("{0}")]
    Validation(String),

    #[error(
        "Provider switch failed at {step} for {app}. Backup id: {backup_id}.{note} Root cause: {source}",
        note = rollback_note(.rollback)
    )]
    Switch {
        step: SwitchStep,
        app: AppType,
        backup_id: i64,
        rollback: Option<Box<HubError>>,
        source: Box<HubError>,
    },

    #[error("Snapshot entry missing archive path: {0}")]
    MissingArchivePath(PathBuf),

    #[error("Invalid snapshot archive path: {0}")]
    ArchiveOutsideSnapshot(String),

    #[error("Snapshot archive not found for path: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Cannot snapshot {0}: it overlaps the snapshot store")]
    OverlapsSnapshotStore(PathBuf),

    #[error("Cannot snapshot {0}: unsupported file type")]
    UnsupportedKind(PathBuf),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Failed to serialize JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl HubError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoBackup(_))
    }

    /// Backup id an operator can hand to `restore_backup` after a failed switch
    pub fn backup_id(&self) -> Option<i64> {
        match self {
            Self::Switch { backup_id, .. } => Some(*backup_id),
            _ => None,
        }
    }
}

fn rollback_note(rollback: &Option<Box<HubError>>) -> String {
    match rollback {
        Some(err) => format!(" Rollback failed: {}.", err),
        None => String::new(),
    }
}

/// Build a `map_err` adapter that attaches the action and path to an I/O error
pub fn io_err<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> HubError + 'a {
    move |source| HubError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

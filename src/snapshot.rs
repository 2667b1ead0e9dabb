//! Filesystem snapshots taken before risky mutations.
//!
//! A snapshot captures the content at a fixed list of paths so an operation
//! (a sync or a kit apply) can be undone later. Layout on disk:
//!
//! ```text
//! ~/.skills-hub/snapshots/<id>/
//!     metadata.json
//!     entries/0000-<basename>
//!     entries/0001-<basename>
//! ```
//!
//! Paths that did not exist are recorded as `missing` and have no archive;
//! rolling back removes them again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HubError, Result, io_err};
use crate::fs_utils::{
    PathKind, absolutize, copy_no_follow, normalize_lexically, read_optional, remove_path,
    write_json_atomic,
};

pub const METADATA_FILE: &str = "metadata.json";
pub const ENTRIES_DIR: &str = "entries";
pub const DEFAULT_RETENTION: usize = 20;
pub const RETENTION_ENV_KEY: &str = "SKILLS_HUB_SNAPSHOT_RETENTION";
const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotOperation {
    #[serde(rename = "sync")]
    Sync,
    #[serde(rename = "kit-apply")]
    KitApply,
}

impl SnapshotOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::KitApply => "kit-apply",
        }
    }
}

impl fmt::Display for SnapshotOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotOperation {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "kit-apply" => Ok(Self::KitApply),
            _ => Err(HubError::Validation(format!(
                "Unsupported snapshot operation: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    #[default]
    Copy,
    Link,
}

impl SnapshotMode {
    /// `link` only for exactly "link"; anything else is a copy
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("link") => Self::Link,
            _ => Self::Copy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Link => "link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub kind: PathKind,
    /// Relative to the snapshot directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub operation: SnapshotOperation,
    pub target: String,
    pub mode: SnapshotMode,
    pub affected_paths: Vec<PathBuf>,
    pub entries: Vec<SnapshotEntry>,
}

/// What to capture and under which label
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub operation: String,
    pub target: String,
    pub mode: Option<String>,
    pub affected_paths: Vec<PathBuf>,
    /// Configured retention, used when the environment sets none
    pub retention: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSnapshot {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub retention: usize,
    pub pruned_snapshot_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub operation: SnapshotOperation,
    pub target: String,
    pub mode: SnapshotMode,
    pub total_paths: usize,
    pub restored_paths: usize,
    pub removed_paths: usize,
}

fn parse_positive(value: Option<&str>) -> Option<usize> {
    value?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .map(|n| n as usize)
}

/// Pick the retention from an environment value, then a configured value,
/// then the default; the first positive integer wins
pub fn retention_from(env_value: Option<&str>, config_value: Option<&str>) -> usize {
    parse_positive(env_value)
        .or_else(|| parse_positive(config_value))
        .unwrap_or(DEFAULT_RETENTION)
}

/// [`retention_from`] with the environment read from `SKILLS_HUB_SNAPSHOT_RETENTION`
pub fn resolve_retention(config_value: Option<&str>) -> usize {
    let env_value = std::env::var(RETENTION_ENV_KEY).ok();
    retention_from(env_value.as_deref(), config_value)
}

fn new_snapshot_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Absolutize, drop blanks and keep the first occurrence of each path
fn normalize_affected_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for candidate in paths {
        if candidate.to_string_lossy().trim().is_empty() {
            continue;
        }
        let resolved = absolutize(candidate)?;
        if seen.insert(resolved.clone()) {
            unique.push(resolved);
        }
    }
    if unique.is_empty() {
        return Err(HubError::Validation(
            "affectedPaths must include at least one path".into(),
        ));
    }
    Ok(unique)
}

fn archive_name(index: usize, path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "entry".to_string());
    format!("{:04}-{}", index, base)
}

/// Snapshot ids are single path components; anything else cannot exist
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

/// The snapshot directory on disk
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Capture every affected path, persist the metadata and prune old snapshots
    pub fn create_snapshot(&self, request: &SnapshotRequest) -> Result<CreatedSnapshot> {
        let operation: SnapshotOperation = request.operation.parse()?;
        let target = request.target.trim().to_string();
        if target.is_empty() {
            return Err(HubError::Validation("snapshot target is required".into()));
        }
        let mode = SnapshotMode::from_label(request.mode.as_deref());
        let affected_paths = normalize_affected_paths(&request.affected_paths)?;
        self.reject_overlapping(&affected_paths)?;
        let retention = resolve_retention(request.retention.as_deref());

        let created_at = Utc::now();
        let id = new_snapshot_id(created_at);
        let snapshot_dir = self.snapshot_dir(&id);
        let entries_dir = snapshot_dir.join(ENTRIES_DIR);
        fs::create_dir_all(&entries_dir).map_err(io_err("create directory", &entries_dir))?;

        let entries = match self.capture_entries(&affected_paths, &snapshot_dir, &entries_dir) {
            Ok(entries) => entries,
            Err(e) => {
                // a half-written snapshot would be listed without its metadata
                let _ = fs::remove_dir_all(&snapshot_dir);
                return Err(e);
            }
        };

        let metadata = SnapshotMetadata {
            version: METADATA_VERSION,
            id,
            created_at,
            operation,
            target,
            mode,
            affected_paths,
            entries,
        };
        let written = serde_json::to_value(&metadata)
            .map_err(HubError::from)
            .and_then(|value| write_json_atomic(&snapshot_dir.join(METADATA_FILE), &value));
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&snapshot_dir);
            return Err(e);
        }
        tracing::info!(
            snapshot_id = %metadata.id,
            operation = %metadata.operation,
            paths = metadata.entries.len(),
            "Created snapshot"
        );

        let pruned_snapshot_ids = self.prune_snapshots(retention)?;

        Ok(CreatedSnapshot {
            metadata,
            retention,
            pruned_snapshot_ids,
        })
    }

    /// A path that is, contains or lives inside the store would be copied into itself
    fn reject_overlapping(&self, paths: &[PathBuf]) -> Result<()> {
        let root = absolutize(&self.root)?;
        match paths
            .iter()
            .find(|path| root.starts_with(path) || path.starts_with(&root))
        {
            Some(path) => Err(HubError::OverlapsSnapshotStore(path.clone())),
            None => Ok(()),
        }
    }

    fn capture_entries(
        &self,
        paths: &[PathBuf],
        snapshot_dir: &Path,
        entries_dir: &Path,
    ) -> Result<Vec<SnapshotEntry>> {
        let mut entries = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let kind = PathKind::detect(path)?;
            let archive_path = match kind {
                PathKind::Missing => None,
                PathKind::Other => return Err(HubError::UnsupportedKind(path.clone())),
                _ => {
                    let archive = entries_dir.join(archive_name(index, path));
                    copy_no_follow(path, &archive)?;
                    let relative = archive
                        .strip_prefix(snapshot_dir)
                        .unwrap_or(&archive)
                        .to_string_lossy()
                        .into_owned();
                    Some(relative)
                }
            };
            entries.push(SnapshotEntry {
                path: path.clone(),
                kind,
                archive_path,
            });
        }
        Ok(entries)
    }

    /// All readable snapshots, newest first (ties broken by id, descending)
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotMetadata>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("read directory", &self.root)(e)),
        };

        let mut snapshots = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(io_err("read directory", &self.root))?;
            if !entry.path().is_dir() {
                continue;
            }
            match read_metadata(&entry.path()) {
                Ok(Some(metadata)) => snapshots.push(metadata),
                Ok(None) => {
                    tracing::debug!(dir = %entry.path().display(), "Skipping snapshot without metadata");
                }
                Err(e) => {
                    tracing::debug!(dir = %entry.path().display(), error = %e, "Skipping unreadable snapshot");
                }
            }
        }

        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(snapshots)
    }

    pub fn get_snapshot(&self, id: &str) -> Result<SnapshotMetadata> {
        let id = id.trim();
        if id.is_empty() {
            return Err(HubError::Validation("snapshot id is required".into()));
        }
        if !is_valid_id(id) {
            return Err(HubError::not_found("Snapshot", id));
        }
        match read_metadata(&self.snapshot_dir(id)) {
            Ok(Some(metadata)) => Ok(metadata),
            Ok(None) | Err(_) => Err(HubError::not_found("Snapshot", id)),
        }
    }

    pub fn latest_snapshot(&self) -> Result<Option<SnapshotMetadata>> {
        Ok(self.list_snapshots()?.into_iter().next())
    }

    /// Delete every snapshot beyond the newest `retention`; returns removed ids
    pub fn prune_snapshots(&self, retention: usize) -> Result<Vec<String>> {
        let snapshots = self.list_snapshots()?;
        let mut removed = Vec::new();
        for stale in snapshots.into_iter().skip(retention) {
            if !is_valid_id(&stale.id) {
                continue;
            }
            let dir = self.snapshot_dir(&stale.id);
            fs::remove_dir_all(&dir).map_err(io_err("remove", &dir))?;
            removed.push(stale.id);
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), retention, "Pruned snapshots");
        }
        Ok(removed)
    }

    /// Resolve an entry's archive, refusing anything outside the snapshot
    pub fn archive_location(&self, snapshot_dir: &Path, entry: &SnapshotEntry) -> Result<PathBuf> {
        let relative = entry
            .archive_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| HubError::MissingArchivePath(entry.path.clone()))?;

        let archive = normalize_lexically(&snapshot_dir.join(relative));
        if archive == snapshot_dir || !archive.starts_with(snapshot_dir) {
            return Err(HubError::ArchiveOutsideSnapshot(relative.to_string()));
        }
        if PathKind::detect(&archive)? == PathKind::Missing {
            return Err(HubError::ArchiveNotFound(entry.path.clone()));
        }
        Ok(archive)
    }

    /// Put every captured path back the way it was when the snapshot was taken
    ///
    /// Deeper paths are handled first so restoring a parent never clobbers a
    /// child entry that is restored on its own.
    pub fn rollback_snapshot(&self, id: &str) -> Result<RollbackReport> {
        let metadata = self.get_snapshot(id)?;
        // archives are read from the requested snapshot, whatever its metadata claims
        let id = id.trim();
        let snapshot_dir = self.snapshot_dir(id);

        let mut entries: Vec<&SnapshotEntry> = metadata.entries.iter().collect();
        entries.sort_by_key(|e| Reverse(e.path.as_os_str().len()));

        let mut restored_paths = 0;
        let mut removed_paths = 0;
        for entry in entries {
            if entry.path.as_os_str().is_empty() {
                continue;
            }

            if entry.kind == PathKind::Missing {
                remove_path(&entry.path)?;
                removed_paths += 1;
                continue;
            }

            let archive = self.archive_location(&snapshot_dir, entry)?;
            remove_path(&entry.path)?;
            if let Some(parent) = entry.path.parent() {
                fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
            }
            copy_no_follow(&archive, &entry.path)?;
            restored_paths += 1;
        }

        tracing::info!(
            snapshot_id = %id,
            restored_paths,
            removed_paths,
            "Rolled back snapshot"
        );

        Ok(RollbackReport {
            total_paths: metadata.entries.len(),
            id: id.to_string(),
            created_at: metadata.created_at,
            operation: metadata.operation,
            target: metadata.target,
            mode: metadata.mode,
            restored_paths,
            removed_paths,
        })
    }
}

fn read_metadata(snapshot_dir: &Path) -> Result<Option<SnapshotMetadata>> {
    let path = snapshot_dir.join(METADATA_FILE);
    match read_optional(&path)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| HubError::Json { path, source }),
        None => Ok(None),
    }
}

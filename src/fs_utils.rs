//! Filesystem utility functions
//!
//! Atomic replacement of live files, symlink-preserving copies and removals
//! used by the adapters and the snapshot engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{HubError, Result, io_err};

/// What currently exists at a path, determined without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Missing,
    File,
    Directory,
    Symlink,
    Other,
}

impl PathKind {
    pub fn detect(path: &Path) -> Result<Self> {
        // symlink_metadata first: a link to a directory is a Symlink, not a Directory
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                let file_type = meta.file_type();
                if file_type.is_symlink() {
                    Ok(Self::Symlink)
                } else if file_type.is_dir() {
                    Ok(Self::Directory)
                } else if file_type.is_file() {
                    Ok(Self::File)
                } else {
                    Ok(Self::Other)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Missing),
            Err(e) => Err(io_err("inspect", path)(e)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "other",
        }
    }
}

/// Replace `path` with `content` by writing a sibling temp file and renaming it
///
/// A concurrent reader sees either the old or the new content, never a
/// partially written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let temp_path = parent.join(format!(
        ".{}.tmp-{}-{}",
        file_name,
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    fs::write(&temp_path, content).map_err(io_err("write temp file", &temp_path))?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_err("replace", path)(e));
    }

    Ok(())
}

/// Serialize `value` as pretty JSON with a trailing newline and write it atomically
pub fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    atomic_write(path, content.as_bytes())
}

/// Read a text file, treating a missing file as `None`
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err("read", path)(e)),
    }
}

/// Read a JSON file, returning an empty object when the file does not exist
pub fn read_json_or_empty(path: &Path) -> Result<Value> {
    match read_optional(path)? {
        Some(content) => serde_json::from_str(&content).map_err(|source| HubError::Json {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(Value::Object(Default::default())),
    }
}

/// Copy a file, directory tree or symlink without following symlinks
///
/// Symlinks are recreated pointing at the same target, including links that
/// live inside a copied directory.
pub fn copy_no_follow(src: &Path, dst: &Path) -> Result<()> {
    match PathKind::detect(src)? {
        PathKind::Missing => Err(io_err("copy", src)(io::ErrorKind::NotFound.into())),
        PathKind::Symlink => {
            let target = fs::read_link(src).map_err(io_err("read link", src))?;
            make_symlink(&target, dst)
        }
        PathKind::Directory => {
            fs::create_dir_all(dst).map_err(io_err("create directory", dst))?;
            for entry in fs::read_dir(src).map_err(io_err("read directory", src))? {
                let entry = entry.map_err(io_err("read directory", src))?;
                copy_no_follow(&entry.path(), &dst.join(entry.file_name()))?;
            }
            Ok(())
        }
        PathKind::File => {
            fs::copy(src, dst).map_err(io_err("copy", src))?;
            Ok(())
        }
        PathKind::Other => Err(HubError::UnsupportedKind(src.to_path_buf())),
    }
}

/// Remove whatever exists at `path` without following symlinks
///
/// Returns `false` when nothing was there.
pub fn remove_path(path: &Path) -> Result<bool> {
    match PathKind::detect(path)? {
        PathKind::Missing => Ok(false),
        PathKind::Directory => {
            fs::remove_dir_all(path).map_err(io_err("remove", path))?;
            Ok(true)
        }
        _ => {
            fs::remove_file(path).map_err(io_err("remove", path))?;
            Ok(true)
        }
    }
}

/// Resolve `path` against the current directory and fold `.`/`..` lexically
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(io_err("resolve", path))?;
        cwd.join(path)
    };
    Ok(normalize_lexically(&joined))
}

/// Fold `.` and `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Recursively calculate the total size of a path in bytes
///
/// Symbolic links are not followed; a link counts as its own metadata size.
pub fn path_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += path_size(&entry?.path())?;
    }
    Ok(total)
}

fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).map_err(io_err("create symlink", link))?;

    #[cfg(windows)]
    {
        // Windows distinguishes file and directory links; pick by what the target is now
        let resolved = link
            .parent()
            .map(|p| p.join(target))
            .unwrap_or_else(|| target.to_path_buf());
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
        .map_err(io_err("create symlink", link))?;
    }

    Ok(())
}

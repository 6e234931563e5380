//! Directory listing and per-entry metadata.
//! Entries are derived fresh on every request and never persisted. A child
//! that disappears or becomes unreadable between enumeration and stat is
//! skipped instead of failing the whole listing; the tree is live and
//! externally mutable, so partial tolerance is the intended policy.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::resolve::Root;

#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub rel: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub size_h: String,
    pub mtime: String,
}

/// Render a byte count the way the directory table shows it.
pub fn human_size(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = n as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}PB")
}

fn mtime_string(meta: &fs::Metadata) -> String {
    match meta.modified() {
        Ok(t) => DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => "-".to_string(),
    }
}

/// Build the metadata entry for one filesystem path, or `None` when the
/// path cannot be stat'ed (vanished or unreadable).
pub fn entry_for(root: &Root, path: &Path) -> Option<Entry> {
    let meta = fs::metadata(path).ok()?;
    let name = path.file_name()?.to_string_lossy().to_string();
    let is_dir = meta.is_dir();
    let size = if is_dir { 0 } else { meta.len() };
    Some(Entry {
        name,
        rel: root.relative(path),
        path: root.virtual_path(path),
        is_dir,
        size,
        size_h: if is_dir { "-".to_string() } else { human_size(size) },
        mtime: mtime_string(&meta),
    })
}

/// List the immediate children of a resolved directory, sorted
/// case-insensitively by name ascending.
pub fn list_dir(root: &Root, dir: &Path) -> ApiResult<Vec<Entry>> {
    let meta = fs::metadata(dir).map_err(ApiError::from)?;
    if !meta.is_dir() {
        return Err(ApiError::NotADirectory);
    }
    let mut entries: Vec<Entry> = Vec::new();
    for child in fs::read_dir(dir).map_err(ApiError::from)? {
        let child = match child {
            Ok(c) => c,
            Err(_) => continue,
        };
        if let Some(entry) = entry_for(root, &child.path()) {
            entries.push(entry);
        }
    }
    entries.sort_by_key(|e| e.name.to_lowercase());
    Ok(entries)
}

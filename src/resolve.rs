//! Virtual-path resolution against a fixed root.
//! ----------------------------------------------
//! Single source of truth for mapping an untrusted, percent-encoded client
//! path to a filesystem location guaranteed to lie inside the configured
//! root. Escaping `..` sequences are rejected lexically before any
//! filesystem call; symlinks are resolved through canonicalization before
//! the containment check, so a link pointing outside the root fails even
//! when the literal path looks contained.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use path_absolutize::Absolutize;

use crate::error::{ApiError, ApiResult};

/// The single directory the entire service is confined to. Canonicalized
/// once at startup and immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Root(PathBuf);

impl Root {
    /// Absolutize, canonicalize and validate the configured root directory.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let abs = path
            .absolutize()
            .with_context(|| format!("cannot absolutize root: {}", path.display()))?;
        let canonical = abs
            .canonicalize()
            .with_context(|| format!("cannot resolve root: {}", path.display()))?;
        if !canonical.is_dir() {
            anyhow::bail!("root is not a directory: {}", canonical.display());
        }
        Ok(Root(canonical))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Percent-decode and lexically normalize a virtual path into an
    /// absolute candidate under the root. `..` that would climb above the
    /// root fails here, before the filesystem is consulted.
    fn normalize(&self, virtual_path: &str) -> ApiResult<PathBuf> {
        let decoded = urlencoding::decode(virtual_path)
            .map_err(|_| ApiError::bad_request("invalid percent-encoding in path"))?;
        if decoded.chars().any(|c| c.is_control()) {
            return Err(ApiError::bad_request("control characters in path"));
        }
        // Tolerate Windows-style separators from clients.
        let slashed = decoded.replace('\\', "/");
        let trimmed = slashed.trim_start_matches('/');

        let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(seg) => segments.push(seg),
                Component::CurDir => {}
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(ApiError::OutsideRoot);
                    }
                }
                // The input is treated as rooted at the root regardless of
                // leading slash or drive prefix.
                Component::RootDir | Component::Prefix(_) => {}
            }
        }

        let mut out = self.0.clone();
        for seg in segments {
            out.push(seg);
        }
        Ok(out)
    }

    /// Resolve a virtual path to an existing filesystem location inside the
    /// root. Checked on every request, never cached.
    pub fn resolve(&self, virtual_path: &str) -> ApiResult<PathBuf> {
        let candidate = self.normalize(virtual_path)?;
        let canonical = candidate.canonicalize().map_err(ApiError::from)?;
        // Component-wise prefix check; a string prefix like /srv/data-evil
        // does not count as being under /srv/data.
        if !canonical.starts_with(&self.0) {
            return Err(ApiError::OutsideRoot);
        }
        Ok(canonical)
    }

    /// Resolve a destination that may not exist yet (mkdir, upload, save,
    /// move target). The deepest existing ancestor is canonicalized and
    /// containment-checked; the remaining final segment is re-joined only
    /// after that check passes.
    pub fn resolve_for_create(&self, virtual_path: &str) -> ApiResult<PathBuf> {
        let candidate = self.normalize(virtual_path)?;
        if candidate == self.0 {
            return Ok(candidate);
        }
        if let Ok(canonical) = candidate.canonicalize() {
            if !canonical.starts_with(&self.0) {
                return Err(ApiError::OutsideRoot);
            }
            return Ok(canonical);
        }
        let name = candidate
            .file_name()
            .ok_or_else(|| ApiError::bad_request("empty target name"))?
            .to_os_string();
        let parent = candidate.parent().ok_or(ApiError::OutsideRoot)?;
        let canonical_parent = parent.canonicalize().map_err(ApiError::from)?;
        if !canonical_parent.starts_with(&self.0) {
            return Err(ApiError::OutsideRoot);
        }
        Ok(canonical_parent.join(name))
    }

    /// Root-relative form of an already-resolved path, with forward slashes
    /// and no leading separator. Empty for the root itself.
    pub fn relative(&self, resolved: &Path) -> String {
        let rel = resolved.strip_prefix(&self.0).unwrap_or(resolved);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(seg) => Some(seg.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Client-facing virtual path (`/` + relative form).
    pub fn virtual_path(&self, resolved: &Path) -> String {
        format!("/{}", self.relative(resolved))
    }
}

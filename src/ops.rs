//! Filesystem mutations: mkdir, delete, rename, move, save, upload naming.
//! Every operation resolves its paths through the root resolver before any
//! filesystem call; a resolution failure short-circuits the whole request.
//! No operation spans requests, there is no cross-request state, and races
//! between concurrent clients are settled by the filesystem
//! (last-writer-wins).

use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::resolve::Root;

/// Outcome of a multi-source move. Failed items are reported by their
/// client-supplied virtual path; successful moves stay in effect.
#[derive(Debug)]
pub struct MoveOutcome {
    pub moved: usize,
    pub failed: Vec<String>,
}

/// Validate a client-supplied entry name: exactly one bare path segment.
pub fn validate_name(name: &str) -> ApiResult<&str> {
    let name = name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(|c| c.is_control())
    {
        return Err(ApiError::bad_request("invalid name"));
    }
    Ok(name)
}

/// Reduce an uploaded filename to a safe basename: directory components
/// are stripped, control characters removed. `None` when nothing usable
/// is left.
pub fn sanitize_upload_name(raw: &str) -> Option<String> {
    let slashed = raw.replace('\\', "/");
    let base = slashed.rsplit('/').next().unwrap_or("");
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned)
    }
}

/// Create one directory level under an existing parent.
pub async fn mkdir(root: &Root, parent: &str, name: &str) -> ApiResult<()> {
    let base = root.resolve(parent)?;
    let name = validate_name(name)?;
    let meta = fs::metadata(&base).await.map_err(ApiError::from)?;
    if !meta.is_dir() {
        return Err(ApiError::NotADirectory);
    }
    let target = base.join(name);
    fs::create_dir(&target).await.map_err(ApiError::from)?;
    info!("mkdir {}", root.virtual_path(&target));
    Ok(())
}

/// Remove a file, or a directory with all its descendants. The root
/// itself cannot be deleted.
pub async fn delete(root: &Root, path: &str) -> ApiResult<()> {
    let target = root.resolve(path)?;
    if target == root.as_path() {
        return Err(ApiError::bad_request("cannot delete the root"));
    }
    let meta = fs::symlink_metadata(&target).await.map_err(ApiError::from)?;
    if meta.is_dir() {
        fs::remove_dir_all(&target).await.map_err(ApiError::from)?;
    } else {
        fs::remove_file(&target).await.map_err(ApiError::from)?;
    }
    info!("deleted {}", root.virtual_path(&target));
    Ok(())
}

/// Rename within the same parent directory. An existing target name is a
/// conflict; neither side is touched.
pub async fn rename(root: &Root, path: &str, new_name: &str) -> ApiResult<()> {
    let source = root.resolve(path)?;
    if source == root.as_path() {
        return Err(ApiError::bad_request("cannot rename the root"));
    }
    let name = validate_name(new_name)?;
    let parent = source.parent().ok_or(ApiError::OutsideRoot)?;
    let dest = parent.join(name);
    if dest == source {
        return Ok(());
    }
    if fs::symlink_metadata(&dest).await.is_ok() {
        return Err(ApiError::NameConflict);
    }
    fs::rename(&source, &dest).await.map_err(ApiError::from)?;
    info!("renamed {} -> {}", root.virtual_path(&source), name);
    Ok(())
}

/// Relocate a file or directory to a new parent directory, preserving its
/// base name. Collisions at the destination are conflicts, never silent
/// overwrites.
pub async fn move_entry(root: &Root, source: &str, target_dir: &str) -> ApiResult<()> {
    let src = root.resolve(source)?;
    if src == root.as_path() {
        return Err(ApiError::bad_request("cannot move the root"));
    }
    let dir = root.resolve(target_dir)?;
    let dir_meta = fs::metadata(&dir).await.map_err(ApiError::from)?;
    if !dir_meta.is_dir() {
        return Err(ApiError::NotADirectory);
    }
    let name = src.file_name().ok_or(ApiError::OutsideRoot)?;
    let dest = dir.join(name);
    if dest == src {
        // Moving into its current parent is a no-op.
        return Ok(());
    }
    if src.is_dir() && dest.starts_with(&src) {
        return Err(ApiError::bad_request("cannot move a directory into itself"));
    }
    if fs::symlink_metadata(&dest).await.is_ok() {
        return Err(ApiError::NameConflict);
    }
    fs::rename(&src, &dest).await.map_err(ApiError::from)?;
    info!(
        "moved {} -> {}",
        root.virtual_path(&src),
        root.virtual_path(&dest)
    );
    Ok(())
}

/// Move each source into the destination directory, accumulating per-item
/// outcomes instead of aborting on the first failure.
pub async fn move_many(root: &Root, sources: &[String], target_dir: &str) -> ApiResult<MoveOutcome> {
    // Destination problems fail the whole request up front.
    root.resolve(target_dir)?;
    let mut outcome = MoveOutcome {
        moved: 0,
        failed: Vec::new(),
    };
    for source in sources {
        match move_entry(root, source, target_dir).await {
            Ok(()) => outcome.moved += 1,
            Err(err) => {
                warn!("move failed for {source}: {err}");
                outcome.failed.push(source.clone());
            }
        }
    }
    Ok(outcome)
}

/// Overwrite a file's entire content with UTF-8 text.
pub async fn save(root: &Root, path: &str, content: &str) -> ApiResult<()> {
    let target = root.resolve_for_create(path)?;
    if let Ok(meta) = fs::metadata(&target).await {
        if meta.is_dir() {
            return Err(ApiError::bad_request("target is a directory"));
        }
    }
    fs::write(&target, content.as_bytes())
        .await
        .map_err(ApiError::from)?;
    info!("saved {} ({} bytes)", root.virtual_path(&target), content.len());
    Ok(())
}

/// Resolve and check an upload destination directory.
pub async fn upload_dir(root: &Root, path: &str) -> ApiResult<PathBuf> {
    let dir = root.resolve(path)?;
    let meta = fs::metadata(&dir).await.map_err(ApiError::from)?;
    if !meta.is_dir() {
        return Err(ApiError::NotADirectory);
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(files: &[&str], dirs: &[&str]) -> (tempfile::TempDir, Root) {
        let tmp = tempfile::tempdir().unwrap();
        for d in dirs {
            std::fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        for f in files {
            std::fs::write(tmp.path().join(f), b"content").unwrap();
        }
        let root = Root::open(tmp.path()).unwrap();
        (tmp, root)
    }

    #[test]
    fn upload_names_are_reduced_to_basenames() {
        assert_eq!(sanitize_upload_name("evil.sh"), Some("evil.sh".into()));
        assert_eq!(sanitize_upload_name("../../evil.sh"), Some("evil.sh".into()));
        assert_eq!(
            sanitize_upload_name("..\\..\\evil.bat"),
            Some("evil.bat".into())
        );
        assert_eq!(sanitize_upload_name("dir/inner.txt"), Some("inner.txt".into()));
        assert_eq!(sanitize_upload_name("sp\0oky"), Some("spoky".into()));
        assert_eq!(sanitize_upload_name(""), None);
        assert_eq!(sanitize_upload_name(".."), None);
        assert_eq!(sanitize_upload_name("a/"), None);
    }

    #[test]
    fn names_with_separators_are_invalid() {
        assert!(validate_name("ok.txt").is_ok());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("ta\tb").is_err());
    }

    #[tokio::test]
    async fn mkdir_creates_one_level() {
        let (_tmp, root) = root_with(&[], &[]);
        mkdir(&root, "/", "fresh").await.unwrap();
        assert!(root.as_path().join("fresh").is_dir());
        // Second attempt collides.
        assert!(matches!(
            mkdir(&root, "/", "fresh").await,
            Err(ApiError::AlreadyExists)
        ));
        // Parent must already exist; only one level is created.
        assert!(matches!(
            mkdir(&root, "/ghost", "sub").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_is_recursive() {
        let (_tmp, root) = root_with(&["top/mid/leaf.txt"], &["top/mid"]);
        delete(&root, "/top").await.unwrap();
        assert!(!root.as_path().join("top").exists());
        assert!(matches!(
            delete(&root, "/top").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn root_cannot_be_deleted() {
        let (_tmp, root) = root_with(&[], &[]);
        assert!(matches!(
            delete(&root, "/").await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(root.as_path().exists());
    }

    #[tokio::test]
    async fn rename_stays_in_parent_and_respects_conflicts() {
        let (_tmp, root) = root_with(&["a.txt", "b.txt"], &[]);
        rename(&root, "/a.txt", "c.txt").await.unwrap();
        assert!(!root.as_path().join("a.txt").exists());
        assert!(root.as_path().join("c.txt").exists());

        // Conflicting target leaves both files untouched.
        assert!(matches!(
            rename(&root, "/c.txt", "b.txt").await,
            Err(ApiError::NameConflict)
        ));
        assert_eq!(
            std::fs::read(root.as_path().join("b.txt")).unwrap(),
            b"content"
        );
        assert!(root.as_path().join("c.txt").exists());

        assert!(matches!(
            rename(&root, "/c.txt", "x/y").await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn move_preserves_base_name() {
        let (_tmp, root) = root_with(&["a.txt"], &["dest"]);
        move_entry(&root, "/a.txt", "/dest").await.unwrap();
        assert!(root.as_path().join("dest/a.txt").exists());
        assert!(!root.as_path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn move_refuses_collisions_and_self_nesting() {
        let (_tmp, root) = root_with(&["a.txt", "dest/a.txt"], &["dest", "dir"]);
        assert!(matches!(
            move_entry(&root, "/a.txt", "/dest").await,
            Err(ApiError::NameConflict)
        ));
        assert!(matches!(
            move_entry(&root, "/dir", "/dir").await,
            Err(ApiError::BadRequest(_))
        ));
        // Moving a file onto a file target is not a directory move.
        assert!(matches!(
            move_entry(&root, "/a.txt", "/dest/a.txt").await,
            Err(ApiError::NotADirectory)
        ));
    }

    #[tokio::test]
    async fn move_many_reports_partial_failures() {
        let (_tmp, root) = root_with(&["a.txt", "b.txt"], &["dest"]);
        let sources = vec![
            "/a.txt".to_string(),
            "/missing.txt".to_string(),
            "/b.txt".to_string(),
        ];
        let outcome = move_many(&root, &sources, "/dest").await.unwrap();
        assert_eq!(outcome.moved, 2);
        assert_eq!(outcome.failed, ["/missing.txt"]);
        assert!(root.as_path().join("dest/a.txt").exists());
        assert!(root.as_path().join("dest/b.txt").exists());
    }

    #[tokio::test]
    async fn move_many_requires_valid_destination() {
        let (_tmp, root) = root_with(&["a.txt"], &[]);
        assert!(matches!(
            move_many(&root, &["/a.txt".to_string()], "/nope").await,
            Err(ApiError::NotFound)
        ));
        // Nothing moved.
        assert!(root.as_path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn save_overwrites_full_content() {
        let (_tmp, root) = root_with(&["note.txt"], &[]);
        save(&root, "/note.txt", "rewritten").await.unwrap();
        assert_eq!(
            std::fs::read(root.as_path().join("note.txt")).unwrap(),
            b"rewritten"
        );
        // New files may be created in existing directories.
        save(&root, "/brand-new.txt", "x").await.unwrap();
        assert!(root.as_path().join("brand-new.txt").exists());
        // But not under missing parents or outside the root.
        assert!(matches!(
            save(&root, "/ghost/new.txt", "x").await,
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            save(&root, "/../escape.txt", "x").await,
            Err(ApiError::OutsideRoot)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_delete_has_exactly_one_winner() {
        let (_tmp, root) = root_with(&["doomed/f.txt"], &["doomed"]);
        let (a, b) = tokio::join!(delete(&root, "/doomed"), delete(&root, "/doomed"));
        let oks = [a.is_ok(), b.is_ok()].iter().filter(|v| **v).count();
        assert_eq!(oks, 1, "exactly one concurrent delete may win");
        for r in [a, b] {
            if let Err(err) = r {
                assert!(matches!(err, ApiError::NotFound));
            }
        }
        assert!(!root.as_path().join("doomed").exists());
    }
}

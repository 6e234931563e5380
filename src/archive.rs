//! Download payloads: content-type guessing and zip archives for
//! directory downloads. Archives are built fully in memory before the
//! first byte is flushed; entry names are relative to the requested
//! directory, and files that fail to read are skipped so one unreadable
//! entry cannot abort the whole archive.

use std::io::{Cursor, Write};
use std::path::{Component, Path};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{ApiError, ApiResult};

/// Content type for a download or preview, guessed from the file
/// extension with a generic binary fallback.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Attachment name for a directory download.
pub fn zip_name(dir: &Path) -> String {
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "root".to_string());
    format!("{base}.zip")
}

/// Archive entry name: path relative to the requested directory, with
/// forward slashes regardless of platform.
fn entry_name(dir: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(dir).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build a deflate zip of every file under `dir`, recursively.
pub fn zip_dir(dir: &Path) -> ApiResult<Vec<u8>> {
    let buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(buffer);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for item in WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !item.file_type().is_file() {
            continue;
        }
        let data = match std::fs::read(item.path()) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let name = entry_name(dir, item.path());
        zip.start_file(name, options)
            .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;
        zip.write_all(&data).map_err(ApiError::from)?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| ApiError::Io(std::io::Error::other(e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Read;

    fn read_archive(data: Vec<u8>) -> BTreeMap<String, Vec<u8>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            out.insert(file.name().to_string(), content);
        }
        out
    }

    #[test]
    fn zip_roundtrip_preserves_tree() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pack/nested")).unwrap();
        std::fs::write(tmp.path().join("pack/top.txt"), b"top").unwrap();
        std::fs::write(tmp.path().join("pack/nested/deep.txt"), b"deep").unwrap();

        let data = zip_dir(&tmp.path().join("pack")).unwrap();
        let files = read_archive(data);

        // Entry names are relative to the requested directory.
        assert_eq!(files.len(), 2);
        assert_eq!(files["top.txt"], b"top");
        assert_eq!(files["nested/deep.txt"], b"deep");
    }

    #[test]
    fn empty_directory_yields_empty_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let data = zip_dir(tmp.path()).unwrap();
        let files = read_archive(data);
        assert!(files.is_empty());
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type(Path::new("a.txt")), "text/plain");
        assert_eq!(content_type(Path::new("img.png")), "image/png");
        assert_eq!(
            content_type(Path::new("blob.weird")),
            "application/octet-stream"
        );
    }

    #[test]
    fn zip_names() {
        assert_eq!(zip_name(Path::new("/srv/share/photos")), "photos.zip");
        assert_eq!(zip_name(Path::new("/")), "root.zip");
    }
}

//! On-demand name search across the whole tree.
//! There is no persistent index: every query walks the root and compares
//! basenames case-insensitively against the query substring. O(tree size)
//! per call, which is the accepted trade-off for a personal or small-team
//! share; entries that fail to stat are skipped like in directory listings.

use walkdir::WalkDir;

use crate::entries::{entry_for, Entry};
use crate::resolve::Root;

/// Recursively collect all files and directories whose basename contains
/// `query`, case-insensitively. An empty query matches everything.
pub fn search(root: &Root, query: &str) -> Vec<Entry> {
    let needle = query.to_lowercase();
    let mut matches: Vec<Entry> = Vec::new();
    for item in WalkDir::new(root.as_path())
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let name = item.file_name().to_string_lossy();
        if !name.to_lowercase().contains(&needle) {
            continue;
        }
        if let Some(entry) = entry_for(root, item.path()) {
            matches.push(entry);
        }
    }
    matches
}

//! File Scanner (§4.2) — grounded in `backup-agent/src/fs/walker.rs`'s
//! recursive walk, adapted from an `Vec<FileInfo>` callback shape to the
//! `{relative_path → fingerprint}` map the orchestrator reconciles against.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileFingerprint {
    pub mtime: f64,
    pub size: i64,
}

/// Walk `source_folder` recursively, recording the mtime/size of every
/// regular file whose base name matches `pattern` under glob semantics.
/// Returns an empty map if `source_folder` does not exist; files that
/// fail to stat are silently skipped.
pub fn scan(source_folder: &Path, pattern: &str) -> HashMap<String, FileFingerprint> {
    let mut out = HashMap::new();

    if !source_folder.exists() {
        return out;
    }

    let glob_pattern = match glob::Pattern::new(pattern) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Invalid glob pattern {pattern:?}: {e}");
            return out;
        }
    };

    for entry in WalkDir::new(source_folder)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = match entry.file_name().to_str() {
            Some(n) => n,
            None => continue,
        };
        if !glob_pattern.matches(file_name) {
            continue;
        }

        let relative = match entry.path().strip_prefix(source_folder) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let relative_path = relative.to_string_lossy().replace('\\', "/");

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };

        let mtime = match metadata.modified() {
            Ok(t) => match t.duration_since(UNIX_EPOCH) {
                Ok(d) => d.as_secs_f64(),
                Err(_) => continue,
            },
            Err(_) => continue,
        };

        out.insert(
            relative_path,
            FileFingerprint {
                mtime,
                size: metadata.len() as i64,
            },
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_folder_returns_empty_map() {
        let result = scan(Path::new("/nonexistent/path/for/sure"), "*");
        assert!(result.is_empty());
    }

    #[test]
    fn scan_respects_glob_pattern() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.log"), b"world").unwrap();

        let result = scan(dir.path(), "*.txt");
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("a.txt"));
    }

    #[test]
    fn scan_walks_subdirectories_with_forward_slash_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), b"x").unwrap();

        let result = scan(dir.path(), "*");
        assert!(result.contains_key("nested/c.txt"));
        assert_eq!(result["nested/c.txt"].size, 1);
    }
}

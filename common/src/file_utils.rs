//! File utility functions for path normalization and filtered directory listing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Supported TIFF file extensions.
pub const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Rewrites a path string with forward-slash separators and no repeated separators.
///
/// `C:\\data\\\\run` becomes `C:/data/run`, `/tmp//out/` becomes `/tmp/out/`.
pub fn normalize_separators(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut prev_was_separator = false;

    for ch in path.chars() {
        let is_separator = ch == '/' || ch == '\\';
        if is_separator {
            if !prev_was_separator {
                result.push('/');
            }
        } else {
            result.push(ch);
        }
        prev_was_separator = is_separator;
    }

    result
}

/// Returns paths to all files in a directory matching the given extensions,
/// sorted by file name. Extensions are matched case-insensitively.
pub fn files_with_extensions(dir: &Path, extensions: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if extensions.contains(&ext.as_str()) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(normalize_separators("C:\\data\\run"), "C:/data/run");
    }

    #[test]
    fn test_normalize_collapses_repeated_separators() {
        assert_eq!(normalize_separators("/tmp//out///x/"), "/tmp/out/x/");
        assert_eq!(normalize_separators("a\\\\/b"), "a/b");
    }

    #[test]
    fn test_normalize_leaves_clean_paths() {
        assert_eq!(normalize_separators("/data/2024/run"), "/data/2024/run");
        assert_eq!(normalize_separators(""), "");
    }

    #[test]
    fn test_files_with_extensions_sorted_and_filtered() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.tif", "a.TIFF", "c.png", "d.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.tif")).unwrap();

        let files = files_with_extensions(dir.path(), TIFF_EXTENSIONS).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.TIFF", "b.tif"]);
    }

    #[test]
    fn test_files_with_extensions_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = files_with_extensions(&dir.path().join("missing"), TIFF_EXTENSIONS);
        assert!(result.is_err());
    }
}

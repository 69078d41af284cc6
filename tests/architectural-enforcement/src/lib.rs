//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that scan the workspace sources
//! and enforce structural rules:
//! - No sleep() calls outside the scheduled-task primitive
//! - The socket library is only touched by the WebSocket transport
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

/// A line of production (non-test, non-comment) code
#[derive(Debug, Clone)]
pub struct CodeLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-indexed line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
}

/// Root of the workspace this package lives in
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .collect();
    files.sort();
    files
}

/// Production lines of every `.rs` file under `dir`
///
/// Everything from the first `#[cfg(test)]` onwards is treated as test code,
/// matching the convention of keeping `mod tests` at the bottom of a file.
pub fn production_lines(dir: &str) -> Vec<CodeLine> {
    rust_files(dir)
        .into_iter()
        .flat_map(|path| {
            let content = fs::read_to_string(&path).unwrap_or_default();
            strip_tests_and_comments(&content)
                .into_iter()
                .map(move |(number, code)| CodeLine {
                    path: path.clone(),
                    number,
                    code,
                })
        })
        .collect()
}

/// Number and code of each production line in `content`
pub fn strip_tests_and_comments(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line).trim();
            (!code.is_empty()).then(|| (idx + 1, code.to_string()))
        })
        .collect()
}

/// Path relative to the workspace root, with `/` separators
pub fn relative(path: &Path) -> String {
    let root = workspace_root();
    let rel = path.strip_prefix(&root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_skips_comments_and_tests() {
        let content = "\
fn a() {} // trailing
// whole line comment
fn b() {}
#[cfg(test)]
mod tests { fn c() {} }
";
        let lines = strip_tests_and_comments(content);
        assert_eq!(
            lines,
            vec![(1, "fn a() {}".to_string()), (3, "fn b() {}".to_string())]
        );
    }

    #[test]
    fn test_workspace_root_contains_core() {
        assert!(workspace_root().join("chatlink/core/src/lib.rs").exists());
    }
}

//! `[[path]]` inclusion markers.
//!
//! Markers are resolved relative to the directory of the including file
//! (or the working directory for text that has no file), unless absolute.
//! A single [`VisitedFiles`] set is threaded through one top-level parse so a
//! cycle anywhere in the inclusion graph is caught, not only self-inclusion.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

static INCLUSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(.*?)\]\]").expect("inclusion pattern is valid"));

/// All inclusion targets on a line, in order of appearance.
pub fn find_references(line: &str) -> Vec<&str> {
    INCLUSION_PATTERN
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn has_reference(line: &str) -> bool {
    !find_references(line).is_empty()
}

/// Join a marker target onto the including file's directory.
pub fn resolve_path(base_dir: Option<&Path>, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match base_dir {
        Some(dir) => dir.join(target),
        None => target.to_path_buf(),
    }
}

/// Canonical paths already expanded during one top-level parse.
#[derive(Debug, Default, Clone)]
pub struct VisitedFiles {
    paths: HashSet<PathBuf>,
}

impl VisitedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file. Returns false if it was already visited.
    pub fn insert(&mut self, path: &Path) -> bool {
        self.paths.insert(canonical(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(&canonical(path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// A successfully loaded inclusion target.
#[derive(Debug, Clone)]
pub struct IncludedFile {
    pub path: PathBuf,
    pub text: String,
}

/// Why an inclusion marker was skipped.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("referenced file not found: {target} ({})", .path.display())]
    NotFound { target: String, path: PathBuf },
    #[error("inclusion cycle detected: {target} ({})", .path.display())]
    Cycle { target: String, path: PathBuf },
    #[error("failed to read referenced file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolve one marker target and load it, recording it as visited.
///
/// Every error is a skip for the caller, never a failure of the surrounding
/// parse.
pub fn load_reference(
    base_dir: Option<&Path>,
    target: &str,
    visited: &mut VisitedFiles,
) -> Result<IncludedFile, ReferenceError> {
    let path = resolve_path(base_dir, target);

    if !path.is_file() {
        return Err(ReferenceError::NotFound {
            target: target.to_string(),
            path,
        });
    }

    if !visited.insert(&path) {
        return Err(ReferenceError::Cycle {
            target: target.to_string(),
            path,
        });
    }

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            log::debug!("[PARSER] Including {}", path.display());
            Ok(IncludedFile { path, text })
        }
        Err(source) => Err(ReferenceError::Unreadable { path, source }),
    }
}

/// Every file reachable from `root` through inclusion markers, `root` first.
///
/// Used to decide which files to watch. Missing targets are logged and left
/// out; each file is visited once, so cyclic graphs terminate.
pub fn collect_reachable_files(root: &Path) -> Vec<PathBuf> {
    let mut visited = VisitedFiles::new();
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        if !visited.insert(&path) {
            continue;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[WATCH] Cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        let base_dir = path.parent().map(Path::to_path_buf);
        files.push(canonical(&path));

        let mut children = Vec::new();
        for line in text.lines() {
            for target in find_references(line) {
                let child = resolve_path(base_dir.as_deref(), target);
                if child.is_file() {
                    children.push(child);
                } else {
                    log::warn!("[WATCH] Referenced file does not exist: {}", target);
                }
            }
        }
        // reversed so the stack pops them in document order
        pending.extend(children.into_iter().rev());
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_references_multiple_per_line() {
        let line = "see [[a.md]] and [[ sub/b.md ]] but not [[]]";
        assert_eq!(find_references(line), vec!["a.md", "sub/b.md"]);
        assert!(!has_reference("plain [link](x.md)"));
    }

    #[test]
    fn test_resolve_path_relative_and_absolute() {
        let base = Path::new("/docs/notes");
        assert_eq!(
            resolve_path(Some(base), "git.md"),
            PathBuf::from("/docs/notes/git.md")
        );
        assert_eq!(
            resolve_path(Some(base), "/etc/cmds.md"),
            PathBuf::from("/etc/cmds.md")
        );
        assert_eq!(resolve_path(None, "git.md"), PathBuf::from("git.md"));
    }

    #[test]
    fn test_load_reference_detects_revisit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "ls").unwrap();

        let mut visited = VisitedFiles::new();
        let first = load_reference(Some(dir.path()), "a.md", &mut visited).unwrap();
        assert_eq!(first.text, "ls");

        // same file through a different spelling is still a revisit
        let again = load_reference(Some(dir.path()), "./a.md", &mut visited);
        assert!(matches!(again, Err(ReferenceError::Cycle { .. })));
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn test_load_reference_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut visited = VisitedFiles::new();
        let err = load_reference(Some(dir.path()), "nope.md", &mut visited).unwrap_err();
        assert!(matches!(err, ReferenceError::NotFound { ref target, .. } if target == "nope.md"));
        assert!(visited.is_empty());
    }

    #[test]
    fn test_collect_reachable_files_handles_cycles() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("main.md"), "[[sub/a.md]]\n[[missing.md]]\n").unwrap();
        std::fs::write(dir.path().join("sub/a.md"), "[[b.md]]").unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "[[../main.md]]").unwrap();

        let files = collect_reachable_files(&dir.path().join("main.md"));
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["main.md", "a.md", "b.md"]);
    }
}

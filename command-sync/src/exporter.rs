//! Export of commands to the clipboard manager.
//!
//! The sync cycle only sees the [`Exporter`] trait. [`CopyQExporter`] drives
//! the CopyQ command line client; [`DryRunExporter`] only logs.

use std::path::{Path, PathBuf};
use std::process::Command;

/// MIME type CopyQ uses for item tags
const COPYQ_TAGS_MIME: &str = "application/x-copyq-tags";

/// Best-effort sink for exported commands.
pub trait Exporter: Send + Sync {
    /// Write `content` into `tab` with comma-joined `tags`.
    /// Returns true only if the content was actually written.
    fn export(&self, content: &str, tab: &str, tags: &str) -> bool;

    /// True for sinks that write nothing; the sync cycle then also leaves
    /// the store alone so a later real run still exports.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Exports through the `copyq` CLI.
pub struct CopyQExporter {
    binary: PathBuf,
    check_duplicates: bool,
}

impl CopyQExporter {
    /// `binary` may be a bare program name, looked up on `PATH`, or a path.
    pub fn new(binary: &str, check_duplicates: bool) -> Self {
        Self {
            binary: resolve_binary(binary),
            check_duplicates,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Whether `content` is already stored in `tab`.
    pub fn content_exists(&self, content: &str, tab: &str) -> Result<bool, String> {
        let output = Command::new(&self.binary)
            .args(["tab", tab, "eval", exists_script(content).as_str()])
            .output()
            .map_err(|e| format!("Failed to run {}: {}", self.binary.display(), e))?;

        if !output.status.success() {
            return Err(format!(
                "copyq eval exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .trim()
            .eq_ignore_ascii_case("true"))
    }

    /// Newest clipboard item.
    pub fn read_latest(&self) -> Result<String, String> {
        let output = Command::new(&self.binary)
            .args(["read", "0"])
            .output()
            .map_err(|e| format!("Failed to run {}: {}", self.binary.display(), e))?;

        if !output.status.success() {
            return Err(format!(
                "copyq read exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn write(&self, content: &str, tab: &str, tags: &str) -> Result<(), String> {
        let status = Command::new(&self.binary)
            .args([
                "tab",
                tab,
                "write",
                "text/plain",
                content,
                COPYQ_TAGS_MIME,
                tags,
            ])
            .status()
            .map_err(|e| format!("Failed to run {}: {}", self.binary.display(), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("copyq write exited with {}", status))
        }
    }
}

impl Exporter for CopyQExporter {
    fn export(&self, content: &str, tab: &str, tags: &str) -> bool {
        if self.check_duplicates {
            match self.content_exists(content, tab) {
                Ok(true) => {
                    log::info!("[EXPORT] Already present in tab '{}', skipping", tab);
                    return false;
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("[EXPORT] Duplicate check failed: {}", e);
                    return false;
                }
            }
        }

        match self.write(content, tab, tags) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[EXPORT] {}", e);
                false
            }
        }
    }
}

/// Logs what would be exported and reports nothing as written.
#[derive(Debug, Default)]
pub struct DryRunExporter;

impl Exporter for DryRunExporter {
    fn export(&self, content: &str, tab: &str, tags: &str) -> bool {
        log::info!(
            "[EXPORT] (dry run) tab '{}' tags '{}': {}",
            tab,
            tags,
            content
        );
        false
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

fn resolve_binary(binary: &str) -> PathBuf {
    let path = Path::new(binary);
    if path.components().count() > 1 || path.is_absolute() {
        return path.to_path_buf();
    }
    match which::which(binary) {
        Ok(found) => found,
        Err(e) => {
            log::warn!(
                "[EXPORT] '{}' not found on PATH ({}), exports will fail",
                binary,
                e
            );
            path.to_path_buf()
        }
    }
}

/// CopyQ script printing whether any item in the current tab equals `content`.
/// The content is embedded as a JSON string literal, which is valid script.
fn exists_script(content: &str) -> String {
    let literal = serde_json::to_string(content).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "var content = {}; var exists = false; \
         for (var i = 0; i < size(); ++i) {{ \
         if (str(read(i)) === content) {{ exists = true; break; }} \
         }} \
         print(exists);",
        literal
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exists_script_escapes_content() {
        let script = exists_script(r#"echo "a\b""#);
        assert!(script.starts_with(r#"var content = "echo \"a\\b\"";"#));
        assert!(script.ends_with("print(exists);"));
    }

    #[test]
    fn test_resolve_binary_keeps_explicit_paths() {
        assert_eq!(
            resolve_binary("/opt/copyq/copyq"),
            PathBuf::from("/opt/copyq/copyq")
        );
        assert_eq!(resolve_binary("bin/copyq"), PathBuf::from("bin/copyq"));
    }

    #[test]
    fn test_missing_binary_export_fails_softly() {
        let exporter = CopyQExporter::new("/nonexistent/dir/copyq", false);
        assert!(!exporter.export("ls", "commands", "cmd"));
        assert!(exporter.read_latest().is_err());
    }

    #[test]
    fn test_dry_run_never_reports_written() {
        assert!(!DryRunExporter.export("ls", "commands", "cmd"));
        assert!(DryRunExporter.is_dry_run());
        assert!(!CopyQExporter::new("/nonexistent/dir/copyq", false).is_dry_run());
    }
}

//! Configuration: built-in defaults, then an optional `command-sync.toml`,
//! then `COMMAND_SYNC_*` environment variables. CLI flags are applied last
//! by the binary.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "command-sync.toml";
pub const DEFAULT_BASE_TAG: &str = "commands";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Primary markdown document
    pub markdown_path: PathBuf,
    /// JSON command store
    pub store_path: PathBuf,
    /// CopyQ executable, bare name or path
    pub copyq_path: String,
    /// CopyQ tab that receives exported commands
    pub tab: String,
    /// Tag applied when a document gives no other tag
    pub base_tag: String,
    pub check_duplicates: bool,
    pub export_enabled: bool,
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            markdown_path: PathBuf::from("data/commands.md"),
            store_path: PathBuf::from("data/commands_store.json"),
            copyq_path: "copyq".to_string(),
            tab: "commands".to_string(),
            base_tag: DEFAULT_BASE_TAG.to_string(),
            check_duplicates: false,
            export_enabled: true,
            debounce_ms: 500,
        }
    }
}

/// On-disk layout of `command-sync.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    paths: PathsSection,
    export: ExportSection,
    parser: ParserSection,
    watch: WatchSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    markdown: Option<PathBuf>,
    store: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportSection {
    copyq: Option<String>,
    tab: Option<String>,
    check_duplicates: Option<bool>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParserSection {
    base_tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WatchSection {
    debounce_ms: Option<u64>,
}

impl Config {
    /// Load the layered configuration.
    ///
    /// `config_file` must exist when given. Otherwise `COMMAND_SYNC_CONFIG`
    /// is consulted, then `command-sync.toml` in the working directory if
    /// present.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let file = config_file_path(config_file, |key| env::var(key).ok());
        if let Some(path) = file {
            config.apply_file(&path)?;
            log::debug!("[CONFIG] Loaded {}", path.display());
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay a TOML file. Relative paths in it are taken relative to the
    /// file's own directory.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.apply_toml(&raw, base_dir).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_toml(&mut self, raw: &str, base_dir: &Path) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(raw)?;

        if let Some(p) = file.paths.markdown {
            self.markdown_path = base_dir.join(p);
        }
        if let Some(p) = file.paths.store {
            self.store_path = base_dir.join(p);
        }
        if let Some(v) = file.export.copyq {
            self.copyq_path = v;
        }
        if let Some(v) = file.export.tab {
            self.tab = v;
        }
        if let Some(v) = file.export.check_duplicates {
            self.check_duplicates = v;
        }
        if let Some(v) = file.export.enabled {
            self.export_enabled = v;
        }
        if let Some(v) = file.parser.base_tag {
            self.base_tag = v;
        }
        if let Some(v) = file.watch.debounce_ms {
            self.debounce_ms = v;
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COMMAND_SYNC_MARKDOWN") {
            self.markdown_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("COMMAND_SYNC_STORE") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("COMMAND_SYNC_COPYQ") {
            self.copyq_path = v;
        }
        if let Some(v) = lookup("COMMAND_SYNC_TAB") {
            self.tab = v;
        }
        if let Some(v) = lookup("COMMAND_SYNC_BASE_TAG") {
            self.base_tag = v;
        }
        if let Some(v) = lookup("COMMAND_SYNC_CHECK_DUPLICATES") {
            self.check_duplicates = parse_bool("COMMAND_SYNC_CHECK_DUPLICATES", &v)?;
        }
        if let Some(v) = lookup("COMMAND_SYNC_EXPORT") {
            self.export_enabled = parse_bool("COMMAND_SYNC_EXPORT", &v)?;
        }
        if let Some(v) = lookup("COMMAND_SYNC_DEBOUNCE_MS") {
            self.debounce_ms = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "COMMAND_SYNC_DEBOUNCE_MS".to_string(),
                value: v.clone(),
            })?;
        }
        Ok(())
    }
}

/// The config file to read: the explicit path, else `COMMAND_SYNC_CONFIG`,
/// else `command-sync.toml` if it exists. This is the only place the
/// variable is read.
fn config_file_path<F>(explicit: Option<&Path>, lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = lookup("COMMAND_SYNC_CONFIG").filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.exists().then_some(default)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_overrides_defaults_and_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("command-sync.toml");
        std::fs::write(
            &path,
            r#"
[paths]
markdown = "notes/commands.md"
store = "/var/lib/store.json"

[export]
tab = "shell"
check_duplicates = true

[parser]
base_tag = "命令"
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(&path).unwrap();
        assert_eq!(config.markdown_path, dir.path().join("notes/commands.md"));
        assert_eq!(config.store_path, PathBuf::from("/var/lib/store.json"));
        assert_eq!(config.tab, "shell");
        assert!(config.check_duplicates);
        assert_eq!(config.base_tag, "命令");
        assert_eq!(config.copyq_path, "copyq");
        assert_eq!(config.debounce_ms, 500);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.tab = "from-file".to_string();
        config
            .apply_env(env_of(&[
                ("COMMAND_SYNC_TAB", "from-env"),
                ("COMMAND_SYNC_EXPORT", "off"),
                ("COMMAND_SYNC_DEBOUNCE_MS", "1200"),
            ]))
            .unwrap();
        assert_eq!(config.tab, "from-env");
        assert!(!config.export_enabled);
        assert_eq!(config.debounce_ms, 1200);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env_of(&[("COMMAND_SYNC_CHECK_DUPLICATES", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[paths\nmarkdown = ").unwrap();
        let err = Config::default().apply_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_config_file_selection_order() {
        let env = env_of(&[("COMMAND_SYNC_CONFIG", "/etc/command-sync.toml")]);
        assert_eq!(
            config_file_path(Some(Path::new("cli.toml")), &env),
            Some(PathBuf::from("cli.toml"))
        );
        assert_eq!(
            config_file_path(None, &env),
            Some(PathBuf::from("/etc/command-sync.toml"))
        );
    }
}

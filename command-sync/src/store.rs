//! Persisted command store.
//!
//! The store is a JSON array of [`CommandRecord`]s. It is read whole at the
//! start of a sync cycle and written back whole at the end; the write goes to
//! a sibling temporary file that is renamed over the existing one so readers
//! never observe a partial file.

use command_sync_types::CommandRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read command store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("command store {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write command store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize command store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ordered records with unique `command` keys.
#[derive(Debug, Clone, Default)]
pub struct CommandStore {
    records: Vec<CommandRecord>,
    index: HashMap<String, usize>,
}

impl CommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted records. A command listed twice is
    /// collapsed into its first occurrence with the tags of both.
    pub fn from_records(records: Vec<CommandRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            match store.index.get(&record.command) {
                Some(&i) => {
                    log::warn!(
                        "[STORE] Duplicate command in store, merging tags: {}",
                        record.command
                    );
                    store.records[i].tags.extend(record.tags.iter());
                }
                None => {
                    store.insert(record);
                }
            }
        }
        store
    }

    pub fn get(&self, command: &str) -> Option<&CommandRecord> {
        self.index.get(command).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, command: &str) -> Option<&mut CommandRecord> {
        match self.index.get(command) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    pub fn contains(&self, command: &str) -> bool {
        self.index.contains_key(command)
    }

    /// Append a record. Returns false, leaving the store untouched, if the
    /// command is already present.
    pub fn insert(&mut self, record: CommandRecord) -> bool {
        if self.contains(&record.command) {
            return false;
        }
        self.index.insert(record.command.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Stamp a successful export. Returns false for unknown commands.
    pub fn mark_exported(&mut self, command: &str, at: &str) -> bool {
        match self.get_mut(command) {
            Some(record) => {
                record.last_exported = Some(at.to_string());
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> &[CommandRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CommandRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the store. A missing file is an empty store; unparsable content is
/// an error so existing data is never silently discarded.
pub fn load_store(path: &Path) -> Result<CommandStore, StoreError> {
    if !path.exists() {
        log::info!(
            "[STORE] No command store at {}, starting empty",
            path.display()
        );
        return Ok(CommandStore::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if raw.trim().is_empty() {
        log::debug!("[STORE] Command store {} is empty", path.display());
        return Ok(CommandStore::new());
    }

    let records: Vec<CommandRecord> =
        serde_json::from_str(&raw).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    log::debug!(
        "[STORE] Loaded {} commands from {}",
        records.len(),
        path.display()
    );
    Ok(CommandStore::from_records(records))
}

/// Write the whole store, replacing the file atomically.
pub fn save_store(path: &Path, store: &CommandStore) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(store.records())?;

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp_path = temp_path_for(path);
    std::fs::write(&tmp_path, json).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(write_err(e));
    }

    log::debug!(
        "[STORE] Saved {} commands to {}",
        store.len(),
        path.display()
    );
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "commands_store.json".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

//! One sync cycle: parse the document tree, reconcile against the store,
//! export what changed, persist.
//!
//! A cycle owns the store from load to save. Callers must not run two cycles
//! against the same store concurrently; watch mode serializes them.

use crate::config::Config;
use crate::exporter::Exporter;
use crate::markdown::parse_document;
use crate::reconcile::reconcile;
use crate::store::{load_store, save_store, CommandStore, StoreError};
use command_sync_types::{CommandRecord, SyncSummary};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot read markdown document {}: {source}", .path.display())]
    DocumentUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Syncer {
    markdown_path: PathBuf,
    store_path: PathBuf,
    tab: String,
    base_tag: String,
    exporter: Box<dyn Exporter>,
}

impl Syncer {
    pub fn new(config: &Config, exporter: Box<dyn Exporter>) -> Self {
        Self {
            markdown_path: config.markdown_path.clone(),
            store_path: config.store_path.clone(),
            tab: config.tab.clone(),
            base_tag: config.base_tag.clone(),
            exporter,
        }
    }

    pub fn markdown_path(&self) -> &Path {
        &self.markdown_path
    }

    /// Full cycle including export of new and re-tagged commands.
    pub fn run_once(&self) -> Result<SyncSummary, SyncError> {
        self.run(true)
    }

    /// Update the store from the document without exporting anything.
    pub fn import_only(&self) -> Result<SyncSummary, SyncError> {
        self.run(false)
    }

    fn run(&self, export: bool) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        log::info!("[SYNC] Syncing {}", self.markdown_path.display());

        let items = parse_document(&self.markdown_path, &self.base_tag).map_err(|source| {
            SyncError::DocumentUnreadable {
                path: self.markdown_path.clone(),
                source,
            }
        })?;

        let mut store = load_store(&self.store_path)?;
        let now = chrono::Utc::now().to_rfc3339();
        let outcome = reconcile(&items, &mut store, &now);

        // a dry run must not persist records it never exported
        let dry_run = export && self.exporter.is_dry_run();
        let mut summary = SyncSummary {
            new: outcome.new_records.len(),
            updated: outcome.updated_records.len(),
            unchanged: outcome.unchanged,
            dry_run,
            ..SyncSummary::default()
        };

        let pending = outcome
            .new_records
            .iter()
            .chain(outcome.updated_records.iter());
        if dry_run {
            for record in pending {
                self.exporter
                    .export(&record.command, &self.tab, &record.tags.join(","));
            }
        } else if export {
            for record in pending {
                if self.export_record(record, &mut store) {
                    summary.exported += 1;
                } else {
                    summary.export_failures += 1;
                }
            }
        }

        if dry_run {
            log::info!("[SYNC] Dry run, store not written");
        } else if outcome.has_changes() {
            save_store(&self.store_path, &store)?;
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        if summary.has_changes() {
            log::info!(
                "[SYNC] Done: {} new, {} updated, {} unchanged, {} exported, {} export failures ({} ms)",
                summary.new,
                summary.updated,
                summary.unchanged,
                summary.exported,
                summary.export_failures,
                summary.elapsed_ms
            );
        } else {
            log::info!("[SYNC] Done: no new commands or tags");
        }
        Ok(summary)
    }

    fn export_record(&self, record: &CommandRecord, store: &mut CommandStore) -> bool {
        let tags = record.tags.join(",");
        if self.exporter.export(&record.command, &self.tab, &tags) {
            let at = chrono::Utc::now().to_rfc3339();
            store.mark_exported(&record.command, &at);
            log::info!("[EXPORT] Exported: {} | tags: {}", record.command, tags);
            true
        } else {
            log::warn!("[EXPORT] Not exported: {}", record.command);
            false
        }
    }
}

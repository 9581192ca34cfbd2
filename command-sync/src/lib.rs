//! Keep a clipboard manager in sync with a hand-written markdown command list.
//!
//! The pipeline for one cycle is
//! markdown tree → [`markdown`] items → [`reconcile`] against the [`store`]
//! → [`exporter`] → persisted store. [`sync::Syncer`] runs a cycle;
//! [`watcher`] re-runs it when any file in the document tree changes.

pub mod config;
pub mod exporter;
pub mod markdown;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod watcher;

pub use command_sync_types::{CommandRecord, ParsedItem, SyncSummary, TagSet};
pub use config::Config;
pub use sync::{SyncError, Syncer};

//! command-sync — keeps CopyQ in sync with a markdown command list.
//!
//! `command-sync sync` runs one cycle, `command-sync watch` keeps running and
//! re-syncs whenever the document or one of its included files changes.

use clap::{Parser, Subcommand};
use command_sync::exporter::{CopyQExporter, DryRunExporter, Exporter};
use command_sync::markdown::{collect_reachable_files, parse_document};
use command_sync::{watcher, Config, Syncer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "command-sync", version, about = "Sync tagged commands from markdown into CopyQ")]
struct Args {
    /// Path to a command-sync.toml configuration file (default:
    /// $COMMAND_SYNC_CONFIG, then ./command-sync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Markdown document to read (overrides config)
    #[arg(short, long, global = true)]
    markdown: Option<PathBuf>,

    /// Command store JSON file (overrides config)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync cycle
    Sync {
        /// Log exports instead of writing to CopyQ
        #[arg(long)]
        dry_run: bool,
    },
    /// Sync, then re-sync whenever the document tree changes
    Watch {
        /// Log exports instead of writing to CopyQ
        #[arg(long)]
        dry_run: bool,
    },
    /// Update the store from the document without exporting
    Import,
    /// Print the commands extracted from the document
    Parse {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the document and every file it includes
    Refs,
    /// Print the newest CopyQ clipboard item
    Clipboard,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("[CONFIG] {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(markdown) = args.markdown {
        config.markdown_path = markdown;
    }
    if let Some(store) = args.store {
        config.store_path = store;
    }

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<(), String> {
    match command {
        Command::Sync { dry_run } => {
            let syncer = Syncer::new(&config, exporter_for(&config, dry_run));
            let summary = syncer.run_once().map_err(|e| e.to_string())?;
            println!(
                "Sync finished: {} new, {} updated, {} unchanged.",
                summary.new, summary.updated, summary.unchanged
            );
            if summary.dry_run {
                println!("Dry run: nothing exported, store not written.");
            } else if summary.export_failures > 0 {
                println!("{} commands were not exported, see log.", summary.export_failures);
            }
            Ok(())
        }
        Command::Watch { dry_run } => {
            let syncer = Arc::new(Syncer::new(&config, exporter_for(&config, dry_run)));
            watcher::run_watch(syncer, Duration::from_millis(config.debounce_ms)).await
        }
        Command::Import => {
            let syncer = Syncer::new(&config, Box::new(DryRunExporter));
            let summary = syncer.import_only().map_err(|e| e.to_string())?;
            if summary.has_changes() {
                println!(
                    "Imported {} new commands, {} with new tags.",
                    summary.new, summary.updated
                );
            } else {
                println!("No new commands to import.");
            }
            Ok(())
        }
        Command::Parse { json } => {
            let items = parse_document(&config.markdown_path, &config.base_tag).map_err(|e| {
                format!("Cannot read {}: {}", config.markdown_path.display(), e)
            })?;
            if json {
                let out = serde_json::to_string_pretty(&items)
                    .map_err(|e| format!("Failed to serialize items: {}", e))?;
                println!("{}", out);
            } else {
                for item in &items {
                    println!("[{}] {}", item.tags, item.content);
                }
            }
            Ok(())
        }
        Command::Refs => {
            if !config.markdown_path.is_file() {
                return Err(format!(
                    "Markdown document not found: {}",
                    config.markdown_path.display()
                ));
            }
            for path in collect_reachable_files(&config.markdown_path) {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Clipboard => {
            let copyq = CopyQExporter::new(&config.copyq_path, false);
            let content = copyq.read_latest()?;
            println!("{}", content);
            Ok(())
        }
    }
}

fn exporter_for(config: &Config, dry_run: bool) -> Box<dyn Exporter> {
    if dry_run || !config.export_enabled {
        log::info!("[EXPORT] Export disabled, running dry");
        Box::new(DryRunExporter)
    } else {
        Box::new(CopyQExporter::new(
            &config.copyq_path,
            config.check_duplicates,
        ))
    }
}

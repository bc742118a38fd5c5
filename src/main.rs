use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use partfinder::config::IndexerConfig;
use partfinder::data::{migrations, repository};
use partfinder::services::indexing_service::{IndexObserver, Indexer};
use partfinder::services::ocr_service::TesseractBackend;
use partfinder::services::{query_service, scanner};

#[derive(Parser)]
#[command(name = "partfinder", about = "Index inventory images with OCR and search them by product code", version)]
struct Cli {
    /// Index database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// OCR every new or changed image under a folder into the index
    Index {
        folder: PathBuf,

        /// Worker-pool size override (capped at 32)
        #[arg(long, env = "OCR_WORKERS")]
        workers: Option<usize>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search a folder's index; prints matching image paths
    Search {
        folder: PathBuf,

        /// Product-code query; omit to list everything indexed
        query: Option<String>,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Show the stored index record for one image
    Show {
        file: PathBuf,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}

struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Ok(Self { bar })
    }
}

impl IndexObserver for ProgressBarObserver {
    fn on_progress(&self, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
    }

    fn on_status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "partfinder")
        .context("cannot resolve a data directory for the index database")?;
    Ok(dirs.data_local_dir().join("partfinder.db"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };

    match cli.command {
        Command::Index {
            folder,
            workers,
            json,
        } => {
            let backend = TesseractBackend::resolve()?;
            let config = IndexerConfig {
                max_workers: workers,
                ..IndexerConfig::from_env()
            };
            let indexer = Indexer::with_backend(db_path, Arc::new(backend), config);

            let observer = ProgressBarObserver::new()?;
            let summary = indexer
                .index_folder(&folder, &observer)
                .with_context(|| format!("indexing {} failed", folder.display()))?;
            observer.bar.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                let outcome = if summary.cancelled { "cancelled" } else { "complete" };
                println!(
                    "Index {outcome}. OCR: {}, skipped: {}, failed: {}",
                    summary.processed, summary.skipped, summary.failed
                );
            }
        }
        Command::Search {
            folder,
            query,
            json,
        } => {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = rusqlite::Connection::open(&db_path)
                .with_context(|| format!("cannot open index database {}", db_path.display()))?;
            migrations::run_migrations(&conn).context("cannot prepare index database")?;

            let folder_key = scanner::resolve_folder(&folder).to_string_lossy().to_string();
            // A read failure yields no results rather than aborting the session.
            let hits = match query_service::query(&conn, &folder_key, query.as_deref().unwrap_or(""))
            {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::error!("search failed: {err}");
                    Vec::new()
                }
            };

            if json {
                println!("{}", serde_json::to_string(&hits)?);
            } else {
                for path in &hits {
                    println!("{path}");
                }
                eprintln!("{} match(es)", hits.len());
            }
        }
        Command::Show { file, json } => {
            let conn = rusqlite::Connection::open(&db_path)
                .with_context(|| format!("cannot open index database {}", db_path.display()))?;
            migrations::run_migrations(&conn).context("cannot prepare index database")?;

            let key = scanner::resolve_folder(&file).to_string_lossy().to_string();
            let record = repository::get_record(&conn, &key)?
                .with_context(|| format!("{key} is not in the index"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("file:       {}", record.file_path);
                println!("indexed at: {}", record.indexed_at);
                match &record.ocr_error {
                    Some(err) => println!("ocr error:  {err}"),
                    None if record.ocr_text.trim().is_empty() => {
                        println!("ocr text:   [no text detected]")
                    }
                    None => println!("ocr text:\n{}", record.ocr_text.trim()),
                }
            }
        }
    }

    Ok(())
}

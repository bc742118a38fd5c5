use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::IndexerConfig;
use crate::data::{migrations, repository};
use crate::error::AppError;
use crate::models::ImageRecord;
use crate::services::change_detector::{self, PendingImage};
use crate::services::normalize;
use crate::services::ocr_service::{OcrBackend, OcrExtractor, TextExtractor};
use crate::services::scanner;
use crate::state::{IndexerSession, IndexerState};

const COMMIT_BATCH: usize = 25;

/// Receives progress and status events from a run. Events may arrive from
/// the indexing thread; implementations marshal to their own context. At
/// least the final summary event is always delivered on a successful run.
pub trait IndexObserver: Send + Sync {
    fn on_progress(&self, _current: usize, _total: usize) {}
    fn on_status(&self, _message: &str) {}
}

pub struct NullObserver;

impl IndexObserver for NullObserver {}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct IndexSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

struct TaskOutcome {
    item: PendingImage,
    ocr_text: String,
    ocr_error: Option<String>,
}

pub struct Indexer {
    db_path: PathBuf,
    extractor: Arc<dyn TextExtractor>,
    config: IndexerConfig,
    session: IndexerSession,
}

impl Indexer {
    pub fn new(
        db_path: impl Into<PathBuf>,
        extractor: Arc<dyn TextExtractor>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            extractor,
            config,
            session: IndexerSession::new(),
        }
    }

    /// Builds the two-pass OCR extractor around `backend` using the
    /// configured retry policy.
    pub fn with_backend(
        db_path: impl Into<PathBuf>,
        backend: Arc<dyn OcrBackend>,
        config: IndexerConfig,
    ) -> Self {
        let extractor = Arc::new(OcrExtractor::new(
            backend,
            config.ocr_retries,
            config.ocr_retry_backoff,
        ));
        Self::new(db_path, extractor, config)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn state(&self) -> IndexerState {
        self.session.state()
    }

    pub fn cancel(&self) {
        self.session.request_cancel();
    }

    /// Returns a finished session to Idle; a no-op while a run is active.
    pub fn reset(&self) {
        self.session.reset();
    }

    /// Shared flag checked before each task dispatch; setting it stops the
    /// run after in-flight extractions finish. Committed upserts are kept.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.session.cancel_handle()
    }

    /// Scans `folder`, re-extracts text for new or changed images on a
    /// bounded worker pool, and upserts results. At most one run per
    /// `Indexer` at a time; a concurrent call is rejected, not queued.
    pub fn index_folder(
        &self,
        folder: &Path,
        observer: &dyn IndexObserver,
    ) -> Result<IndexSummary, AppError> {
        self.session.try_begin()?;
        let result = self.run(folder, observer);
        self.session.finish(result.is_ok());
        result
    }

    fn open_connection(&self) -> Result<Connection, AppError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(conn)
    }

    fn run(&self, folder: &Path, observer: &dyn IndexObserver) -> Result<IndexSummary, AppError> {
        let folder = scanner::resolve_folder(folder);
        let folder_key = folder.to_string_lossy().to_string();

        let conn = self.open_connection()?;

        let candidates = scanner::list_images(&folder);
        let total = candidates.len();
        tracing::debug!("found {total} candidate image(s) under {folder_key}");
        observer.on_status(&format!("Found {total} image(s) in {folder_key}."));
        observer.on_progress(0, total);

        let stored = repository::records_for_folder(&conn, &folder_key)?;
        let parts = change_detector::partition(&candidates, &stored);

        for backfill in &parts.backfills {
            repository::update_search_text(&conn, &backfill.file_path, &backfill.search_text)?;
        }
        if !parts.backfills.is_empty() {
            tracing::debug!("backfilled {} search key(s)", parts.backfills.len());
        }

        self.session.mark_indexing();

        let mut summary = IndexSummary {
            processed: 0,
            skipped: parts.skipped,
            failed: parts.failed,
            cancelled: false,
        };

        let workers = self.config.resolved_workers();
        observer.on_status(&format!(
            "Indexing {} changed image(s) with {} worker(s). Skipped unchanged: {}",
            parts.process.len(),
            workers,
            parts.skipped
        ));
        observer.on_progress(summary.skipped, total);

        if !parts.process.is_empty() && !self.session.is_cancelled() {
            self.run_pool(
                &conn,
                &folder_key,
                parts.process,
                workers,
                total,
                &mut summary,
                observer,
            )?;
        }

        if self.session.is_cancelled() {
            summary.cancelled = true;
            observer.on_status(&format!(
                "Indexing cancelled. OCR: {}, skipped: {}, failed: {}",
                summary.processed, summary.skipped, summary.failed
            ));
        } else {
            observer.on_status(&format!(
                "Index complete. OCR: {}, skipped: {}, failed: {}",
                summary.processed, summary.skipped, summary.failed
            ));
            observer.on_progress(total, total);
        }

        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_pool(
        &self,
        conn: &Connection,
        folder_key: &str,
        pending: Vec<PendingImage>,
        workers: usize,
        total: usize,
        summary: &mut IndexSummary,
        observer: &dyn IndexObserver,
    ) -> Result<(), AppError> {
        let mut items = pending;
        items.reverse(); // workers pop from the back: dispatch in scan order
        let queue = Arc::new(Mutex::new(items));
        let cancel = self.session.cancel_handle();
        let (tx, rx) = mpsc::channel::<TaskOutcome>();

        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for n in 0..workers {
            let queue = Arc::clone(&queue);
            let cancel = Arc::clone(&cancel);
            let tx = tx.clone();
            let extractor = Arc::clone(&self.extractor);

            let spawned = std::thread::Builder::new()
                .name(format!("ocr-worker-{n}"))
                .spawn(move || loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let item = {
                        let mut queue = queue.lock().unwrap_or_else(|p| p.into_inner());
                        queue.pop()
                    };
                    let Some(item) = item else { break };

                    let (ocr_text, ocr_error) = extractor.extract(&item.path);
                    if tx
                        .send(TaskOutcome {
                            item,
                            ocr_text,
                            ocr_error,
                        })
                        .is_err()
                    {
                        break;
                    }
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawn_error = Some(AppError::Io(err));
                    break;
                }
            }
        }
        drop(tx);

        let result = match spawn_error {
            Some(err) => Err(err),
            None => self.collect(conn, folder_key, &rx, total, summary, observer),
        };

        // Stop the pool before surfacing any error so no worker outlives
        // the run; workers notice the dead channel or the cancel flag.
        if result.is_err() {
            cancel.store(true, Ordering::Relaxed);
        }
        drop(rx);
        for handle in handles {
            let _ = handle.join();
        }

        result
    }

    fn collect(
        &self,
        conn: &Connection,
        folder_key: &str,
        rx: &mpsc::Receiver<TaskOutcome>,
        total: usize,
        summary: &mut IndexSummary,
        observer: &dyn IndexObserver,
    ) -> Result<(), AppError> {
        conn.execute_batch("BEGIN")?;

        let mut done = 0usize;
        for outcome in rx.iter() {
            let search_text =
                normalize::build_search_text(&outcome.item.file_name, &outcome.ocr_text);
            let record = ImageRecord {
                file_path: outcome.item.path.to_string_lossy().to_string(),
                folder_path: folder_key.to_string(),
                file_name: outcome.item.file_name,
                file_mtime: outcome.item.file_mtime,
                file_size: outcome.item.file_size,
                ocr_text: outcome.ocr_text,
                search_text,
                ocr_error: outcome.ocr_error,
                indexed_at: chrono::Utc::now().to_rfc3339(),
            };
            repository::upsert_record(conn, &record)?;

            if record.ocr_error.is_some() {
                summary.failed += 1;
            }
            summary.processed += 1;
            done += 1;
            if done % COMMIT_BATCH == 0 {
                conn.execute_batch("COMMIT")?;
                conn.execute_batch("BEGIN")?;
            }

            observer.on_progress(summary.skipped + done, total);
            observer.on_status(&format!(
                "Indexed ({}/{}) - latest: {} (failed: {})",
                summary.skipped + done,
                total,
                record.file_name,
                summary.failed
            ));
        }

        conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

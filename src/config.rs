use std::time::Duration;

const WORKER_OVERRIDE_ENV: &str = "OCR_WORKERS";
const RETRIES_ENV: &str = "OCR_RETRIES";
const RETRY_BACKOFF_ENV: &str = "OCR_RETRY_BACKOFF_MS";

const MAX_WORKER_OVERRIDE: usize = 32;
const DEFAULT_MAX_WORKERS: usize = 8;
const DEFAULT_OCR_RETRIES: u32 = 1;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub max_workers: Option<usize>,
    pub ocr_retries: u32,
    pub ocr_retry_backoff: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            ocr_retries: DEFAULT_OCR_RETRIES,
            ocr_retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl IndexerConfig {
    pub fn from_env() -> Self {
        Self {
            max_workers: std::env::var(WORKER_OVERRIDE_ENV)
                .ok()
                .and_then(|raw| parse_positive(&raw)),
            ocr_retries: std::env::var(RETRIES_ENV)
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(DEFAULT_OCR_RETRIES),
            ocr_retry_backoff: std::env::var(RETRY_BACKOFF_ENV)
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
        }
    }

    /// Effective worker-pool size: an explicit override wins (capped at 32),
    /// otherwise the CPU count clamped to [1, 8].
    pub fn resolved_workers(&self) -> usize {
        if let Some(requested) = self.max_workers.filter(|&n| n > 0) {
            return requested.min(MAX_WORKER_OVERRIDE);
        }

        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(1, DEFAULT_MAX_WORKERS)
    }
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

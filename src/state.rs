use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum IndexerState {
    Idle,
    Scanning,
    Indexing,
    Completed,
    Failed,
}

impl IndexerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IndexerState::Completed | IndexerState::Failed)
    }
}

/// Per-indexer run state. Legal transitions:
/// Idle -> Scanning -> Indexing -> {Completed, Failed} -> Idle.
pub struct IndexerSession {
    state: Mutex<IndexerState>,
    cancel: Arc<AtomicBool>,
}

impl IndexerSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IndexerState::Idle),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> IndexerState {
        *self.lock_state()
    }

    /// Claims the session for a new run, rejecting concurrent runs. A
    /// terminal state passes back through Idle before entering Scanning.
    pub fn try_begin(&self) -> Result<(), AppError> {
        let mut state = self.lock_state();
        if *state != IndexerState::Idle && !state.is_terminal() {
            return Err(AppError::IndexerBusy);
        }

        *state = IndexerState::Scanning;
        self.cancel.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn mark_indexing(&self) {
        *self.lock_state() = IndexerState::Indexing;
    }

    pub fn finish(&self, success: bool) {
        *self.lock_state() = if success {
            IndexerState::Completed
        } else {
            IndexerState::Failed
        };
    }

    pub fn reset(&self) {
        let mut state = self.lock_state();
        if state.is_terminal() {
            *state = IndexerState::Idle;
        }
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, IndexerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for IndexerSession {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::data::repository::StoredSnapshot;
use crate::services::normalize;

/// A candidate whose content is new or changed and needs OCR.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub path: PathBuf,
    pub file_name: String,
    pub file_mtime: f64,
    pub file_size: i64,
}

/// A stored record whose metadata still matches but whose search key was
/// written before the key existed; recomputed from stored fields, no OCR.
#[derive(Debug, Clone)]
pub struct Backfill {
    pub file_path: String,
    pub search_text: String,
}

#[derive(Debug, Default)]
pub struct Partition {
    pub process: Vec<PendingImage>,
    pub backfills: Vec<Backfill>,
    pub skipped: usize,
    pub failed: usize,
}

/// Compares each candidate's current `(mtime, size)` against the stored
/// snapshot. An exact match skips the file — this comparison is the sole
/// re-extraction trigger, so a previously failed file is not retried until
/// its content changes. Files whose metadata cannot be read count as failed.
pub fn partition(
    candidates: &[PathBuf],
    stored: &HashMap<String, StoredSnapshot>,
) -> Partition {
    let mut result = Partition::default();

    for path in candidates {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let (file_mtime, file_size) = match file_metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!("cannot stat {}: {err}", path.display());
                result.failed += 1;
                continue;
            }
        };

        let key = path.to_string_lossy();
        if let Some(snapshot) = stored.get(key.as_ref()) {
            if snapshot.file_mtime == file_mtime && snapshot.file_size == file_size {
                if snapshot.search_text.trim().is_empty() {
                    result.backfills.push(Backfill {
                        file_path: key.to_string(),
                        search_text: normalize::build_search_text(&file_name, &snapshot.ocr_text),
                    });
                }
                result.skipped += 1;
                continue;
            }
        }

        result.process.push(PendingImage {
            path: path.clone(),
            file_name,
            file_mtime,
            file_size,
        });
    }

    result
}

pub fn file_metadata(path: &Path) -> std::io::Result<(f64, i64)> {
    let meta = std::fs::metadata(path)?;
    let mtime = match meta.modified()?.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    };
    Ok((mtime, meta.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn snapshot_of(path: &Path, search_text: &str, ocr_text: &str) -> StoredSnapshot {
        let (file_mtime, file_size) = file_metadata(path).unwrap();
        StoredSnapshot {
            file_mtime,
            file_size,
            search_text: search_text.to_string(),
            ocr_text: ocr_text.to_string(),
        }
    }

    fn keyed(path: &Path, snapshot: StoredSnapshot) -> HashMap<String, StoredSnapshot> {
        HashMap::from([(path.to_string_lossy().to_string(), snapshot)])
    }

    #[test]
    fn test_new_file_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_001.jpg");
        fs::write(&path, b"img").unwrap();

        let result = partition(&[path.clone()], &HashMap::new());
        assert_eq!(result.process.len(), 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.failed, 0);

        let pending = &result.process[0];
        assert_eq!(pending.file_name, "part_001.jpg");
        assert_eq!(pending.file_size, 3);
    }

    #[test]
    fn test_unchanged_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_001.jpg");
        fs::write(&path, b"img").unwrap();

        let stored = keyed(&path, snapshot_of(&path, "PART001JPG A100X", "A-100-X"));
        let result = partition(&[path], &stored);
        assert_eq!(result.skipped, 1);
        assert!(result.process.is_empty());
        assert!(result.backfills.is_empty());
    }

    #[test]
    fn test_failed_record_is_not_retried_while_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_002.jpg");
        fs::write(&path, b"broken").unwrap();

        // ocr_text empty, key present: a prior failed extraction still skips.
        let stored = keyed(&path, snapshot_of(&path, "PART002JPG", ""));
        let result = partition(&[path], &stored);
        assert_eq!(result.skipped, 1);
        assert!(result.process.is_empty());
    }

    #[test]
    fn test_size_change_triggers_reprocess() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_001.jpg");
        fs::write(&path, b"img").unwrap();

        let mut snapshot = snapshot_of(&path, "KEY", "A-100-X");
        snapshot.file_size += 1;
        let result = partition(&[path], &keyed(&dir.path().join("part_001.jpg"), snapshot));
        assert_eq!(result.process.len(), 1);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_mtime_change_triggers_reprocess() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_001.jpg");
        fs::write(&path, b"img").unwrap();

        let mut snapshot = snapshot_of(&path, "KEY", "A-100-X");
        snapshot.file_mtime += 1.0;
        let result = partition(&[path.clone()], &keyed(&path, snapshot));
        assert_eq!(result.process.len(), 1);
    }

    #[test]
    fn test_blank_search_text_schedules_backfill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part_001.jpg");
        fs::write(&path, b"img").unwrap();

        let stored = keyed(&path, snapshot_of(&path, "  ", "A-100-X"));
        let result = partition(&[path.clone()], &stored);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.backfills.len(), 1);

        let backfill = &result.backfills[0];
        assert_eq!(backfill.file_path, path.to_string_lossy());
        assert_eq!(backfill.search_text, "PART001JPG A100X");
    }

    #[test]
    fn test_missing_file_counts_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("ghost.jpg");

        let result = partition(&[ghost], &HashMap::new());
        assert_eq!(result.failed, 1);
        assert!(result.process.is_empty());
        assert_eq!(result.skipped, 0);
    }
}

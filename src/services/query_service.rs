use rusqlite::Connection;

use crate::data::repository;
use crate::error::AppError;
use crate::services::normalize;

pub const QUERY_RESULT_LIMIT: usize = 500;

/// Finds indexed images for `folder_path` matching `raw_query`, ordered by
/// file name, capped at [`QUERY_RESULT_LIMIT`]. A record matches when its
/// OCR text or file name contains the query case-insensitively, or when the
/// normalized query is a substring of its normalized search key — so
/// "100-x" finds an image whose label read "A 100 X". An empty query lists
/// everything indexed so far for the folder.
pub fn query(
    conn: &Connection,
    folder_path: &str,
    raw_query: &str,
) -> Result<Vec<String>, AppError> {
    let trimmed = raw_query.trim();
    if trimmed.is_empty() {
        return repository::list_paths(conn, folder_path, QUERY_RESULT_LIMIT);
    }

    let normalized = normalize::normalize(trimmed);
    repository::search_paths(conn, folder_path, trimmed, &normalized, QUERY_RESULT_LIMIT)
}
